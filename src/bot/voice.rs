use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::audio::{
    sink::{AudioSink, CompletionSignal, SinkError, VoiceConnector},
    song::Song,
    ChannelRef, RoomId,
};

/// Abre conexiones de voz con el gestor de songbird
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(&self, room: RoomId, channel: ChannelRef) -> Result<Arc<dyn AudioSink>, SinkError> {
        let call = self
            .manager
            .join(guild_id(room), channel_id(channel))
            .await
            .map_err(|e| {
                error!("Error al conectar al canal de voz: {:?}", e);
                SinkError::new(format!("No se pudo conectar al canal de voz: {e}"))
            })?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel, room);
        Ok(Arc::new(SongbirdSink {
            room,
            manager: self.manager.clone(),
            call,
            channel: Mutex::new(channel),
            http: self.http.clone(),
            track: Mutex::new(None),
        }))
    }
}

/// Salida de audio sobre una `Call` de songbird.
///
/// Songbird decodifica y transmite; aquí solo se controla la pista actual.
pub struct SongbirdSink {
    room: RoomId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    channel: Mutex<ChannelRef>,
    http: reqwest::Client,
    track: Mutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    fn current_track(&self) -> Result<TrackHandle, SinkError> {
        self.track
            .lock()
            .clone()
            .ok_or_else(|| SinkError::new("No hay pista activa"))
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(&self, song: &Song, volume: f32, completion: CompletionSignal) -> Result<(), SinkError> {
        let input: Input = HttpRequest::new(self.http.clone(), song.stream_ref.clone()).into();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };
        if let Err(e) = handle.set_volume(volume) {
            warn!("No se pudo fijar el volumen inicial: {:?}", e);
        }

        let notifier = CompletionNotifier::new(completion);
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                let _ = handle.stop();
                return Err(SinkError::new(format!("Error al agregar event handler: {e}")));
            }
        }

        *self.track.lock() = Some(handle);
        debug!("▶️ Pista iniciada en guild {}: {}", self.room, song.title);
        Ok(())
    }

    async fn pause(&self) -> Result<(), SinkError> {
        self.current_track()?
            .pause()
            .map_err(|e| SinkError::new(e.to_string()))
    }

    async fn resume(&self) -> Result<(), SinkError> {
        self.current_track()?
            .play()
            .map_err(|e| SinkError::new(e.to_string()))
    }

    async fn stop(&self) -> Result<(), SinkError> {
        let Some(track) = self.track.lock().take() else {
            return Ok(());
        };
        track.stop().map_err(|e| SinkError::new(e.to_string()))
    }

    async fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
        self.current_track()?
            .set_volume(volume)
            .map_err(|e| SinkError::new(e.to_string()))
    }

    async fn is_active(&self) -> bool {
        let Ok(track) = self.current_track() else {
            return false;
        };
        match track.get_info().await {
            Ok(info) => !matches!(info.playing, PlayMode::Stop | PlayMode::End | PlayMode::Errored(_)),
            Err(_) => false,
        }
    }

    fn channel(&self) -> ChannelRef {
        *self.channel.lock()
    }

    async fn move_to(&self, channel: ChannelRef) -> Result<(), SinkError> {
        self.manager
            .join(guild_id(self.room), channel_id(channel))
            .await
            .map_err(|e| SinkError::new(format!("No se pudo mover al canal: {e}")))?;
        *self.channel.lock() = channel;
        Ok(())
    }

    async fn release(&self) -> Result<(), SinkError> {
        self.track.lock().take();
        match self.manager.remove(guild_id(self.room)).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.room);
                Ok(())
            }
            // Ya desconectado (p. ej. expulsado del canal)
            Err(songbird::error::JoinError::NoCall) => Ok(()),
            Err(e) => Err(SinkError::new(e.to_string())),
        }
    }
}

/// Dispara la señal de fin al terminar o fallar la pista (lo que ocurra primero).
#[derive(Clone)]
struct CompletionNotifier {
    signal: Arc<Mutex<Option<CompletionSignal>>>,
}

impl CompletionNotifier {
    fn new(signal: CompletionSignal) -> Self {
        Self {
            signal: Arc::new(Mutex::new(Some(signal))),
        }
    }
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in tracks.iter() {
                if let PlayMode::Errored(e) = &state.playing {
                    warn!("❌ Error en la pista: {:?}", e);
                }
            }
        }

        let signal = self.signal.lock().take();
        if let Some(signal) = signal {
            debug!("Track terminado (generación {})", signal.generation());
            signal.complete();
        }
        Some(Event::Cancel)
    }
}

fn guild_id(room: RoomId) -> GuildId {
    GuildId::new(room.0)
}

fn channel_id(channel: ChannelRef) -> ChannelId {
    ChannelId::new(channel.0)
}
