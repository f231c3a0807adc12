//! Boundary between the playback controller and the voice transport.
//!
//! The controller never talks to songbird directly: it drives an
//! [`AudioSink`] and learns that a track ended through the single-use
//! [`CompletionSignal`] it handed over when starting that track.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use super::{song::Song, ChannelRef, RoomId};

/// Identifica un intento de reproducción. Crece de forma monótona por sala.
pub type Generation = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Aviso de "la canción terminó" para una generación concreta.
///
/// Se consume al dispararse, así que cada generación se entrega como mucho
/// una vez. Puede dispararse desde cualquier hilo o tarea.
#[derive(Debug)]
pub struct CompletionSignal {
    generation: Generation,
    tx: mpsc::UnboundedSender<Generation>,
}

impl CompletionSignal {
    pub(crate) fn new(generation: Generation, tx: mpsc::UnboundedSender<Generation>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Entrega la señal al controlador. Devuelve `false` si la sala ya no existe.
    pub fn complete(self) -> bool {
        let delivered = self.tx.send(self.generation).is_ok();
        if !delivered {
            debug!("Señal de fin (generación {}) sin destinatario", self.generation);
        }
        delivered
    }
}

/// Salida de audio de una sala (una conexión de voz).
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Empieza a reproducir `song`; al terminar (o al detenerse) debe
    /// disparar `completion`.
    async fn play(
        &self,
        song: &Song,
        volume: f32,
        completion: CompletionSignal,
    ) -> Result<(), SinkError>;

    async fn pause(&self) -> Result<(), SinkError>;

    async fn resume(&self) -> Result<(), SinkError>;

    async fn stop(&self) -> Result<(), SinkError>;

    async fn set_volume(&self, volume: f32) -> Result<(), SinkError>;

    async fn is_active(&self) -> bool;

    /// Canal de voz al que está conectada la salida.
    fn channel(&self) -> ChannelRef;

    async fn move_to(&self, channel: ChannelRef) -> Result<(), SinkError>;

    /// Libera la conexión de voz.
    async fn release(&self) -> Result<(), SinkError>;
}

/// Abre conexiones de voz.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        room: RoomId,
        channel: ChannelRef,
    ) -> Result<Arc<dyn AudioSink>, SinkError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording fakes shared by the controller, registry and façade tests.

    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SinkCall {
        Play { title: String, volume: f32, generation: Generation },
        Pause,
        Resume,
        Stop,
        SetVolume(f32),
        MoveTo(ChannelRef),
        Release,
    }

    /// Sink falso que registra cada llamada.
    ///
    /// Por defecto `stop` dispara la señal pendiente, igual que songbird
    /// emite `TrackEvent::End` al detener una pista.
    pub struct RecordingSink {
        calls: Mutex<Vec<SinkCall>>,
        pending: Mutex<Option<CompletionSignal>>,
        active: Mutex<bool>,
        channel: Mutex<ChannelRef>,
        complete_on_stop: bool,
        fail_play: bool,
    }

    impl RecordingSink {
        pub fn new(channel: ChannelRef) -> Arc<Self> {
            Arc::new(Self::build(channel, true, false))
        }

        pub fn holding_completions(channel: ChannelRef) -> Arc<Self> {
            Arc::new(Self::build(channel, false, false))
        }

        pub fn failing(channel: ChannelRef) -> Arc<Self> {
            Arc::new(Self::build(channel, true, true))
        }

        fn build(channel: ChannelRef, complete_on_stop: bool, fail_play: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                pending: Mutex::new(None),
                active: Mutex::new(false),
                channel: Mutex::new(channel),
                complete_on_stop,
                fail_play,
            }
        }

        pub fn calls(&self) -> Vec<SinkCall> {
            self.calls.lock().clone()
        }

        pub fn played_titles(&self) -> Vec<String> {
            self.calls
                .lock()
                .iter()
                .filter_map(|call| match call {
                    SinkCall::Play { title, .. } => Some(title.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Simula que la pista actual terminó sola.
        pub fn finish_current(&self) -> Option<Generation> {
            *self.active.lock() = false;
            let signal = self.pending.lock().take()?;
            let generation = signal.generation();
            signal.complete();
            Some(generation)
        }

        /// Quita la señal pendiente sin dispararla (para entregarla tarde).
        pub fn take_completion(&self) -> Option<CompletionSignal> {
            self.pending.lock().take()
        }
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(
            &self,
            song: &Song,
            volume: f32,
            completion: CompletionSignal,
        ) -> Result<(), SinkError> {
            self.calls.lock().push(SinkCall::Play {
                title: song.title.clone(),
                volume,
                generation: completion.generation(),
            });
            if self.fail_play {
                return Err(SinkError::new("stream unavailable"));
            }
            *self.pending.lock() = Some(completion);
            *self.active.lock() = true;
            Ok(())
        }

        async fn pause(&self) -> Result<(), SinkError> {
            self.calls.lock().push(SinkCall::Pause);
            Ok(())
        }

        async fn resume(&self) -> Result<(), SinkError> {
            self.calls.lock().push(SinkCall::Resume);
            Ok(())
        }

        async fn stop(&self) -> Result<(), SinkError> {
            self.calls.lock().push(SinkCall::Stop);
            *self.active.lock() = false;
            if self.complete_on_stop {
                if let Some(signal) = self.pending.lock().take() {
                    signal.complete();
                }
            }
            Ok(())
        }

        async fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
            self.calls.lock().push(SinkCall::SetVolume(volume));
            Ok(())
        }

        async fn is_active(&self) -> bool {
            *self.active.lock()
        }

        fn channel(&self) -> ChannelRef {
            *self.channel.lock()
        }

        async fn move_to(&self, channel: ChannelRef) -> Result<(), SinkError> {
            self.calls.lock().push(SinkCall::MoveTo(channel));
            *self.channel.lock() = channel;
            Ok(())
        }

        async fn release(&self) -> Result<(), SinkError> {
            self.calls.lock().push(SinkCall::Release);
            *self.active.lock() = false;
            Ok(())
        }
    }

    /// Conector falso: entrega siempre un [`RecordingSink`] nuevo y lo recuerda.
    #[derive(Default)]
    pub struct RecordingConnector {
        pub sinks: Mutex<Vec<(RoomId, Arc<RecordingSink>)>>,
        pub refuse: bool,
    }

    impl RecordingConnector {
        pub fn last_sink(&self) -> Option<Arc<RecordingSink>> {
            self.sinks.lock().last().map(|(_, sink)| sink.clone())
        }
    }

    #[async_trait]
    impl VoiceConnector for RecordingConnector {
        async fn connect(
            &self,
            room: RoomId,
            channel: ChannelRef,
        ) -> Result<Arc<dyn AudioSink>, SinkError> {
            if self.refuse {
                return Err(SinkError::new("missing permissions"));
            }
            let sink = RecordingSink::new(channel);
            self.sinks.lock().push((room, sink.clone()));
            Ok(sink)
        }
    }
}
