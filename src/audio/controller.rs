//! Per-room playback controller.
//!
//! One tokio task per room owns everything that changes during playback:
//! the active song, the sink, the volume and the skip votes. Other tasks
//! talk to it through [`RoomSession`], which forwards commands over an
//! ordered channel and reads a `watch` snapshot for queries. Songs reach
//! the task through the shared [`SongQueue`], which is the only rendezvous
//! between producers and this single consumer.
//!
//! ```text
//!  Idle --attach--> AwaitingSong --pop--> Playing <--pause/resume--> Paused
//!   |                 ^    |                 |                         |
//!   |                 |    +--idle timeout---+-------------------------+--> Disconnected
//!   |                 +-- finish(gen) / skip / stop --------------------+
//!   +--idle timeout / disconnect------------------------------------------> Disconnected
//! ```
//!
//! Every playback attempt gets a new [`Generation`]; a completion signal for
//! any generation other than the active one is stale and gets dropped.

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use super::{
    queue::{PopOutcome, SongQueue},
    sink::{AudioSink, CompletionSignal, Generation},
    song::Song,
    votes::{SkipVoteTracker, VoteOutcome},
    ChannelRef, MemberId, RoomId,
};
use crate::{
    config::Config,
    error::{MusicError, MusicResult},
};

/// Identifica una instancia concreta de sesión dentro del registro.
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Sesión creada, todavía sin conexión de voz.
    Idle,
    AwaitingSong,
    Playing,
    Paused,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Requested,
    IdleTimeout,
    /// Todos los handles de la sesión se soltaron.
    Closed,
    /// El sink no pudo detener la pista; la sala se da de baja.
    SinkFailure,
}

/// Foto del estado de la sala que publica el controlador.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: PlayerState,
    pub current: Option<Song>,
    pub paused: bool,
    pub volume: f32,
    pub channel: Option<ChannelRef>,
    pub skip_votes: usize,
    pub skip_threshold: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    NowPlaying { room: RoomId, song: Song },
    Disconnected { room: RoomId, reason: DisconnectReason },
}

/// Parámetros con los que nace cada sesión.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub default_volume: f32,
    pub skip_threshold: usize,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            default_volume: config.default_volume,
            skip_threshold: config.skip_vote_threshold,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

type Reply<T> = oneshot::Sender<MusicResult<T>>;

enum ControlMessage {
    Attach { sink: Arc<dyn AudioSink>, reply: Reply<ChannelRef> },
    MoveTo { channel: ChannelRef, reply: Reply<ChannelRef> },
    Pause { reply: Reply<()> },
    Resume { reply: Reply<()> },
    Stop { reply: Reply<usize> },
    Skip { voter: MemberId, reply: Reply<VoteOutcome> },
    SetVolume { volume: f32, reply: Reply<f32> },
    Disconnect { reply: oneshot::Sender<()> },
}

/// Handle clonable de una sala viva.
#[derive(Clone)]
pub struct RoomSession {
    room: RoomId,
    id: SessionId,
    queue: Arc<SongQueue>,
    commands: mpsc::UnboundedSender<ControlMessage>,
    status: watch::Receiver<SessionStatus>,
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("room", &self.room)
            .field("id", &self.id)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl RoomSession {
    pub fn room(&self) -> RoomId {
        self.room
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn queue(&self) -> &SongQueue {
        &self.queue
    }

    /// Encola una canción y devuelve su posición (base 1)
    pub fn enqueue(&self, song: Song) -> usize {
        self.queue.enqueue(song)
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> PlayerState {
        self.status.borrow().state
    }

    pub fn channel(&self) -> Option<ChannelRef> {
        self.status.borrow().channel
    }

    pub fn is_connected(&self) -> bool {
        self.channel().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed() || self.state() == PlayerState::Disconnected
    }

    /// Canción actual y si está en pausa
    pub fn now_playing(&self) -> MusicResult<(Song, bool)> {
        let status = self.status.borrow();
        match &status.current {
            Some(song) => Ok((song.clone(), status.paused)),
            None => Err(MusicError::NothingPlaying),
        }
    }

    /// Asocia la conexión de voz. Si la sala ya tiene una, se rechaza con
    /// `AlreadyConnectedElsewhere` y el llamador debe liberar `sink`.
    pub async fn attach(&self, sink: Arc<dyn AudioSink>) -> MusicResult<ChannelRef> {
        self.request(|reply| ControlMessage::Attach { sink, reply }).await
    }

    pub async fn move_to(&self, channel: ChannelRef) -> MusicResult<ChannelRef> {
        self.request(|reply| ControlMessage::MoveTo { channel, reply }).await
    }

    pub async fn pause(&self) -> MusicResult<()> {
        self.request(|reply| ControlMessage::Pause { reply }).await
    }

    pub async fn resume(&self) -> MusicResult<()> {
        self.request(|reply| ControlMessage::Resume { reply }).await
    }

    /// Limpia la cola y corta la canción actual. Devuelve cuántas se descartaron.
    pub async fn stop(&self) -> MusicResult<usize> {
        self.request(|reply| ControlMessage::Stop { reply }).await
    }

    pub async fn skip(&self, voter: MemberId) -> MusicResult<VoteOutcome> {
        self.request(|reply| ControlMessage::Skip { voter, reply }).await
    }

    /// Ajusta el volumen en porcentaje (0-100)
    pub async fn set_volume(&self, percent: i64) -> MusicResult<f32> {
        if !(0..=100).contains(&percent) {
            return Err(MusicError::InvalidVolumeRange(percent));
        }
        let volume = percent as f32 / 100.0;
        self.request(|reply| ControlMessage::SetVolume { volume, reply }).await
    }

    /// Pide al controlador que se desconecte y espera a que termine.
    pub async fn disconnect(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(ControlMessage::Disconnect { reply }).is_ok() {
            let _ = done.await;
        }
    }

    /// Espera a que la sesión llegue a `Disconnected`.
    pub async fn closed(&self) {
        let mut status = self.status.clone();
        let _ = status
            .wait_for(|s| s.state == PlayerState::Disconnected)
            .await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ControlMessage,
    ) -> MusicResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| MusicError::SessionClosed)?;
        response.await.map_err(|_| MusicError::SessionClosed)?
    }
}

enum Flow {
    Continue,
    /// La canción actual queda retirada; volver a esperar otra.
    Retire,
    Exit(DisconnectReason),
}

enum Next {
    Song(Song),
    Exit(DisconnectReason),
}

type ExitHook = Box<dyn FnOnce(RoomId, SessionId) + Send>;

struct PlaybackController {
    room: RoomId,
    id: SessionId,
    queue: Arc<SongQueue>,
    commands: mpsc::UnboundedReceiver<ControlMessage>,
    completions_tx: mpsc::UnboundedSender<Generation>,
    completions: mpsc::UnboundedReceiver<Generation>,
    sink: Option<Arc<dyn AudioSink>>,
    current: Option<Song>,
    paused: bool,
    generation: Generation,
    volume: f32,
    votes: SkipVoteTracker,
    idle_timeout: Duration,
    status: watch::Sender<SessionStatus>,
    events: broadcast::Sender<PlayerEvent>,
    on_exit: Option<ExitHook>,
    disconnect_replies: Vec<oneshot::Sender<()>>,
}

/// Crea la sesión y arranca su tarea controladora.
///
/// `on_exit` se ejecuta una sola vez cuando la tarea termina, sea cual sea
/// el motivo; el registro lo usa para darse de baja.
pub(crate) fn spawn_session(
    room: RoomId,
    id: SessionId,
    settings: &SessionSettings,
    events: broadcast::Sender<PlayerEvent>,
    on_exit: impl FnOnce(RoomId, SessionId) + Send + 'static,
) -> RoomSession {
    let queue = Arc::new(SongQueue::new());
    let (commands_tx, commands) = mpsc::unbounded_channel();
    let (completions_tx, completions) = mpsc::unbounded_channel();
    let volume = settings.default_volume.clamp(0.0, 1.0);
    let votes = SkipVoteTracker::new(settings.skip_threshold);
    let (status_tx, status_rx) = watch::channel(SessionStatus {
        state: PlayerState::Idle,
        current: None,
        paused: false,
        volume,
        channel: None,
        skip_votes: 0,
        skip_threshold: votes.threshold(),
    });

    let controller = PlaybackController {
        room,
        id,
        queue: queue.clone(),
        commands,
        completions_tx,
        completions,
        sink: None,
        current: None,
        paused: false,
        generation: 0,
        volume,
        votes,
        idle_timeout: settings.idle_timeout,
        status: status_tx,
        events,
        on_exit: Some(Box::new(on_exit)),
        disconnect_replies: Vec::new(),
    };

    tokio::spawn(controller.run());
    info!("🎛️ Sesión {} creada para la sala {}", id, room);

    RoomSession {
        room,
        id,
        queue,
        commands: commands_tx,
        status: status_rx,
    }
}

impl PlaybackController {
    async fn run(mut self) {
        let reason = self.drive().await;
        self.shutdown(reason).await;
    }

    async fn drive(&mut self) -> DisconnectReason {
        loop {
            let song = match self.await_song().await {
                Next::Song(song) => song,
                Next::Exit(reason) => return reason,
            };
            if let Some(reason) = self.play_song(song).await {
                return reason;
            }
        }
    }

    /// Espera la siguiente canción con el temporizador de inactividad corriendo.
    async fn await_song(&mut self) -> Next {
        let deadline = Instant::now() + self.idle_timeout;
        let queue = self.queue.clone();

        loop {
            let attached = self.sink.is_some();
            self.publish();

            tokio::select! {
                outcome = queue.pop_until(deadline), if attached => {
                    return match outcome {
                        PopOutcome::Song(song) => Next::Song(song),
                        PopOutcome::TimedOut => Next::Exit(DisconnectReason::IdleTimeout),
                    };
                }
                _ = tokio::time::sleep_until(deadline), if !attached => {
                    return Next::Exit(DisconnectReason::IdleTimeout);
                }
                Some(generation) = self.completions.recv() => {
                    debug!("Señal de fin obsoleta (generación {}) ignorada en espera", generation);
                }
                message = self.commands.recv() => {
                    let Some(message) = message else {
                        return Next::Exit(DisconnectReason::Closed);
                    };
                    if let Flow::Exit(reason) = self.handle_waiting(message).await {
                        return Next::Exit(reason);
                    }
                }
            }
        }
    }

    /// Reproduce `song` hasta que termine o se retire. `Some` si la sala debe cerrarse.
    async fn play_song(&mut self, song: Song) -> Option<DisconnectReason> {
        let Some(sink) = self.sink.clone() else {
            warn!("Canción {} sin salida de audio, se descarta", song.title);
            return None;
        };

        self.generation += 1;
        let generation = self.generation;
        self.votes.reset();

        let completion = CompletionSignal::new(generation, self.completions_tx.clone());
        if let Err(e) = sink.play(&song, self.volume, completion).await {
            warn!("❌ No se pudo reproducir {}: {}", song.title, e);
            return None;
        }

        info!("🎵 Reproduciendo en sala {}: {}", self.room, song.title);
        self.current = Some(song.clone());
        self.paused = false;
        self.publish();
        let _ = self.events.send(PlayerEvent::NowPlaying {
            room: self.room,
            song,
        });

        let exit = loop {
            tokio::select! {
                Some(finished) = self.completions.recv() => {
                    if finished == generation {
                        debug!("Pista terminada (generación {})", generation);
                        break None;
                    }
                    debug!(
                        "Señal de fin obsoleta (generación {}, activa {}) ignorada",
                        finished, generation
                    );
                }
                message = self.commands.recv() => {
                    let Some(message) = message else {
                        let _ = sink.stop().await;
                        break Some(DisconnectReason::Closed);
                    };
                    match self.handle_playing(message, &sink).await {
                        Flow::Continue => {}
                        Flow::Retire => break None,
                        Flow::Exit(reason) => break Some(reason),
                    }
                }
            }
        };

        self.current = None;
        self.paused = false;
        self.votes.reset();
        exit
    }

    async fn handle_waiting(&mut self, message: ControlMessage) -> Flow {
        match message {
            ControlMessage::Attach { sink, reply } => {
                let _ = reply.send(self.attach(sink));
            }
            ControlMessage::MoveTo { channel, reply } => {
                let _ = reply.send(self.move_sink(channel).await);
            }
            ControlMessage::Pause { reply } | ControlMessage::Resume { reply } => {
                let _ = reply.send(Err(MusicError::NothingPlaying));
            }
            ControlMessage::Skip { reply, .. } => {
                let _ = reply.send(Err(MusicError::NothingPlaying));
            }
            ControlMessage::Stop { reply } => {
                let _ = reply.send(Ok(self.queue.clear()));
            }
            ControlMessage::SetVolume { volume, reply } => {
                self.volume = volume;
                self.publish();
                let _ = reply.send(Ok(volume));
            }
            ControlMessage::Disconnect { reply } => {
                self.disconnect_replies.push(reply);
                return Flow::Exit(DisconnectReason::Requested);
            }
        }
        Flow::Continue
    }

    async fn handle_playing(&mut self, message: ControlMessage, sink: &Arc<dyn AudioSink>) -> Flow {
        match message {
            ControlMessage::Attach { sink: replacement, reply } => {
                let _ = reply.send(self.attach(replacement));
            }
            ControlMessage::MoveTo { channel, reply } => {
                let _ = reply.send(self.move_sink(channel).await);
            }
            ControlMessage::Pause { reply } => {
                let result = sink.pause().await.map_err(|e| MusicError::Voice(e.to_string()));
                if result.is_ok() {
                    self.paused = true;
                    info!("⏸️ Reproducción pausada en sala {}", self.room);
                    self.publish();
                }
                let _ = reply.send(result);
            }
            ControlMessage::Resume { reply } => {
                let result = sink.resume().await.map_err(|e| MusicError::Voice(e.to_string()));
                if result.is_ok() {
                    self.paused = false;
                    info!("▶️ Reproducción reanudada en sala {}", self.room);
                    self.publish();
                }
                let _ = reply.send(result);
            }
            ControlMessage::SetVolume { volume, reply } => {
                self.volume = volume;
                if let Err(e) = sink.set_volume(volume).await {
                    warn!("No se pudo aplicar el volumen en sala {}: {}", self.room, e);
                }
                info!("🔊 Volumen ajustado a {}%", (volume * 100.0).round() as u32);
                self.publish();
                let _ = reply.send(Ok(volume));
            }
            ControlMessage::Skip { voter, reply } => {
                let requester = match &self.current {
                    Some(song) => song.requester,
                    None => {
                        let _ = reply.send(Err(MusicError::NothingPlaying));
                        return Flow::Continue;
                    }
                };
                let outcome = self.votes.register_vote(voter, requester);
                if !outcome.skips() {
                    self.publish();
                    let _ = reply.send(Ok(outcome));
                    return Flow::Continue;
                }

                info!("⏭️ Saltando canción en sala {} ({:?})", self.room, outcome);
                self.votes.reset();
                if let Err(e) = sink.stop().await {
                    error!("❌ No se pudo detener la pista en sala {}: {}", self.room, e);
                    let _ = reply.send(Err(MusicError::Voice(e.to_string())));
                    return Flow::Exit(DisconnectReason::SinkFailure);
                }
                let _ = reply.send(Ok(outcome));
                return Flow::Retire;
            }
            ControlMessage::Stop { reply } => {
                let cleared = self.queue.clear();
                if let Err(e) = sink.stop().await {
                    error!("❌ No se pudo detener la pista en sala {}: {}", self.room, e);
                    let _ = reply.send(Err(MusicError::Voice(e.to_string())));
                    return Flow::Exit(DisconnectReason::SinkFailure);
                }
                info!("⏹️ Reproducción detenida en sala {}", self.room);
                let _ = reply.send(Ok(cleared));
                return Flow::Retire;
            }
            ControlMessage::Disconnect { reply } => {
                if let Err(e) = sink.stop().await {
                    warn!("No se pudo detener la pista al desconectar: {}", e);
                }
                self.disconnect_replies.push(reply);
                return Flow::Exit(DisconnectReason::Requested);
            }
        }
        Flow::Continue
    }

    /// Una sala tiene una sola salida de audio; la que sobra vuelve al llamador.
    fn attach(&mut self, sink: Arc<dyn AudioSink>) -> MusicResult<ChannelRef> {
        if let Some(current) = &self.sink {
            warn!(
                "Sala {} ya tiene conexión en el canal {}, se rechaza la del canal {}",
                self.room,
                current.channel(),
                sink.channel()
            );
            return Err(MusicError::AlreadyConnectedElsewhere);
        }
        let channel = sink.channel();
        self.sink = Some(sink);
        info!("🔊 Sala {} conectada al canal {}", self.room, channel);
        self.publish();
        Ok(channel)
    }

    async fn move_sink(&mut self, channel: ChannelRef) -> MusicResult<ChannelRef> {
        let sink = self.sink.clone().ok_or(MusicError::NotConnected)?;
        sink.move_to(channel)
            .await
            .map_err(|e| MusicError::Voice(e.to_string()))?;
        info!("🚚 Sala {} movida al canal {}", self.room, channel);
        self.publish();
        Ok(channel)
    }

    fn state(&self) -> PlayerState {
        match (&self.sink, &self.current) {
            (None, _) => PlayerState::Idle,
            (Some(_), None) => PlayerState::AwaitingSong,
            (Some(_), Some(_)) if self.paused => PlayerState::Paused,
            (Some(_), Some(_)) => PlayerState::Playing,
        }
    }

    fn publish(&self) {
        self.publish_state(self.state());
    }

    fn publish_state(&self, state: PlayerState) {
        self.status.send_replace(SessionStatus {
            state,
            current: self.current.clone(),
            paused: state == PlayerState::Paused,
            volume: self.volume,
            channel: self.sink.as_ref().map(|sink| sink.channel()),
            skip_votes: self.votes.count(),
            skip_threshold: self.votes.threshold(),
        });
    }

    async fn shutdown(mut self, reason: DisconnectReason) {
        match reason {
            DisconnectReason::IdleTimeout => {
                info!("⏰ Sala {} inactiva, desconectando", self.room)
            }
            _ => info!("👋 Cerrando sesión de la sala {} ({:?})", self.room, reason),
        }

        self.queue.clear();
        self.current = None;
        self.votes.reset();

        if let Some(sink) = self.sink.take() {
            if sink.is_active().await {
                if let Err(e) = sink.stop().await {
                    warn!("No se pudo detener la pista al cerrar: {}", e);
                }
            }
            if let Err(e) = sink.release().await {
                error!("❌ Error al liberar la conexión de voz de sala {}: {}", self.room, e);
            }
        }

        self.publish_state(PlayerState::Disconnected);
        if let Some(on_exit) = self.on_exit.take() {
            on_exit(self.room, self.id);
        }
        let _ = self.events.send(PlayerEvent::Disconnected {
            room: self.room,
            reason,
        });

        // Comandos que llegaron mientras se cerraba la sala.
        self.commands.close();
        while let Ok(message) = self.commands.try_recv() {
            match message {
                ControlMessage::Disconnect { reply } => self.disconnect_replies.push(reply),
                other => reject_closed(other),
            }
        }
        for reply in self.disconnect_replies.drain(..) {
            let _ = reply.send(());
        }
    }
}

fn reject_closed(message: ControlMessage) {
    match message {
        ControlMessage::Attach { reply, .. } | ControlMessage::MoveTo { reply, .. } => {
            let _ = reply.send(Err(MusicError::SessionClosed));
        }
        ControlMessage::Pause { reply } | ControlMessage::Resume { reply } => {
            let _ = reply.send(Err(MusicError::SessionClosed));
        }
        ControlMessage::Stop { reply } => {
            let _ = reply.send(Err(MusicError::SessionClosed));
        }
        ControlMessage::Skip { reply, .. } => {
            let _ = reply.send(Err(MusicError::SessionClosed));
        }
        ControlMessage::SetVolume { reply, .. } => {
            let _ = reply.send(Err(MusicError::SessionClosed));
        }
        ControlMessage::Disconnect { reply } => {
            let _ = reply.send(());
        }
    }
}
