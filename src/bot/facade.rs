//! Transport-independent command layer.
//!
//! Discord handlers parse interaction options into [`CommandArgs`], look the
//! command up in [`COMMAND_TABLE`] and hand the result to
//! [`MusicService::execute`]. Rendering the [`CommandOutcome`] is the job of
//! `ui::embeds`.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audio::{
    controller::RoomSession,
    queue::{QueueError, QueuePage},
    registry::SessionRegistry,
    sink::VoiceConnector,
    song::Song,
    votes::VoteOutcome,
    ChannelRef, MemberId, RoomId,
};
use crate::error::{MusicError, MusicResult};
use crate::sources::MediaResolver;

/// Argumentos crudos de un comando, tal como llegan del transporte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    pub query: Option<String>,
    pub channel: Option<ChannelRef>,
    pub volume: Option<i64>,
    pub page: Option<i64>,
    pub index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    /// Sin canal explícito se usa el del miembro.
    Summon { channel: Option<ChannelRef> },
    Play { query: String },
    Pause,
    Resume,
    Stop,
    Skip,
    Volume { percent: i64 },
    Now,
    Queue { page: i64 },
    Shuffle,
    /// Posición base 1, como se muestra en `/queue`.
    Remove { index: i64 },
    Disconnect,
}

type Parser = fn(&CommandArgs) -> MusicResult<Command>;

/// Tabla nombre → intérprete de argumentos (incluye alias).
pub const COMMAND_TABLE: &[(&str, Parser)] = &[
    ("join", |_| Ok(Command::Join)),
    ("summon", |args| Ok(Command::Summon { channel: args.channel })),
    ("play", parse_play),
    ("pause", |_| Ok(Command::Pause)),
    ("resume", |_| Ok(Command::Resume)),
    ("stop", |_| Ok(Command::Stop)),
    ("skip", |_| Ok(Command::Skip)),
    ("volume", parse_volume),
    ("now", |_| Ok(Command::Now)),
    ("playing", |_| Ok(Command::Now)),
    ("current", |_| Ok(Command::Now)),
    ("queue", |args| Ok(Command::Queue { page: args.page.unwrap_or(1) })),
    ("shuffle", |_| Ok(Command::Shuffle)),
    ("remove", parse_remove),
    ("disconnect", |_| Ok(Command::Disconnect)),
];

fn parse_play(args: &CommandArgs) -> MusicResult<Command> {
    let query = args
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(MusicError::MissingArgument("query"))?;
    Ok(Command::Play {
        query: query.to_string(),
    })
}

fn parse_volume(args: &CommandArgs) -> MusicResult<Command> {
    let percent = args.volume.ok_or(MusicError::MissingArgument("volume"))?;
    Ok(Command::Volume { percent })
}

fn parse_remove(args: &CommandArgs) -> MusicResult<Command> {
    let index = args.index.ok_or(MusicError::MissingArgument("index"))?;
    Ok(Command::Remove { index })
}

impl Command {
    /// Busca `name` en la tabla y construye el comando
    pub fn parse(name: &str, args: &CommandArgs) -> MusicResult<Command> {
        let name = name.trim().to_lowercase();
        let (_, parser) = COMMAND_TABLE
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .ok_or_else(|| MusicError::UnknownCommand(name.clone()))?;
        parser(args)
    }
}

/// Quién invoca y desde dónde.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub room: RoomId,
    pub member: MemberId,
    /// Canal de voz en el que está el miembro, si está en alguno.
    pub member_channel: Option<ChannelRef>,
    /// Canal de texto donde se escribió el comando.
    pub text_channel: Option<ChannelRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Joined(ChannelRef),
    Moved(ChannelRef),
    Enqueued { song: Song, position: usize },
    Paused,
    Resumed,
    Stopped { cleared: usize },
    Skip(VoteOutcome),
    VolumeSet(i64),
    NowPlaying { song: Song, paused: bool },
    Queue(QueuePage),
    Shuffled(usize),
    Removed(Song),
    Disconnected,
}

/// Fachada de comandos sobre el registro de sesiones.
pub struct MusicService {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn MediaResolver>,
    connector: Arc<dyn VoiceConnector>,
    page_size: usize,
    /// Serializa las conexiones de voz de cada sala.
    connecting: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl MusicService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        resolver: Arc<dyn MediaResolver>,
        connector: Arc<dyn VoiceConnector>,
        page_size: usize,
    ) -> Self {
        Self {
            registry,
            resolver,
            connector,
            page_size: page_size.max(1),
            connecting: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn execute(&self, invocation: Invocation, command: Command) -> MusicResult<CommandOutcome> {
        debug!("Ejecutando {:?} en sala {}", command, invocation.room);
        let room = invocation.room;
        match command {
            Command::Join => self.join(room, invocation.member_channel).await,
            Command::Summon { channel } => {
                self.summon(room, channel.or(invocation.member_channel)).await
            }
            Command::Play { query } => self.play(invocation, &query).await,
            Command::Pause => self.pause(room).await,
            Command::Resume => self.resume(room).await,
            Command::Stop => self.stop(room).await,
            Command::Skip => self.skip(room, invocation.member).await,
            Command::Volume { percent } => self.set_volume(room, percent).await,
            Command::Now => self.now_playing(room),
            Command::Queue { page } => self.list_queue(room, page),
            Command::Shuffle => self.shuffle(room),
            Command::Remove { index } => self.remove_at(room, index),
            Command::Disconnect => self.disconnect(room).await,
        }
    }

    /// Conecta al canal de voz del miembro
    pub async fn join(&self, room: RoomId, member_channel: Option<ChannelRef>) -> MusicResult<CommandOutcome> {
        let channel = member_channel.ok_or(MusicError::MemberNotInVoice)?;
        self.connected_session(room, channel).await?;
        Ok(CommandOutcome::Joined(channel))
    }

    /// Conecta o mueve el bot al canal indicado
    pub async fn summon(&self, room: RoomId, channel: Option<ChannelRef>) -> MusicResult<CommandOutcome> {
        let channel = channel.ok_or(MusicError::MemberNotInVoice)?;
        let lock = self.room_lock(room);
        let _guard = lock.lock().await;

        let session = self.registry.get_or_create(room);
        match session.channel() {
            Some(current) if current == channel => Ok(CommandOutcome::Joined(channel)),
            Some(_) => session.move_to(channel).await.map(CommandOutcome::Moved),
            None => self.connect(&session, channel).await.map(CommandOutcome::Joined),
        }
    }

    /// Resuelve la búsqueda y la agrega a la cola, conectando si hace falta.
    ///
    /// La conexión se asegura después de resolver: la sesión previa puede
    /// haber expirado mientras corría yt-dlp.
    pub async fn play(&self, invocation: Invocation, query: &str) -> MusicResult<CommandOutcome> {
        let room = invocation.room;
        let channel = invocation.member_channel.ok_or(MusicError::MemberNotInVoice)?;
        if self
            .registry
            .get(room)
            .and_then(|session| session.channel())
            .is_some_and(|current| current != channel)
        {
            return Err(MusicError::AlreadyConnectedElsewhere);
        }

        let song = self
            .resolver
            .resolve(query, invocation.member)
            .await
            .map_err(|e| MusicError::Resolution(e.to_string()))?
            .with_requester(invocation.member);
        let song = match invocation.text_channel {
            Some(channel) => song.with_announce_channel(channel),
            None => song,
        };

        let session = self.connected_session(room, channel).await?;
        let position = session.enqueue(song.clone());
        if session.is_closed() {
            warn!("La sesión {} de sala {} cerró al encolar {}", session.id(), room, song.title);
            return Err(MusicError::SessionClosed);
        }
        Ok(CommandOutcome::Enqueued { song, position })
    }

    pub async fn pause(&self, room: RoomId) -> MusicResult<CommandOutcome> {
        let session = self.registry.get(room).ok_or(MusicError::NothingPlaying)?;
        session.pause().await?;
        Ok(CommandOutcome::Paused)
    }

    pub async fn resume(&self, room: RoomId) -> MusicResult<CommandOutcome> {
        let session = self.registry.get(room).ok_or(MusicError::NothingPlaying)?;
        session.resume().await?;
        Ok(CommandOutcome::Resumed)
    }

    /// Siempre tiene éxito; sin sesión no hay nada que limpiar
    pub async fn stop(&self, room: RoomId) -> MusicResult<CommandOutcome> {
        let cleared = match self.registry.get(room) {
            Some(session) => session.stop().await?,
            None => 0,
        };
        Ok(CommandOutcome::Stopped { cleared })
    }

    pub async fn skip(&self, room: RoomId, voter: MemberId) -> MusicResult<CommandOutcome> {
        let session = self.registry.get(room).ok_or(MusicError::NothingPlaying)?;
        session.skip(voter).await.map(CommandOutcome::Skip)
    }

    pub async fn set_volume(&self, room: RoomId, percent: i64) -> MusicResult<CommandOutcome> {
        if !(0..=100).contains(&percent) {
            return Err(MusicError::InvalidVolumeRange(percent));
        }
        let session = self.registry.get(room).ok_or(MusicError::NothingPlaying)?;
        session.set_volume(percent).await?;
        Ok(CommandOutcome::VolumeSet(percent))
    }

    pub fn now_playing(&self, room: RoomId) -> MusicResult<CommandOutcome> {
        let session = self.registry.get(room).ok_or(MusicError::NothingPlaying)?;
        let (song, paused) = session.now_playing()?;
        Ok(CommandOutcome::NowPlaying { song, paused })
    }

    /// Página de la cola (base 1; valores menores se tratan como 1)
    pub fn list_queue(&self, room: RoomId, page: i64) -> MusicResult<CommandOutcome> {
        let session = self.registry.get(room).ok_or(MusicError::EmptyQueue)?;
        if session.queue().is_empty() {
            return Err(MusicError::EmptyQueue);
        }
        let page = usize::try_from(page.max(1)).unwrap_or(1);
        Ok(CommandOutcome::Queue(session.queue().page(page, self.page_size)))
    }

    pub fn shuffle(&self, room: RoomId) -> MusicResult<CommandOutcome> {
        let session = self.registry.get(room).ok_or(MusicError::EmptyQueue)?;
        let len = session.queue().len();
        if len == 0 {
            return Err(MusicError::EmptyQueue);
        }
        session.queue().shuffle();
        Ok(CommandOutcome::Shuffled(len))
    }

    /// Elimina la canción en la posición `index` (base 1)
    pub fn remove_at(&self, room: RoomId, index: i64) -> MusicResult<CommandOutcome> {
        let session = self.registry.get(room).ok_or(MusicError::EmptyQueue)?;
        let len = session.queue().len();
        if len == 0 {
            return Err(MusicError::EmptyQueue);
        }
        let position = usize::try_from(index)
            .ok()
            .filter(|position| (1..=len).contains(position))
            .ok_or(MusicError::InvalidIndex { index, len })?;

        let removed = session
            .queue()
            .remove_at(position - 1)
            .map_err(|QueueError::IndexOutOfRange { len, .. }| MusicError::InvalidIndex { index, len })?;
        info!("❌ Eliminada de la cola: {}", removed.title);
        Ok(CommandOutcome::Removed(removed))
    }

    pub async fn disconnect(&self, room: RoomId) -> MusicResult<CommandOutcome> {
        let connected = self
            .registry
            .get(room)
            .is_some_and(|session| session.is_connected());
        if !connected {
            return Err(MusicError::NotConnected);
        }
        self.registry.destroy(room).await;
        Ok(CommandOutcome::Disconnected)
    }

    fn room_lock(&self, room: RoomId) -> Arc<Mutex<()>> {
        self.connecting.entry(room).or_default().clone()
    }

    /// Sesión viva de la sala conectada a `channel`, conectando si aún no hay voz
    async fn connected_session(&self, room: RoomId, channel: ChannelRef) -> MusicResult<RoomSession> {
        let lock = self.room_lock(room);
        let _guard = lock.lock().await;

        let session = self.registry.get_or_create(room);
        match session.channel() {
            Some(current) if current == channel => Ok(session),
            Some(_) => Err(MusicError::AlreadyConnectedElsewhere),
            None => {
                self.connect(&session, channel).await?;
                Ok(session)
            }
        }
    }

    async fn connect(&self, session: &RoomSession, channel: ChannelRef) -> MusicResult<ChannelRef> {
        let room = session.room();
        let sink = self
            .connector
            .connect(room, channel)
            .await
            .map_err(|e| MusicError::Voice(e.to_string()))?;

        match session.attach(sink.clone()).await {
            Ok(channel) => Ok(channel),
            Err(e) => {
                warn!("No se pudo asociar la conexión de voz a la sala {}: {}", room, e);
                if let Err(release) = sink.release().await {
                    warn!("Error al liberar la conexión huérfana: {}", release);
                }
                Err(e)
            }
        }
    }
}
