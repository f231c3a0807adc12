use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{
    controller::{spawn_session, PlayerEvent, RoomSession, SessionId},
    RoomId,
};
use crate::config::Config;

pub use super::controller::SessionSettings;

const EVENT_CAPACITY: usize = 256;

/// Mapa concurrente sala → sesión viva.
///
/// A lo sumo hay una sesión por sala. Cuando el controlador de una sala
/// termina por su cuenta (inactividad, fallo de voz) se da de baja solo,
/// pero únicamente si la entrada sigue siendo suya.
pub struct SessionRegistry {
    sessions: Arc<DashMap<RoomId, RoomSession>>,
    settings: SessionSettings,
    next_id: AtomicU64,
    events: broadcast::Sender<PlayerEvent>,
}

impl SessionRegistry {
    pub fn new(config: &Config) -> Self {
        Self::with_settings(SessionSettings::from(config))
    }

    pub fn with_settings(settings: SessionSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions: Arc::new(DashMap::new()),
            settings,
            next_id: AtomicU64::new(1),
            events,
        }
    }

    /// Devuelve la sesión de la sala, creándola si no existe
    pub fn get_or_create(&self, room: RoomId) -> RoomSession {
        if let Some(existing) = self.sessions.get(&room) {
            if !existing.is_closed() {
                return existing.clone();
            }
        }

        let entry = self
            .sessions
            .entry(room)
            .and_modify(|session| {
                if session.is_closed() {
                    debug!("Reemplazando sesión cerrada {} de sala {}", session.id(), room);
                    *session = self.spawn(room);
                }
            })
            .or_insert_with(|| self.spawn(room));
        entry.value().clone()
    }

    /// Sesión viva de la sala, sin crear una nueva
    pub fn get(&self, room: RoomId) -> Option<RoomSession> {
        self.sessions
            .get(&room)
            .map(|session| session.clone())
            .filter(|session| !session.is_closed())
    }

    /// Cierra la sesión de la sala. Idempotente: `false` si no había ninguna.
    pub async fn destroy(&self, room: RoomId) -> bool {
        let Some((_, session)) = self.sessions.remove(&room) else {
            return false;
        };
        info!("🗑️ Destruyendo sesión {} de sala {}", session.id(), room);
        session.disconnect().await;
        true
    }

    /// Cierra todas las sesiones (apagado del proceso)
    pub async fn shutdown_all(&self) {
        let rooms: Vec<RoomId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        if rooms.is_empty() {
            return;
        }
        info!("👋 Cerrando {} sesiones activas", rooms.len());
        for room in rooms {
            self.destroy(room).await;
        }
    }

    /// Eventos de todas las salas (NowPlaying, Disconnected)
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn rooms(&self) -> Vec<RoomId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    fn spawn(&self, room: RoomId) -> RoomSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sessions = Arc::downgrade(&self.sessions);
        spawn_session(room, id, &self.settings, self.events.clone(), move |room, id| {
            evict_if_current(&sessions, room, id)
        })
    }
}

/// Quita la sala del mapa solo si la entrada sigue apuntando a la sesión `id`.
fn evict_if_current(sessions: &Weak<DashMap<RoomId, RoomSession>>, room: RoomId, id: SessionId) {
    let Some(sessions) = sessions.upgrade() else {
        return;
    };
    if sessions.remove_if(&room, |_, session| session.id() == id).is_some() {
        debug!("Sesión {} de sala {} dada de baja del registro", id, room);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        controller::{DisconnectReason, PlayerState},
        sink::testing::{RecordingSink, SinkCall},
        song::Song,
        ChannelRef, MemberId,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn registry(idle: Duration) -> SessionRegistry {
        SessionRegistry::with_settings(SessionSettings {
            idle_timeout: idle,
            ..SessionSettings::default()
        })
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_session() {
        let registry = registry(Duration::from_secs(30));
        let a = registry.get_or_create(RoomId(1));
        let b = registry.get_or_create(RoomId(1));
        let other = registry.get_or_create(RoomId(2));

        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), other.id());
        assert_eq!(registry.len(), 2);
        assert!(registry.get(RoomId(3)).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_session() {
        let registry = Arc::new(registry(Duration::from_secs(30)));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(RoomId(9)).id() })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let registry = registry(Duration::from_secs(30));
        let session = registry.get_or_create(RoomId(1));
        let sink = RecordingSink::new(ChannelRef(5));
        session.attach(sink.clone()).await.unwrap();
        session.enqueue(Song::new("A", "s", "u", MemberId(1)));

        assert!(registry.destroy(RoomId(1)).await);
        assert!(!registry.destroy(RoomId(1)).await);
        assert!(registry.is_empty());
        assert_eq!(session.state(), PlayerState::Disconnected);
        assert!(sink.calls().contains(&SinkCall::Release));
    }

    #[tokio::test]
    async fn test_idle_session_evicts_itself() {
        let registry = registry(Duration::from_millis(40));
        let mut events = registry.subscribe();
        let session = registry.get_or_create(RoomId(1));

        tokio::time::timeout(Duration::from_secs(2), session.closed())
            .await
            .expect("session should time out");

        assert_eq!(
            events.recv().await.unwrap(),
            PlayerEvent::Disconnected {
                room: RoomId(1),
                reason: DisconnectReason::IdleTimeout
            }
        );
        assert!(registry.get(RoomId(1)).is_none());
        assert!(registry.is_empty());

        let fresh = registry.get_or_create(RoomId(1));
        assert_ne!(fresh.id(), session.id());
    }

    #[tokio::test]
    async fn test_stale_eviction_keeps_newer_session() {
        let registry = registry(Duration::from_secs(30));
        let old = registry.get_or_create(RoomId(1));
        registry.destroy(RoomId(1)).await;
        let new = registry.get_or_create(RoomId(1));

        evict_if_current(&Arc::downgrade(&registry.sessions), RoomId(1), old.id());
        assert_eq!(registry.get(RoomId(1)).map(|s| s.id()), Some(new.id()));
    }

    #[tokio::test]
    async fn test_shutdown_all_closes_every_room() {
        let registry = registry(Duration::from_secs(30));
        let sessions: Vec<_> = (1..=3).map(|i| registry.get_or_create(RoomId(i))).collect();

        registry.shutdown_all().await;

        assert!(registry.is_empty());
        for session in sessions {
            assert_eq!(session.state(), PlayerState::Disconnected);
        }
    }
}
