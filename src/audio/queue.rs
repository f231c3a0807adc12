use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::{collections::VecDeque, time::Duration};
use thiserror::Error;
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, info};

use super::song::Song;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Índice {index} fuera de rango (longitud {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Resultado de una espera acotada sobre la cola.
#[derive(Debug, Clone, PartialEq)]
pub enum PopOutcome {
    Song(Song),
    TimedOut,
}

/// Cola FIFO de canciones de una sala.
///
/// Cualquier tarea puede encolar; solo el controlador de la sala consume.
/// `pop` es cancel-safe: un elemento solo sale del `VecDeque` dentro de una
/// sección sin puntos de suspensión, así que abandonar el future nunca pierde
/// una canción.
#[derive(Debug, Default)]
pub struct SongQueue {
    items: Mutex<VecDeque<Song>>,
    available: Notify,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega una canción al final de la cola y devuelve la longitud resultante
    pub fn enqueue(&self, song: Song) -> usize {
        info!("➕ Agregado a la cola: {}", song.title);
        let len = {
            let mut items = self.items.lock();
            items.push_back(song);
            items.len()
        };
        self.available.notify_one();
        len
    }

    /// Espera hasta que haya una canción y la devuelve (FIFO)
    pub async fn pop(&self) -> Song {
        loop {
            let notified = self.available.notified();
            let next = self.items.lock().pop_front();
            if let Some(song) = next {
                debug!("➡️ Siguiente en cola (FIFO): {}", song.title);
                return song;
            }
            notified.await;
        }
    }

    /// Igual que [`pop`](Self::pop) pero se rinde al llegar a `deadline`
    pub async fn pop_until(&self, deadline: Instant) -> PopOutcome {
        match tokio::time::timeout_at(deadline, self.pop()).await {
            Ok(song) => PopOutcome::Song(song),
            Err(_) => PopOutcome::TimedOut,
        }
    }

    pub async fn pop_timeout(&self, timeout: Duration) -> PopOutcome {
        self.pop_until(Instant::now() + timeout).await
    }

    /// Limpia la cola y devuelve cuántas canciones se descartaron
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let cleared = items.len();
        items.clear();
        if cleared > 0 {
            info!("🗑️ Cola limpiada: {} canciones removidas", cleared);
        }
        cleared
    }

    /// Mezcla la cola
    pub fn shuffle(&self) {
        let mut items = self.items.lock();
        items.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada ({} canciones)", items.len());
    }

    /// Elimina la canción en `index` (base 0)
    pub fn remove_at(&self, index: usize) -> Result<Song, QueueError> {
        let mut items = self.items.lock();
        let len = items.len();
        let removed = items
            .remove(index)
            .ok_or(QueueError::IndexOutOfRange { index, len })?;
        debug!("❌ Canción eliminada en posición {}: {}", index, removed.title);
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copia de `[start, end)`, recortada a los límites de la cola
    pub fn slice(&self, start: usize, end: usize) -> Vec<Song> {
        let items = self.items.lock();
        let end = end.min(items.len());
        if start >= end {
            return Vec::new();
        }
        items.range(start..end).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<Song> {
        self.items.lock().iter().cloned().collect()
    }

    /// Obtiene una página específica de la cola (páginas desde 1)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let items = self.items.lock();
        let total_items = items.len();
        let safe_page = page.max(1);
        let start = (safe_page - 1).saturating_mul(items_per_page);
        let end = start.saturating_add(items_per_page).min(total_items);
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };

        let entries = if start < end {
            items
                .range(start..end)
                .enumerate()
                .map(|(offset, song)| QueueEntry {
                    position: start + offset + 1,
                    song: song.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        QueuePage {
            entries,
            current_page: safe_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Posición en la cola, base 1 (la misma que acepta `/remove`).
    pub position: usize,
    pub song: Song,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub entries: Vec<QueueEntry>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl QueuePage {
    pub fn total_duration(&self) -> Duration {
        self.entries.iter().filter_map(|e| e.song.duration()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemberId;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn song(title: &str) -> Song {
        Song::new(title, format!("stream://{title}"), format!("https://yt/{title}"), MemberId(1))
    }

    fn titles(songs: &[Song]) -> Vec<String> {
        songs.iter().map(|s| s.title.clone()).collect()
    }

    #[tokio::test]
    async fn test_pop_is_fifo() {
        let queue = SongQueue::new();
        for title in ["a", "b", "c", "d"] {
            queue.enqueue(song(title));
        }

        let mut popped = Vec::new();
        for _ in 0..4 {
            popped.push(queue.pop().await.title);
        }
        assert_eq!(popped, vec!["a", "b", "c", "d"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_reports_length_after_push() {
        let queue = SongQueue::new();
        assert_eq!(queue.enqueue(song("a")), 1);
        assert_eq!(queue.enqueue(song("b")), 2);

        queue.pop().await;
        assert_eq!(queue.enqueue(song("c")), 2);
    }

    #[tokio::test]
    async fn test_pop_waits_for_producer() {
        let queue = Arc::new(SongQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.enqueue(song("late"));
        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should wake up")
            .expect("task panicked");
        assert_eq!(popped.title, "late");
    }

    #[tokio::test]
    async fn test_pop_timeout_reports_timed_out() {
        let queue = SongQueue::new();
        let outcome = queue.pop_timeout(Duration::from_millis(20)).await;
        assert_eq!(outcome, PopOutcome::TimedOut);

        queue.enqueue(song("x"));
        match queue.pop_timeout(Duration::from_millis(20)).await {
            PopOutcome::Song(s) => assert_eq!(s.title, "x"),
            PopOutcome::TimedOut => panic!("expected a song"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_pop_does_not_lose_songs() {
        let queue = SongQueue::new();
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)).await, PopOutcome::TimedOut);

        queue.enqueue(song("a"));
        queue.enqueue(song("b"));
        assert_eq!(queue.pop().await.title, "a");
        assert_eq!(queue.pop().await.title, "b");
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let queue = SongQueue::new();
        let original: Vec<String> = (0..25).map(|i| format!("song-{i}")).collect();
        for title in &original {
            queue.enqueue(song(title));
        }

        queue.shuffle();

        let mut after = titles(&queue.snapshot());
        assert_eq!(after.len(), original.len());
        after.sort();
        let mut expected = original.clone();
        expected.sort();
        assert_eq!(after, expected);
    }

    #[test]
    fn test_remove_at_shifts_following_items() {
        let queue = SongQueue::new();
        for title in ["a", "b", "c", "d", "e"] {
            queue.enqueue(song(title));
        }

        let removed = queue.remove_at(2).unwrap();
        assert_eq!(removed.title, "c");
        assert_eq!(titles(&queue.snapshot()), vec!["a", "b", "d", "e"]);

        assert_eq!(
            queue.remove_at(4),
            Err(QueueError::IndexOutOfRange { index: 4, len: 4 })
        );
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_clear_reports_count() {
        let queue = SongQueue::new();
        queue.enqueue(song("a"));
        queue.enqueue(song("b"));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }

    #[test]
    fn test_slice_is_clamped() {
        let queue = SongQueue::new();
        for title in ["a", "b", "c"] {
            queue.enqueue(song(title));
        }
        assert_eq!(titles(&queue.slice(1, 10)), vec!["b", "c"]);
        assert!(queue.slice(5, 10).is_empty());
        assert!(queue.slice(2, 1).is_empty());
    }

    #[test]
    fn test_page_positions_and_counts() {
        let queue = SongQueue::new();
        for i in 0..23 {
            queue.enqueue(song(&format!("s{i}")));
        }

        let page = queue.page(3, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items, 23);
        assert_eq!(page.current_page, 3);
        let positions: Vec<usize> = page.entries.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![21, 22, 23]);

        let first = queue.page(0, 10);
        assert_eq!(first.current_page, 1);
        assert_eq!(first.entries[0].song.title, "s0");

        assert!(queue.page(9, 10).entries.is_empty());
    }
}
