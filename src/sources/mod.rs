//! Media resolution: turns a user query or URL into a playable [`Song`].
//!
//! The playback core only depends on the [`MediaResolver`] trait; the
//! shipped implementation shells out to `yt-dlp`.

pub mod ytdlp;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::{song::Song, MemberId};

pub use ytdlp::YtDlpResolver;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("No encontré nada que coincida con `{0}`")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

/// Trait común para resolver búsquedas en canciones reproducibles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resuelve `query` (texto o URL) para `requester`
    async fn resolve(&self, query: &str, requester: MemberId) -> Result<Song, ResolveError>;
}
