//! # Audio Module
//!
//! Per-guild playback coordination for the jukebox.
//!
//! Every guild ("room") that uses the bot gets its own session: a queue of
//! requested songs, a volume, a set of skip votes and a long-lived
//! controller task that consumes the queue and drives the voice sink.
//! Rooms share nothing, so there is no global lock anywhere in here.
//!
//! ## Architecture
//!
//! ### [`song`] - Song metadata
//! - Plain value handed over by the media resolver
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue with a blocking, cancel-safe pop for the single consumer
//! - Shuffle, index removal and paging for the command layer
//!
//! ### [`votes`] - Skip voting
//! - Distinct voters, requester override, fixed threshold
//!
//! ### [`controller`] - Playback controller
//! - State machine task per room (awaiting song, playing, paused)
//! - Generation-tagged completion signals from the sink
//! - Idle auto-disconnect
//!
//! ### [`registry`] - Session registry
//! - Owns every live session, creates on demand, evicts on disconnect
//!
//! ### [`sink`] - Sink boundary
//! - Traits the voice transport implements ([`sink::AudioSink`],
//!   [`sink::VoiceConnector`])
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use jukebox::audio::{registry::SessionRegistry, RoomId};
//! use jukebox::config::Config;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = SessionRegistry::new(&Config::default());
//! let session = registry.get_or_create(RoomId(123456789));
//!
//! session.pause().await?;
//! session.set_volume(40).await?;
//! registry.destroy(RoomId(123456789)).await;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod controller;
pub mod queue;
pub mod registry;
pub mod sink;
pub mod song;
pub mod votes;

/// Identificador de una sala (guild de Discord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(pub u64);

/// Identificador de un miembro (solicitante o votante).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub u64);

/// Referencia opaca a un canal (de voz o de texto).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelRef(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
