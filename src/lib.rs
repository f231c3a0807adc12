//! Per-guild music playback coordinator for Discord.
//!
//! The [`audio`] module holds the playback core (queue, skip votes, the
//! per-room controller task and the session registry). [`bot`] wires it to
//! serenity and songbird, and [`sources`] resolves queries through yt-dlp.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
