//! Discord embeds for command results and announcements.

pub mod embeds;
