use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::votes::DEFAULT_SKIP_THRESHOLD;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    pub default_volume: f32,
    #[serde(with = "humantime_serde_compat")]
    pub idle_timeout: Duration,
    pub skip_vote_threshold: usize,
    pub queue_page_size: usize,

    // Resolución de medios
    pub ytdlp_path: String,
    #[serde(with = "humantime_serde_compat")]
    pub resolve_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Reproducción
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            idle_timeout: parse_duration_var("IDLE_TIMEOUT", "5m")?,
            skip_vote_threshold: std::env::var("SKIP_VOTE_THRESHOLD")
                .unwrap_or_else(|_| DEFAULT_SKIP_THRESHOLD.to_string())
                .parse()?,
            queue_page_size: std::env::var("QUEUE_PAGE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Resolución
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            resolve_timeout: parse_duration_var("RESOLVE_TIMEOUT", "30s")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Idle timeout must be at least one second
    /// - Skip threshold and page size must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.idle_timeout < Duration::from_secs(1) {
            anyhow::bail!(
                "Idle timeout must be at least 1s, got: {}",
                humantime::format_duration(self.idle_timeout)
            );
        }

        if self.skip_vote_threshold == 0 {
            anyhow::bail!("Skip vote threshold must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the bot token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Playback: {}% vol, idle {}, {} votes to skip\n  \
            Queue: {} per page\n  \
            Resolver: {} (timeout {})",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0).round() as u32,
            humantime::format_duration(self.idle_timeout),
            self.skip_vote_threshold,
            self.queue_page_size,
            self.ytdlp_path,
            humantime::format_duration(self.resolve_timeout),
        )
    }
}

fn parse_duration_var(name: &str, default: &str) -> Result<Duration> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    humantime::parse_duration(raw.trim())
        .with_context(|| format!("{} inválido: {:?}", name, raw))
}

/// Durations serialize as humantime strings ("5m", "30s").
mod humantime_serde_compat {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            idle_timeout: Duration::from_secs(300),
            skip_vote_threshold: DEFAULT_SKIP_THRESHOLD,
            queue_page_size: 10,

            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.skip_vote_threshold, 3);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config {
            default_volume: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.default_volume = 0.5;
        config.skip_vote_threshold = 0;
        assert!(config.validate().is_err());

        config.skip_vote_threshold = 3;
        config.idle_timeout = Duration::from_millis(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("idle 5m"));
    }

    #[test]
    fn test_durations_round_trip_through_json() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["idle_timeout"], "5m");
        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back.resolve_timeout, Duration::from_secs(30));
    }
}
