use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use super::{ChannelRef, MemberId};

/// Canción lista para reproducir.
///
/// La crea el resolver de medios; a partir de ahí solo cambia la asociación
/// con quien la pidió (ver [`Song::with_requester`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub title: String,
    /// `None` para transmisiones en vivo.
    pub duration_secs: Option<u64>,
    pub uploader_name: Option<String>,
    pub uploader_url: Option<String>,
    /// URL directa del stream de audio que consume el sink.
    pub stream_ref: String,
    /// Página pública del video / pista.
    pub source_url: String,
    pub thumbnail: Option<String>,
    pub requester: MemberId,
    /// Canal de texto donde se anuncia "reproduciendo ahora".
    pub announce_channel: Option<ChannelRef>,
    pub enqueued_at: DateTime<Utc>,
}

impl Song {
    pub fn new(
        title: impl Into<String>,
        stream_ref: impl Into<String>,
        source_url: impl Into<String>,
        requester: MemberId,
    ) -> Self {
        Self {
            title: title.into(),
            duration_secs: None,
            uploader_name: None,
            uploader_url: None,
            stream_ref: stream_ref.into(),
            source_url: source_url.into(),
            thumbnail: None,
            requester,
            announce_channel: None,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_uploader(mut self, name: impl Into<String>, url: Option<String>) -> Self {
        self.uploader_name = Some(name.into());
        self.uploader_url = url;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_requester(mut self, requester: MemberId) -> Self {
        self.requester = requester;
        self
    }

    pub fn with_announce_channel(mut self, channel: ChannelRef) -> Self {
        self.announce_channel = Some(channel);
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }

    pub fn uploader(&self) -> &str {
        self.uploader_name.as_deref().unwrap_or("Desconocido")
    }

    /// Duración en formato largo: "1 horas, 3 minutos, 5 segundos".
    pub fn duration_label(&self) -> String {
        match self.duration_secs {
            Some(secs) => describe_duration(secs),
            None => "🔴 En vivo".to_string(),
        }
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "**{}** de **{}** *[Duración: {}]*",
            self.title,
            self.uploader(),
            self.duration_label()
        )
    }
}

/// Descompone segundos en días, horas, minutos y segundos omitiendo ceros.
pub fn describe_duration(total: u64) -> String {
    let (minutes, seconds) = (total / 60, total % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    let (days, hours) = (hours / 24, hours % 24);

    let parts: Vec<String> = [
        (days, "días"),
        (hours, "horas"),
        (minutes, "minutos"),
        (seconds, "segundos"),
    ]
    .iter()
    .filter(|(value, _)| *value > 0)
    .map(|(value, unit)| format!("{} {}", value, unit))
    .collect();

    if parts.is_empty() {
        "0 segundos".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_duration_skips_zero_units() {
        assert_eq!(describe_duration(0), "0 segundos");
        assert_eq!(describe_duration(59), "59 segundos");
        assert_eq!(describe_duration(3605), "1 horas, 5 segundos");
        assert_eq!(describe_duration(90_061), "1 días, 1 horas, 1 minutos, 1 segundos");
    }

    #[test]
    fn test_display_uses_uploader_fallback() {
        let song = Song::new("Song A", "https://cdn/a", "https://yt/a", MemberId(1))
            .with_duration_secs(125);
        assert_eq!(
            song.to_string(),
            "**Song A** de **Desconocido** *[Duración: 2 minutos, 5 segundos]*"
        );
    }

    #[test]
    fn test_requester_can_be_reassigned() {
        let song = Song::new("Song A", "s", "u", MemberId(1)).with_requester(MemberId(9));
        assert_eq!(song.requester, MemberId(9));
    }
}
