use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{queue::QueuePage, song::Song, votes::VoteOutcome},
    bot::facade::CommandOutcome,
    error::MusicError,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Jukebox";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(song: &Song, paused: bool) -> CreateEmbed {
    let title = if paused {
        "⏸️ En Pausa"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("```css\n{}\n```", song.title))
        .color(if paused { colors::WARNING_ORANGE } else { colors::MUSIC_PURPLE })
        .field("⏱️ Duración", song.duration_label(), true)
        .field("👤 Solicitado por", mention(song), true)
        .field("🎤 Subido por", uploader_link(song), true)
        .field("🔗 Enlace", format!("[Click]({})", song.source_url), true);

    if let Some(thumbnail) = &song.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(song: &Song, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Agregada a la Cola")
        .description(song.to_string())
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", position.to_string(), true)
        .field("👤 Solicitado por", mention(song), true);

    if let Some(thumbnail) = &song.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&song.source_url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando le toque",
        ))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(page: &QueuePage) -> CreateEmbed {
    let mut description = format!("**{} canciones:**\n\n", page.total_items);
    description.push_str(&queue_lines(page));

    let mut footer = format!("Viendo página {}/{}", page.current_page, page.total_pages);
    let duration = page.total_duration();
    if duration > Duration::ZERO {
        footer.push_str(&format!(" • Duración de la página: {}", format_duration(duration)));
    }

    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(footer))
}

/// Líneas "`n.` [**título**](url)" de una página de la cola
pub fn queue_lines(page: &QueuePage) -> String {
    if page.entries.is_empty() {
        return "😴 No hay canciones en esta página".to_string();
    }

    page.entries
        .iter()
        .map(|entry| {
            let duration = entry
                .song
                .duration()
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();
            format!(
                "`{}.` [**{}**]({}){}\n",
                entry.position, entry.song.title, entry.song.source_url, duration
            )
        })
        .collect()
}

/// Crea un embed de error
pub fn create_error_embed(error: &MusicError) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(error.to_string())
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(description)
        .color(colors::SUCCESS_GREEN)
}

/// Crea un embed de información
pub fn create_info_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(description)
        .color(colors::NEUTRAL_GRAY)
}

/// Traduce el resultado de un comando a un embed
pub fn create_outcome_embed(outcome: &CommandOutcome) -> CreateEmbed {
    match outcome {
        CommandOutcome::Enqueued { song, position } => create_track_added_embed(song, *position),
        CommandOutcome::NowPlaying { song, paused } => create_now_playing_embed(song, *paused),
        CommandOutcome::Queue(page) => create_queue_embed(page),
        CommandOutcome::Skip(VoteOutcome::AlreadyVoted { .. }) => {
            create_info_embed(&outcome_summary(outcome))
        }
        CommandOutcome::Skip(VoteOutcome::VoteAdded { .. }) => CreateEmbed::default()
            .description(outcome_summary(outcome))
            .color(colors::INFO_BLUE),
        _ => create_success_embed(&outcome_summary(outcome)),
    }
}

/// Texto corto de cada resultado
pub fn outcome_summary(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Joined(channel) => format!("🔊 Conectado a <#{}>", channel),
        CommandOutcome::Moved(channel) => format!("🚚 Movido a <#{}>", channel),
        CommandOutcome::Enqueued { song, .. } => format!("➕ Agregada a la cola: {}", song),
        CommandOutcome::Paused => "⏸️ Reproducción pausada".to_string(),
        CommandOutcome::Resumed => "▶️ Reproducción reanudada".to_string(),
        CommandOutcome::Stopped { cleared: 0 } => "⏹️ Reproducción detenida".to_string(),
        CommandOutcome::Stopped { cleared } => {
            format!("⏹️ Reproducción detenida y {} canciones removidas de la cola", cleared)
        }
        CommandOutcome::Skip(VoteOutcome::RequesterSkip | VoteOutcome::ThresholdReached) => {
            "⏭️ Canción saltada".to_string()
        }
        CommandOutcome::Skip(VoteOutcome::VoteAdded { count, required }) => {
            format!("🗳️ Voto para saltar agregado, van **{}/{}**", count, required)
        }
        CommandOutcome::Skip(VoteOutcome::AlreadyVoted { count, required }) => format!(
            "Ya votaste para saltar esta canción (**{}/{}**)",
            count, required
        ),
        CommandOutcome::VolumeSet(percent) => {
            format!("🔊 Volumen ajustado a {}% {}", percent, volume_bar(*percent))
        }
        CommandOutcome::NowPlaying { song, .. } => format!("🎵 {}", song),
        CommandOutcome::Queue(page) => format!(
            "📋 {} canciones en cola (página {}/{})",
            page.total_items, page.current_page, page.total_pages
        ),
        CommandOutcome::Shuffled(count) => format!("🔀 Cola mezclada ({} canciones)", count),
        CommandOutcome::Removed(song) => format!("❌ Eliminada de la cola: **{}**", song.title),
        CommandOutcome::Disconnected => "👋 Desconectado del canal de voz".to_string(),
    }
}

/// Barra visual de volumen (10 segmentos)
pub fn volume_bar(percent: i64) -> String {
    let segments = 10;
    let filled = (percent.clamp(0, 100) as usize * segments).div_ceil(100);
    format!("`[{}{}]`", "█".repeat(filled), "▒".repeat(segments - filled))
}

fn mention(song: &Song) -> String {
    format!("<@{}>", song.requester)
}

fn uploader_link(song: &Song) -> String {
    match &song.uploader_url {
        Some(url) => format!("[{}]({})", song.uploader(), url),
        None => song.uploader().to_string(),
    }
}

/// Formatea duración como "m:ss" o "h:mm:ss"
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{queue::SongQueue, MemberId};

    fn song(title: &str, secs: Option<u64>) -> Song {
        let song = Song::new(title, "stream", format!("https://yt/{title}"), MemberId(5));
        match secs {
            Some(secs) => song.with_duration_secs(secs),
            None => song,
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_duration(Duration::ZERO), "0:00");
    }

    #[test]
    fn test_queue_lines_use_absolute_positions() {
        let queue = SongQueue::new();
        for i in 0..12 {
            queue.enqueue(song(&format!("s{i}"), Some(61)));
        }
        let lines = queue_lines(&queue.page(2, 10));
        assert_eq!(
            lines,
            "`11.` [**s10**](https://yt/s10) `[1:01]`\n`12.` [**s11**](https://yt/s11) `[1:01]`\n"
        );
    }

    #[test]
    fn test_queue_lines_for_empty_page() {
        let queue = SongQueue::new();
        queue.enqueue(song("live", None));
        assert!(queue_lines(&queue.page(5, 10)).contains("No hay canciones"));
        assert_eq!(queue_lines(&queue.page(1, 10)), "`1.` [**live**](https://yt/live)\n");
    }

    #[test]
    fn test_volume_bar() {
        assert_eq!(volume_bar(0), "`[▒▒▒▒▒▒▒▒▒▒]`");
        assert_eq!(volume_bar(40), "`[████▒▒▒▒▒▒]`");
        assert_eq!(volume_bar(100), "`[██████████]`");
    }

    #[test]
    fn test_outcome_summaries() {
        assert_eq!(
            outcome_summary(&CommandOutcome::Skip(VoteOutcome::VoteAdded { count: 2, required: 3 })),
            "🗳️ Voto para saltar agregado, van **2/3**"
        );
        assert_eq!(
            outcome_summary(&CommandOutcome::Stopped { cleared: 4 }),
            "⏹️ Reproducción detenida y 4 canciones removidas de la cola"
        );
        assert_eq!(
            outcome_summary(&CommandOutcome::Enqueued { song: song("A", Some(5)), position: 1 }),
            "➕ Agregada a la cola: **A** de **Desconocido** *[Duración: 5 segundos]*"
        );
    }
}
