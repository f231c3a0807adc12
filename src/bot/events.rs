use anyhow::Result;
use serenity::{builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::audio::{controller::PlayerEvent, song::Song};
use crate::ui::embeds;

/// Reenvía los eventos "reproduciendo ahora" al canal de texto donde se
/// pidió cada canción.
pub fn spawn_announcer(http: Arc<Http>, mut events: broadcast::Receiver<PlayerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PlayerEvent::NowPlaying { room, song }) => {
                    debug!("Anunciando en sala {}: {}", room, song.title);
                    if let Err(e) = send_now_playing(&http, &song).await {
                        error!("Error al enviar mensaje now playing: {:?}", e);
                    }
                }
                Ok(PlayerEvent::Disconnected { room, reason }) => {
                    info!("🔌 Sala {} desconectada ({:?})", room, reason);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Anunciador atrasado, {} eventos descartados", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Anunciador detenido");
    })
}

/// Envía un mensaje de "Now Playing" al canal de la canción
async fn send_now_playing(http: &Http, song: &Song) -> Result<()> {
    let Some(channel) = song.announce_channel else {
        return Ok(());
    };

    ChannelId::new(channel.0)
        .send_message(
            http,
            CreateMessage::new().embed(embeds::create_now_playing_embed(song, false)),
        )
        .await?;

    Ok(())
}
