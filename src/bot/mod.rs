//! # Bot Module
//!
//! Discord surface of the jukebox.
//!
//! - Slash command registration ([`commands`])
//! - Interaction handling: options → [`facade::Command`] → embed ([`handlers`])
//! - The transport-independent command façade ([`facade`])
//! - Songbird-backed voice sink and connector ([`voice`])
//! - "Now playing" announcements ([`events`])
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]; all playback state
//! lives in the session registry it shares with the façade.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod facade;
pub mod handlers;
pub mod voice;

use crate::{
    audio::{registry::SessionRegistry, RoomId},
    config::Config,
};
use facade::MusicService;

/// Main Discord event handler.
pub struct JukeboxBot {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    service: MusicService,
    announcer_started: AtomicBool,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, registry: Arc<SessionRegistry>, service: MusicService) -> Self {
        Self {
            config,
            registry,
            service,
            announcer_started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate in about a second;
    /// global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión del gateway
        if !self.announcer_started.swap(true, Ordering::SeqCst) {
            events::spawn_announcer(ctx.http.clone(), self.registry.subscribe());
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Si alguien desconecta al bot a mano, la sesión de esa guild se cierra.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            warn!("Desconexión de voz sin guild asociada");
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);
        self.registry.destroy(RoomId(guild_id.get())).await;
    }
}
