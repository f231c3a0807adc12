use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use jukebox::{
    audio::registry::SessionRegistry,
    bot::{facade::MusicService, voice::SongbirdConnector, JukeboxBot},
    config::Config,
    sources::YtDlpResolver,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    info!("🎵 Iniciando Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let registry = Arc::new(SessionRegistry::new(&config));
    let service = MusicService::new(
        registry.clone(),
        Arc::new(YtDlpResolver::from_config(&config)),
        Arc::new(SongbirdConnector::new(songbird.clone())),
        config.queue_page_size,
    );
    let handler = JukeboxBot::new(config.clone(), registry.clone(), service);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    dotenvy::dotenv().ok();
    let ytdlp = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());

    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&ytdlp)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes: {}", ytdlp);
    }
}
