use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{ChannelRef, MemberId, RoomId},
    bot::{
        facade::{Command, CommandArgs, Invocation},
        JukeboxBot,
    },
    error::MusicError,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        let embed = embeds::create_info_embed("❌ Este comando solo funciona dentro de un servidor");
        respond(ctx, &command, embed, true).await?;
        return Ok(());
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let args = parse_args(&command);
    let parsed = match Command::parse(&command.data.name, &args) {
        Ok(parsed) => parsed,
        Err(e) => {
            respond(ctx, &command, error_embed(&e), true).await?;
            return Ok(());
        }
    };

    let invocation = Invocation {
        room: RoomId(guild_id.get()),
        member: MemberId(command.user.id.get()),
        member_channel: get_user_voice_channel(ctx, guild_id, command.user.id)
            .map(|channel| ChannelRef(channel.get())),
        text_channel: Some(ChannelRef(command.channel_id.get())),
    };

    // Resolver y conectar puede tardar más que el límite de 3s de Discord
    let deferred = matches!(parsed, Command::Play { .. } | Command::Join | Command::Summon { .. });
    if deferred {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await?;
    }

    let (embed, ephemeral) = match bot.service.execute(invocation, parsed).await {
        Ok(outcome) => (embeds::create_outcome_embed(&outcome), false),
        Err(e) => {
            warn!("Comando /{} falló en guild {}: {}", command.data.name, guild_id, e);
            (error_embed(&e), true)
        }
    };

    if deferred {
        command
            .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
            .await?;
    } else {
        respond(ctx, &command, embed, ephemeral).await?;
    }

    Ok(())
}

/// Convierte las opciones de la interacción en argumentos del comando
fn parse_args(command: &CommandInteraction) -> CommandArgs {
    let mut args = CommandArgs::default();
    for option in &command.data.options {
        match (option.name.as_str(), &option.value) {
            ("query", CommandDataOptionValue::String(query)) => args.query = Some(query.clone()),
            ("channel", CommandDataOptionValue::Channel(channel)) => {
                args.channel = Some(ChannelRef(channel.get()))
            }
            ("level", CommandDataOptionValue::Integer(level)) => args.volume = Some(*level),
            ("page", CommandDataOptionValue::Integer(page)) => args.page = Some(*page),
            ("index", CommandDataOptionValue::Integer(index)) => args.index = Some(*index),
            (name, _) => warn!("Opción desconocida /{} {}", command.data.name, name),
        }
    }
    args
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

fn error_embed(error: &MusicError) -> CreateEmbed {
    embeds::create_error_embed(error)
}

// Funciones auxiliares

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
