use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId, Permissions},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        summon_command(),
        play_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        skip_command(),
        volume_command(),
        now_command(),
        queue_command(),
        shuffle_command(),
        remove_command(),
        disconnect_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn summon_command() -> CreateCommand {
    CreateCommand::new("summon")
        .description("Llama al bot a un canal de voz (por defecto, el tuyo)")
        .default_member_permissions(Permissions::MANAGE_GUILD)
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "channel", "Canal de voz destino")
                .channel_types(vec![serenity::all::ChannelType::Voice]),
        )
}

fn disconnect_command() -> CreateCommand {
    CreateCommand::new("disconnect")
        .description("Limpia la cola y sale del canal de voz")
        .default_member_permissions(Permissions::MANAGE_GUILD)
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción (URL o búsqueda en YouTube)")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause")
        .description("Pausa la reproducción actual")
        .default_member_permissions(Permissions::MANAGE_GUILD)
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume")
        .description("Reanuda la reproducción pausada")
        .default_member_permissions(Permissions::MANAGE_GUILD)
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop")
        .description("Detiene la reproducción y limpia la cola")
        .default_member_permissions(Permissions::MANAGE_GUILD)
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip")
        .description("Vota para saltar la canción (quien la pidió la salta directo)")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                "Nivel de volumen (0-100)",
            )
            .min_int_value(0)
            .max_int_value(100)
            .required(true),
        )
}

fn now_command() -> CreateCommand {
    CreateCommand::new("now").description("Muestra la canción actual")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Elimina una canción de la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "index",
                "Posición en la cola (como aparece en /queue)",
            )
            .min_int_value(1)
            .required(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::facade::{Command, CommandArgs, COMMAND_TABLE};

    #[test]
    fn test_every_slash_command_has_a_parser() {
        let args = CommandArgs {
            query: Some("x".into()),
            volume: Some(10),
            index: Some(1),
            ..CommandArgs::default()
        };
        for command in all_commands() {
            let json = serde_json::to_value(&command).unwrap();
            let name = json["name"].as_str().unwrap().to_string();
            assert!(
                COMMAND_TABLE.iter().any(|(entry, _)| *entry == name),
                "/{name} no está en la tabla"
            );
            assert!(Command::parse(&name, &args).is_ok());
        }
    }
}
