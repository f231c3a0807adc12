use thiserror::Error;

/// Errores de dominio que se devuelven a la capa de comandos.
///
/// Ninguno de ellos termina el controlador de una sala: se muestran al
/// usuario y la sesión sigue viva.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MusicError {
    #[error("Ocurrió un error al procesar la búsqueda: {0}")]
    Resolution(String),

    #[error("No estoy conectado a ningún canal de voz")]
    NotConnected,

    #[error("No estás conectado a un canal de voz ni indicaste uno")]
    MemberNotInVoice,

    #[error("Ya estoy conectado a otro canal de voz")]
    AlreadyConnectedElsewhere,

    #[error("No hay nada reproduciéndose en este momento")]
    NothingPlaying,

    #[error("No hay nada en la cola")]
    EmptyQueue,

    #[error("Índice {index} fuera de rango (la cola tiene {len} canciones)")]
    InvalidIndex { index: i64, len: usize },

    #[error("El volumen debe estar entre 0 y 100 (recibido: {0})")]
    InvalidVolumeRange(i64),

    #[error("La sesión de esta sala ya terminó")]
    SessionClosed,

    #[error("Error de conexión de voz: {0}")]
    Voice(String),

    #[error("Comando no reconocido: {0}")]
    UnknownCommand(String),

    #[error("Falta el argumento `{0}`")]
    MissingArgument(&'static str),
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_user_facing() {
        assert_eq!(
            MusicError::InvalidVolumeRange(150).to_string(),
            "El volumen debe estar entre 0 y 100 (recibido: 150)"
        );
        assert_eq!(
            MusicError::InvalidIndex { index: 7, len: 3 }.to_string(),
            "Índice 7 fuera de rango (la cola tiene 3 canciones)"
        );
    }
}
