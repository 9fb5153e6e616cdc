//! Taxonomía de errores del gestor de sesiones de bots.

use thiserror::Error;

pub type BotResult<T> = std::result::Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Bot no encontrado: {0}")]
    BotNotFound(String),

    #[error("Documento no encontrado: {0}")]
    DocumentNotFound(String),

    #[error("Nombre de fichero inválido: '{0}'")]
    InvalidFilename(String),

    /// El bot no tiene índice: hay que subir un documento primero.
    #[error("El índice no está inicializado para el bot {0}. Sube un documento primero.")]
    IndexNotReady(String),

    /// El fichero se guardó pero la reconstrucción del índice falló.
    #[error("No se pudo construir el índice del bot {bot_id}")]
    IndexBuild { bot_id: String },

    #[error("Error del motor de chat: {0}")]
    Engine(#[source] anyhow::Error),

    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Código estable para las respuestas HTTP.
    pub fn code(&self) -> &'static str {
        match self {
            BotError::BotNotFound(_) => "BOT_NOT_FOUND",
            BotError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            BotError::InvalidFilename(_) => "INVALID_FILENAME",
            BotError::IndexNotReady(_) => "INDEX_NOT_READY",
            BotError::IndexBuild { .. } => "INDEX_BUILD_FAILED",
            BotError::Engine(_) => "ENGINE_ERROR",
            BotError::Io(_) => "IO_ERROR",
        }
    }
}
