//! Modelos de dominio (bots, turnos de conversación y documentos cargados).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuración inmutable de un bot. La posee el registro; el resto de
/// componentes trabaja con referencias o `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    /// Colección en la base de datos vectorial. Única entre bots.
    pub collection_name: String,
    /// Directorio de documentos. Único entre bots.
    pub data_dir: PathBuf,
}

/// Vista pública de un bot para `GET /bots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl From<&Bot> for BotSummary {
    fn from(bot: &Bot) -> Self {
        Self {
            id: bot.id.clone(),
            name: bot.name.clone(),
            description: bot.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Un turno de la conversación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Texto extraído de un fichero del directorio de un bot.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub filename: String,
    pub text: String,
}

/// Trozo de texto listo para calcular su embedding.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub id: String,
    pub source: String,
    pub index: usize,
    pub text: String,
}
