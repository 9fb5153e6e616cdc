//! Registro estático de bots: `id` → configuración, en orden de configuración.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::error::{BotError, BotResult};
use crate::models::Bot;

/// Configuración de bots incluida en el binario.
const EMBEDDED_BOTS: &str = include_str!("../config/bots.json");

#[derive(Debug, Clone)]
pub struct BotRegistry {
    bots: Vec<Arc<Bot>>,
}

impl BotRegistry {
    /// Construye el registro validando que ids, colecciones y directorios no se repitan.
    pub fn new(bots: Vec<Bot>) -> Result<Self> {
        if bots.is_empty() {
            return Err(anyhow!("La configuración no define ningún bot"));
        }

        let mut ids = HashSet::new();
        let mut collections = HashSet::new();
        let mut dirs = HashSet::new();
        for bot in &bots {
            if bot.id.trim().is_empty() {
                return Err(anyhow!("Hay un bot con id vacío"));
            }
            if !ids.insert(bot.id.as_str()) {
                return Err(anyhow!("Id de bot duplicado: {}", bot.id));
            }
            if !collections.insert(bot.collection_name.as_str()) {
                return Err(anyhow!(
                    "La colección '{}' está asignada a más de un bot",
                    bot.collection_name
                ));
            }
            if !dirs.insert(bot.data_dir.as_path()) {
                return Err(anyhow!(
                    "El directorio '{}' está asignado a más de un bot",
                    bot.data_dir.display()
                ));
            }
        }

        Ok(Self {
            bots: bots.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let bots: Vec<Bot> =
            serde_json::from_str(raw).context("JSON de configuración de bots inválido")?;
        Self::new(bots)
    }

    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_BOTS)
    }

    /// Carga desde `path` si se indica; si no, usa la configuración embebida.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let registry = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("No se pudo leer {}", path.display()))?;
                Self::from_json(&raw)?
            }
            None => Self::embedded()?,
        };
        info!("Registro de bots cargado ({} bots).", registry.len());
        Ok(registry)
    }

    pub fn get(&self, bot_id: &str) -> BotResult<Arc<Bot>> {
        self.bots
            .iter()
            .find(|bot| bot.id == bot_id)
            .cloned()
            .ok_or_else(|| BotError::BotNotFound(bot_id.to_string()))
    }

    pub fn list(&self) -> &[Arc<Bot>] {
        &self.bots
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}
