//! Carga y gestión de configuración de la aplicación (servidor, bots y LLM).

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    /// Directorio raíz de la base de datos vectorial persistente.
    pub vector_db_dir: PathBuf,
    /// Fichero JSON con la lista de bots. `None` usa la configuración embebida.
    pub bots_config: Option<PathBuf>,
    /// Directorio servido como fallback (frontend compilado), si existe.
    pub static_dir: Option<PathBuf>,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,

    pub memory_token_limit: usize,
    pub similarity_top_k: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8000".to_string(),
            vector_db_dir: PathBuf::from("./chroma-data"),
            bots_config: None,
            static_dir: None,
            llm_provider: LlmProvider::OpenAI,
            llm_embedding_model: "text-embedding-3-small".to_string(),
            llm_chat_model: "gpt-4o-mini".to_string(),
            memory_token_limit: 2000,
            similarity_top_k: 3,
        }
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let server_addr = env::var("SERVER_ADDR").unwrap_or(defaults.server_addr);
        let vector_db_dir = env::var("VECTOR_DB_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.vector_db_dir);
        let bots_config = env::var("BOTS_CONFIG").ok().map(PathBuf::from);
        let static_dir = env::var("STATIC_DIR").ok().map(PathBuf::from);

        let llm_provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_embedding_model =
            env::var("LLM_EMBEDDING_MODEL").unwrap_or(defaults.llm_embedding_model);
        let llm_chat_model = env::var("LLM_CHAT_MODEL").unwrap_or(defaults.llm_chat_model);

        let memory_token_limit = parse_usize("MEMORY_TOKEN_LIMIT", defaults.memory_token_limit)?;
        let similarity_top_k = parse_usize("SIMILARITY_TOP_K", defaults.similarity_top_k)?;
        if similarity_top_k == 0 {
            return Err(anyhow!("SIMILARITY_TOP_K debe ser mayor que 0"));
        }

        Ok(Self {
            server_addr,
            vector_db_dir,
            bots_config,
            static_dir,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            memory_token_limit,
            similarity_top_k,
        })
    }
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {key}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing_is_case_insensitive() {
        assert_eq!(LlmProvider::from_str("OpenAI").unwrap(), LlmProvider::OpenAI);
        assert_eq!(LlmProvider::from_str("ollama").unwrap(), LlmProvider::Ollama);
        assert!(LlmProvider::from_str("watsonx").is_err());
    }

    #[test]
    fn defaults_match_original_deployment() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.memory_token_limit, 2000);
        assert_eq!(cfg.similarity_top_k, 3);
        assert_eq!(cfg.vector_db_dir, PathBuf::from("./chroma-data"));
    }
}
