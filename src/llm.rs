//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::{Chat, Message};
use rig::embeddings::EmbeddingModel; // <- para .embed_texts

use crate::config::{AppConfig, LlmProvider};
use crate::models::{Role, Turn};

/// Lo que el resto del servicio necesita de un proveedor: embeddings y chat.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Un vector por texto, en el mismo orden.
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>>;

    /// Responde a `message` con el `preamble` como instrucciones de sistema,
    /// `context` como documentos recuperados y `history` como conversación previa.
    async fn chat(
        &self,
        preamble: &str,
        context: &str,
        history: &[Turn],
        message: &str,
    ) -> Result<String>;
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    async fn embed_with_openai(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let client = openai::Client::from_env();

        let model_name = if self.embedding_model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.embedding_model.as_str()
        };
        let embedding_model = client.embedding_model(model_name);

        let expected = texts.len();
        let embeddings = embedding_model.embed_texts(texts).await?;
        if embeddings.len() != expected {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                expected
            ));
        }

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    async fn chat_with_openai(
        &self,
        preamble: &str,
        context: &str,
        history: &[Turn],
        message: &str,
    ) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();

        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .preamble(preamble)
            .context(context)
            .build();

        let chat_history: Vec<Message> = history
            .iter()
            .map(|turn| match turn.role {
                Role::User => Message::user(turn.content.clone()),
                Role::Assistant => Message::assistant(turn.content.clone()),
            })
            .collect();

        let answer = agent.chat(message.to_string(), chat_history).await?;
        Ok(answer)
    }
}

#[async_trait]
impl LanguageModel for LlmManager {
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(texts).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para embeddings",
                other
            )),
        }
    }

    async fn chat(
        &self,
        preamble: &str,
        context: &str,
        history: &[Turn],
        message: &str,
    ) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => {
                self.chat_with_openai(preamble, context, history, message)
                    .await
            }
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }
}

/// Modelo offline y determinista para los tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::LanguageModel;
    use crate::models::Turn;

    const DIMENSION: usize = 256;

    /// Embeddings por hash de palabras; el chat devuelve un eco del mensaje.
    #[derive(Debug, Default)]
    pub struct HashingModel {
        fail_embeddings: AtomicBool,
        fail_chat: AtomicBool,
        embed_calls: AtomicUsize,
        last_preamble: Mutex<Option<String>>,
        last_context: Mutex<Option<String>>,
        last_history_len: AtomicUsize,
    }

    impl HashingModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_embeddings(&self, fail: bool) {
            self.fail_embeddings.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_chat(&self, fail: bool) {
            self.fail_chat.store(fail, Ordering::SeqCst);
        }

        pub fn embed_calls(&self) -> usize {
            self.embed_calls.load(Ordering::SeqCst)
        }

        pub fn last_preamble(&self) -> Option<String> {
            self.last_preamble.lock().ok().and_then(|p| p.clone())
        }

        pub fn last_context(&self) -> Option<String> {
            self.last_context.lock().ok().and_then(|c| c.clone())
        }

        pub fn last_history_len(&self) -> usize {
            self.last_history_len.load(Ordering::SeqCst)
        }

        fn embed_one(text: &str) -> Vec<f64> {
            let mut embedding = vec![0.0; DIMENSION];
            for word in text.to_lowercase().split_whitespace() {
                let mut hasher = DefaultHasher::new();
                word.hash(&mut hasher);
                embedding[(hasher.finish() % DIMENSION as u64) as usize] += 1.0;
            }
            embedding
        }
    }

    #[async_trait]
    impl LanguageModel for HashingModel {
        async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
            if self.fail_embeddings.load(Ordering::SeqCst) {
                return Err(anyhow!("embeddings desactivados"));
            }
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
        }

        async fn chat(
            &self,
            preamble: &str,
            context: &str,
            history: &[Turn],
            message: &str,
        ) -> Result<String> {
            if self.fail_chat.load(Ordering::SeqCst) {
                return Err(anyhow!("chat desactivado"));
            }
            if let Ok(mut p) = self.last_preamble.lock() {
                *p = Some(preamble.to_string());
            }
            if let Ok(mut c) = self.last_context.lock() {
                *c = Some(context.to_string());
            }
            self.last_history_len.store(history.len(), Ordering::SeqCst);
            Ok(format!("Respuesta a: {message}"))
        }
    }
}
