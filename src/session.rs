//! Gestor de sesiones de bots: mantiene, por bot, el índice y la memoria de
//! conversación coherentes con los documentos en disco.
//!
//! Estados por bot: sin inicializar → `READY(índice)` / `EMPTY(sin índice)`.
//! Las mutaciones del conjunto de documentos (`initialize`, `upload`,
//! `delete`, `clear_memory`) se serializan con un mutex por bot; el chat no
//! lo toma y trabaja sobre una instantánea del índice y del historial.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    documents,
    error::{BotError, BotResult},
    index::{Index, IndexBuilder},
    llm::LanguageModel,
    memory::ChatMemory,
    models::{Bot, Role, Turn},
    rag,
    registry::BotRegistry,
};

/// Turnos de memoria devueltos junto a cada respuesta.
pub const CONTEXT_TURNS: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub context: Vec<Turn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub filename: String,
    pub documents: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub id: String,
    pub ready: bool,
    pub documents: usize,
    pub chunks: usize,
    pub memory_turns: usize,
}

struct SessionState {
    index: Option<Arc<Index>>,
    memory: ChatMemory,
    /// Se incrementa con cada reinicio de memoria, para que un chat en curso
    /// no escriba en una memoria que ya se ha vaciado.
    memory_epoch: u64,
}

struct BotSession {
    bot: Arc<Bot>,
    writer: tokio::sync::Mutex<()>,
    state: Mutex<SessionState>,
}

impl BotSession {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct SessionManager {
    registry: Arc<BotRegistry>,
    builder: IndexBuilder,
    model: Arc<dyn LanguageModel>,
    memory_token_limit: usize,
    top_k: usize,
    sessions: HashMap<String, Arc<BotSession>>,
}

impl SessionManager {
    pub fn new(
        registry: Arc<BotRegistry>,
        builder: IndexBuilder,
        model: Arc<dyn LanguageModel>,
        memory_token_limit: usize,
        top_k: usize,
    ) -> Self {
        let sessions = registry
            .list()
            .iter()
            .map(|bot| {
                let session = BotSession {
                    bot: bot.clone(),
                    writer: tokio::sync::Mutex::new(()),
                    state: Mutex::new(SessionState {
                        index: None,
                        memory: ChatMemory::new(memory_token_limit),
                        memory_epoch: 0,
                    }),
                };
                (bot.id.clone(), Arc::new(session))
            })
            .collect();

        Self {
            registry,
            builder,
            model,
            memory_token_limit,
            top_k,
            sessions,
        }
    }

    pub fn registry(&self) -> &BotRegistry {
        &self.registry
    }

    /// Comprueba el registro antes de tocar disco o la base vectorial.
    fn session(&self, bot_id: &str) -> BotResult<&Arc<BotSession>> {
        let bot = self.registry.get(bot_id)?;
        self.sessions
            .get(&bot.id)
            .ok_or_else(|| BotError::BotNotFound(bot_id.to_string()))
    }

    /// Inicializa todos los bots en paralelo. Un fallo deja el bot sin índice.
    pub async fn initialize_all(&self) {
        let ids: Vec<String> = self.registry.list().iter().map(|b| b.id.clone()).collect();
        let results = join_all(ids.iter().map(|id| self.initialize(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                error!("[{}] Fallo al inicializar el bot: {}", id, e);
            }
        }
    }

    /// Crea el directorio si falta, reinicia la memoria y construye el índice.
    pub async fn initialize(&self, bot_id: &str) -> BotResult<()> {
        let session = self.session(bot_id)?;
        let _writer = session.writer.lock().await;

        let ensured = documents::ensure_dir(&session.bot).await;
        let index = match ensured {
            Ok(()) => self.builder.build(&session.bot).await,
            Err(_) => None,
        };

        {
            let mut state = session.state();
            state.index = index;
            state.memory = ChatMemory::new(self.memory_token_limit);
            state.memory_epoch += 1;
            info!(
                "[{}] Bot inicializado ({}).",
                bot_id,
                if state.index.is_some() { "índice listo" } else { "sin documentos" }
            );
        }
        ensured
    }

    pub fn list_documents(&self, bot_id: &str) -> BotResult<Vec<String>> {
        let session = self.session(bot_id)?;
        Ok(documents::list_documents(&session.bot))
    }

    /// Guarda el fichero y reconstruye el índice. La memoria no se reinicia.
    ///
    /// Si el fichero se escribe pero la reconstrucción falla, el bot queda sin
    /// índice y se devuelve `IndexBuild`.
    pub async fn upload(
        &self,
        bot_id: &str,
        filename: &str,
        content: &[u8],
    ) -> BotResult<UploadReport> {
        let session = self.session(bot_id)?;
        let _writer = session.writer.lock().await;

        let path = documents::save(&session.bot, filename, content).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.to_string());

        let built = match self.builder.try_build(&session.bot).await {
            Ok(index) => index.map(Arc::new),
            Err(e) => {
                error!("[{}] Error construyendo el índice tras subir {}: {:#}", bot_id, filename, e);
                None
            }
        };

        let report = built.as_ref().map(|index| UploadReport {
            filename: filename.clone(),
            documents: index.documents.len(),
            chunks: index.chunk_count(),
        });
        session.state().index = built;

        report.ok_or_else(|| BotError::IndexBuild {
            bot_id: bot_id.to_string(),
        })
    }

    /// Borra el fichero y la colección; reconstruye si quedan documentos.
    /// La memoria se reinicia siempre.
    pub async fn delete(&self, bot_id: &str, filename: &str) -> BotResult<()> {
        let session = self.session(bot_id)?;
        let _writer = session.writer.lock().await;

        documents::remove(&session.bot, filename).await?;
        self.builder
            .vector_client()
            .delete(&session.bot.collection_name);

        let index = if documents::has_documents(&session.bot) {
            let rebuilt = self.builder.build(&session.bot).await;
            if rebuilt.is_none() {
                warn!("[{}] Quedan documentos pero el índice no se pudo reconstruir.", bot_id);
            }
            rebuilt
        } else {
            info!("[{}] Sin documentos: índice eliminado.", bot_id);
            None
        };

        let mut state = session.state();
        state.index = index;
        state.memory.clear();
        state.memory_epoch += 1;
        Ok(())
    }

    /// Pregunta al motor RAG del bot. Falla con `IndexNotReady` si no hay índice.
    pub async fn chat(&self, bot_id: &str, query: &str) -> BotResult<ChatReply> {
        let session = self.session(bot_id)?;

        let (index, history, epoch) = {
            let state = session.state();
            let index = state
                .index
                .clone()
                .ok_or_else(|| BotError::IndexNotReady(bot_id.to_string()))?;
            (index, state.memory.all(), state.memory_epoch)
        };

        let response = rag::answer(
            &index,
            self.model.as_ref(),
            &session.bot.system_prompt,
            &history,
            query,
            self.top_k,
        )
        .await
        .map_err(|e| {
            error!("[{}] Error durante el chat: {:#}", bot_id, e);
            BotError::Engine(e)
        })?;

        let mut state = session.state();
        if state.memory_epoch == epoch {
            state.memory.append(Role::User, query);
            state.memory.append(Role::Assistant, response.clone());
        }
        Ok(ChatReply {
            response,
            context: state.memory.recent(CONTEXT_TURNS),
        })
    }

    pub async fn clear_memory(&self, bot_id: &str) -> BotResult<()> {
        let session = self.session(bot_id)?;
        let _writer = session.writer.lock().await;
        let mut state = session.state();
        state.memory.clear();
        state.memory_epoch += 1;
        info!("[{}] Memoria de conversación reiniciada.", bot_id);
        Ok(())
    }

    pub fn status(&self, bot_id: &str) -> BotResult<BotStatus> {
        let session = self.session(bot_id)?;
        let documents = documents::list_documents(&session.bot).len();
        let state = session.state();
        Ok(BotStatus {
            id: session.bot.id.clone(),
            ready: state.index.is_some(),
            documents,
            chunks: state.index.as_ref().map(|i| i.chunk_count()).unwrap_or(0),
            memory_turns: state.memory.len(),
        })
    }

    /// Estado de todos los bots, en orden de configuración.
    pub fn statuses(&self) -> Vec<BotStatus> {
        self.registry
            .list()
            .iter()
            .filter_map(|bot| self.status(&bot.id).ok())
            .collect()
    }
}
