//! Construcción del índice vectorial de un bot a partir de su directorio.
//!
//! Siempre es una reconstrucción completa: la colección se vacía y se vuelven
//! a embeber todos los ficheros presentes en disco.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info};

use crate::{
    documents, ingest,
    llm::LanguageModel,
    models::Bot,
    vector_store::{Collection, ScoredRecord, VectorClient, VectorRecord},
};

/// Textos por llamada de embeddings.
const EMBED_BATCH_SIZE: usize = 64;

/// Representación consultable de los documentos actuales de un bot.
/// Se reemplaza en cada reconstrucción, nunca se modifica.
pub struct Index {
    pub bot_id: String,
    pub documents: Vec<String>,
    collection: Arc<Collection>,
    model: Arc<dyn LanguageModel>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("bot_id", &self.bot_id)
            .field("collection", &self.collection.name())
            .field("documents", &self.documents)
            .field("chunks", &self.chunk_count())
            .finish()
    }
}

impl Index {
    pub fn chunk_count(&self) -> usize {
        self.collection.count()
    }

    /// Los `top_k` chunks más parecidos a `query`.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredRecord>> {
        let embeddings = self.model.embed_texts(vec![query.to_string()]).await?;
        let query_vec = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No se pudo generar embedding de la consulta"))?;
        Ok(self.collection.query(&query_vec, top_k))
    }
}

#[derive(Clone)]
pub struct IndexBuilder {
    vector: Arc<VectorClient>,
    model: Arc<dyn LanguageModel>,
}

impl IndexBuilder {
    pub fn new(vector: Arc<VectorClient>, model: Arc<dyn LanguageModel>) -> Self {
        Self { vector, model }
    }

    pub fn vector_client(&self) -> &Arc<VectorClient> {
        &self.vector
    }

    /// `None` si no hay documentos o si la construcción falla (se registra el error).
    pub async fn build(&self, bot: &Bot) -> Option<Arc<Index>> {
        match self.try_build(bot).await {
            Ok(index) => index.map(Arc::new),
            Err(e) => {
                error!("[{}] Error construyendo el índice: {:#}", bot.id, e);
                None
            }
        }
    }

    /// `Ok(None)` cuando el directorio no existe o está vacío. La colección
    /// anterior se borra antes de cargar nada, así que ningún camino de error
    /// deja vectores huérfanos.
    pub async fn try_build(&self, bot: &Bot) -> Result<Option<Index>> {
        // Reconstrucción completa: nada de la colección anterior sobrevive.
        if self.vector.exists(&bot.collection_name) {
            self.vector.delete(&bot.collection_name);
        }

        if !documents::has_documents(bot) {
            return Ok(None);
        }

        let data_dir = bot.data_dir.clone();
        let loaded = tokio::task::spawn_blocking(move || ingest::load_documents(&data_dir))
            .await
            .context("La tarea de carga de documentos terminó de forma anómala")??;

        let chunks = ingest::chunk_documents(&loaded);
        if chunks.is_empty() {
            return Err(anyhow!(
                "Ningún documento de {} contiene texto indexable",
                bot.data_dir.display()
            ));
        }

        let collection = self.vector.get_or_create(&bot.collection_name)?;

        if let Err(e) = self.fill_collection(&collection, &chunks).await {
            self.vector.delete(&bot.collection_name);
            return Err(e);
        }

        let document_names: Vec<String> = loaded.into_iter().map(|d| d.filename).collect();

        info!(
            "[{}] Índice reconstruido: {} documentos, {} chunks en '{}'.",
            bot.id,
            document_names.len(),
            collection.count(),
            bot.collection_name
        );

        Ok(Some(Index {
            bot_id: bot.id.clone(),
            documents: document_names,
            collection,
            model: self.model.clone(),
        }))
    }

    async fn fill_collection(
        &self,
        collection: &Collection,
        chunks: &[crate::models::DocumentChunk],
    ) -> Result<()> {
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.model.embed_texts(texts).await?;
            if embeddings.len() != batch.len() {
                return Err(anyhow!(
                    "Número de embeddings ({}) distinto al número de chunks ({})",
                    embeddings.len(),
                    batch.len()
                ));
            }

            let records = batch
                .iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| VectorRecord {
                    id: chunk.id.clone(),
                    source: chunk.source.clone(),
                    text: chunk.text.clone(),
                    embedding,
                })
                .collect();
            collection.add(records)?;
        }
        Ok(())
    }
}
