//! Motor de chat RAG sobre el índice de un bot.
//!
//! Flujo:
//!   1. Búsqueda vectorial de los `top_k` chunks más parecidos a la pregunta.
//!   2. Construcción del contexto con el texto de esos chunks y su fichero de origen.
//!   3. El LLM responde con el prompt de sistema del bot y el historial previo.

use anyhow::Result;
use tracing::debug;

use crate::{index::Index, llm::LanguageModel, models::Turn, vector_store::ScoredRecord};

pub const NO_CONTEXT_ANSWER: &str =
    "No se encontró información relevante en los documentos para responder a esta pregunta.";

const RAG_INSTRUCTIONS: &str = r#"
Eres un asistente que responde preguntas sobre los documentos de este bot.
Sólo puedes usar la información suministrada en el contexto y la conversación previa.
Si el contexto no contiene la respuesta, di explícitamente que no la sabes.
"#;

/// Prompt de sistema del bot seguido de las instrucciones RAG comunes.
pub fn build_preamble(system_prompt: &str) -> String {
    let system_prompt = system_prompt.trim();
    if system_prompt.is_empty() {
        RAG_INSTRUCTIONS.trim().to_string()
    } else {
        format!("{}\n\n{}", system_prompt, RAG_INSTRUCTIONS.trim())
    }
}

pub fn format_context(hits: &[ScoredRecord]) -> String {
    hits.iter()
        .map(|hit| format!("[{}]\n{}", hit.record.source, hit.record.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Responde a `query` usando los chunks recuperados de `index`.
pub async fn answer(
    index: &Index,
    model: &dyn LanguageModel,
    system_prompt: &str,
    history: &[Turn],
    query: &str,
    top_k: usize,
) -> Result<String> {
    let hits = index.retrieve(query, top_k).await?;
    if hits.is_empty() {
        return Ok(NO_CONTEXT_ANSWER.to_string());
    }

    debug!(
        "[{}] {} chunks recuperados (mejor puntuación {:.3})",
        index.bot_id,
        hits.len(),
        hits[0].score
    );

    let context = format_context(&hits);
    let preamble = build_preamble(system_prompt);
    model.chat(&preamble, &context, history, query).await
}
