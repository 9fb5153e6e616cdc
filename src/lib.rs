//! Servicio multi-bot de preguntas y respuestas sobre documentos.
//!
//! Cada bot tiene su directorio de documentos, su colección vectorial y su
//! memoria de conversación; `session::SessionManager` los mantiene coherentes.

pub mod api;
pub mod app_state;
pub mod config;
pub mod documents;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod models;
pub mod rag;
pub mod registry;
pub mod session;
pub mod vector_store;
