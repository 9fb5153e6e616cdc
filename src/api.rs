use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::{
    app_state::AppState,
    error::BotError,
    models::BotSummary,
    session::{BotStatus, ChatReply},
};

/// Límite de tamaño de las subidas.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct ChatPayload {
    query: String,
}

#[derive(Serialize)]
pub struct BotsResponse {
    bots: Vec<BotSummary>,
}

#[derive(Serialize)]
pub struct DocumentsResponse {
    documents: Vec<String>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    status: &'static str,
    message: String,
    filename: String,
    documents: usize,
    chunks: usize,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    bots: Vec<BotStatus>,
}

// --- Errores ---

/// Error de la API: estado HTTP, código estable y mensaje para el cliente.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }
}

impl From<BotError> for ApiError {
    fn from(err: BotError) -> Self {
        let code = err.code();
        let (status, message) = match &err {
            BotError::BotNotFound(_) => (StatusCode::NOT_FOUND, "Bot not found".to_string()),
            BotError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "File not found".to_string()),
            BotError::InvalidFilename(_) | BotError::IndexNotReady(_) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            BotError::IndexBuild { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "File saved but indexing failed".to_string(),
            ),
            BotError::Engine(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process the chat message".to_string(),
            ),
            BotError::Io(e) => {
                error!("Error de E/S atendiendo la petición: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        Self {
            status,
            code,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "code": self.code, "error": self.message })),
        )
            .into_response()
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/bots", get(list_bots_handler))
        .route("/bots/:bot_id/status", get(bot_status_handler))
        .route("/documents/:bot_id", get(list_documents_handler))
        .route("/documents/upload/:bot_id", post(upload_handler))
        .route("/upload/:bot_id", post(upload_handler))
        .route("/documents/:bot_id/:filename", delete(delete_document_handler))
        .route("/chat/:bot_id", post(chat_handler))
        .route("/chat/:bot_id/clear", post(clear_chat_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        bots: state.sessions.statuses(),
    })
}

#[axum::debug_handler]
async fn list_bots_handler(State(state): State<AppState>) -> Json<BotsResponse> {
    let bots = state
        .sessions
        .registry()
        .list()
        .iter()
        .map(|bot| BotSummary::from(bot.as_ref()))
        .collect();
    Json(BotsResponse { bots })
}

#[axum::debug_handler]
async fn bot_status_handler(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
) -> Result<Json<BotStatus>, ApiError> {
    Ok(Json(state.sessions.status(&bot_id)?))
}

#[axum::debug_handler]
async fn list_documents_handler(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let documents = state.sessions.list_documents(&bot_id)?;
    Ok(Json(DocumentsResponse { documents }))
}

#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    // El bot se valida antes de leer el cuerpo.
    state.sessions.registry().get(&bot_id)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Multipart inválido: {e}")))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("No se pudo leer el fichero: {e}")))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::bad_request("La petición no contiene ningún fichero"))?;

    let report = state.sessions.upload(&bot_id, &filename, &bytes).await?;
    info!(
        "[{}] Subido {} ({} documentos, {} chunks)",
        bot_id, report.filename, report.documents, report.chunks
    );

    Ok(Json(UploadResponse {
        status: "success",
        message: "File uploaded and indexed successfully".to_string(),
        filename: report.filename,
        documents: report.documents,
        chunks: report.chunks,
    }))
}

#[axum::debug_handler]
async fn delete_document_handler(
    State(state): State<AppState>,
    Path((bot_id, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.delete(&bot_id, &filename).await?;
    Ok(Json(json!({
        "status": format!("Document '{}' deleted successfully", filename)
    })))
}

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatReply>, ApiError> {
    state.sessions.registry().get(&bot_id)?;
    if payload.query.trim().is_empty() {
        return Err(ApiError::bad_request("La consulta está vacía"));
    }
    Ok(Json(state.sessions.chat(&bot_id, &payload.query).await?))
}

#[axum::debug_handler]
async fn clear_chat_handler(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.clear_memory(&bot_id).await?;
    Ok((StatusCode::OK, Json(json!({ "status": "success" }))))
}
