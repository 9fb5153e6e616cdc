//! Tests de integración de la API HTTP con un modelo offline.

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use multibot_rag::{
    api::create_router,
    app_state::AppState,
    index::IndexBuilder,
    llm::testing::HashingModel,
    models::Bot,
    registry::BotRegistry,
    session::SessionManager,
    vector_store::VectorClient,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "----multibot-test-boundary";

struct TestApp {
    router: Router,
    model: Arc<HashingModel>,
    tmp: tempfile::TempDir,
}

fn bot(root: &Path, id: &str) -> Bot {
    Bot {
        id: id.to_string(),
        name: format!("Bot {id}"),
        description: format!("Descripción de {id}"),
        system_prompt: "Responde siempre en español.".to_string(),
        collection_name: format!("documents_collection_{id}"),
        data_dir: root.join(format!("data_{id}")),
    }
}

async fn test_app() -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let model = Arc::new(HashingModel::new());

    let registry = Arc::new(BotRegistry::new(vec![bot(root, "bot1"), bot(root, "bot2")]).unwrap());
    let vector = Arc::new(VectorClient::persistent(root.join("chroma-data")).unwrap());
    let sessions = SessionManager::new(
        registry,
        IndexBuilder::new(vector, model.clone()),
        model.clone(),
        2000,
        3,
    );
    sessions.initialize_all().await;

    TestApp {
        router: create_router(AppState::new(sessions)),
        model,
        tmp,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn chat(bot_id: &str, query: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/chat/{bot_id}"))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({ "query": query }).to_string()))
        .unwrap()
}

fn upload(uri: &str, filename: &str, content: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         {content}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

// =============================================================================
// Bots
// =============================================================================

#[tokio::test]
async fn test_list_bots_in_configuration_order() {
    let app = test_app().await;

    let (status, json) = send(&app, get("/bots")).await;

    assert_eq!(status, StatusCode::OK);
    let bots = json["bots"].as_array().unwrap();
    assert_eq!(bots.len(), 2);
    assert_eq!(bots[0]["id"], "bot1");
    assert_eq!(bots[1]["id"], "bot2");
    assert_eq!(bots[0]["name"], "Bot bot1");
    assert!(bots[0].get("system_prompt").is_none());
}

#[tokio::test]
async fn test_health_reports_each_bot() {
    let app = test_app().await;

    let (status, json) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["bots"][0]["ready"], false);
}

#[tokio::test]
async fn test_unknown_bot_is_404_everywhere() {
    let app = test_app().await;

    let requests = vec![
        get("/documents/ghost"),
        get("/bots/ghost/status"),
        upload("/documents/upload/ghost", "a.txt", "hola"),
        delete("/documents/ghost/a.txt"),
        chat("ghost", "hola"),
    ];
    for request in requests {
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "BOT_NOT_FOUND");
    }
    assert_eq!(app.model.embed_calls(), 0);
}

// =============================================================================
// Documentos
// =============================================================================

#[tokio::test]
async fn test_upload_then_list() {
    let app = test_app().await;

    let (status, json) = send(&app, upload("/documents/upload/bot1", "a.txt", "hola")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(json["filename"], "a.txt");

    let (status, json) = send(&app, get("/documents/bot1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["documents"], json!(["a.txt"]));
}

#[tokio::test]
async fn test_reupload_overwrites_single_entry() {
    let app = test_app().await;

    send(&app, upload("/upload/bot1", "a.txt", "versión uno")).await;
    let (status, _) = send(&app, upload("/upload/bot1", "a.txt", "versión dos")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(&app, get("/documents/bot1")).await;
    assert_eq!(json["documents"], json!(["a.txt"]));
}

#[tokio::test]
async fn test_upload_to_one_bot_is_invisible_to_the_other() {
    let app = test_app().await;

    send(&app, upload("/documents/upload/bot1", "a.txt", "hola")).await;

    let (_, json) = send(&app, get("/documents/bot2")).await;
    assert_eq!(json["documents"], json!([]));
}

#[tokio::test]
async fn test_upload_without_file_is_bad_request() {
    let app = test_app().await;
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nnada\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/documents/upload/bot1")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_with_failed_indexing_is_500_but_file_is_kept() {
    let app = test_app().await;
    app.model.set_fail_embeddings(true);

    let (status, json) = send(&app, upload("/documents/upload/bot1", "a.txt", "hola")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INDEX_BUILD_FAILED");

    let (_, json) = send(&app, get("/documents/bot1")).await;
    assert_eq!(json["documents"], json!(["a.txt"]));
    let (_, json) = send(&app, get("/bots/bot1/status")).await;
    assert_eq!(json["ready"], false);
}

#[tokio::test]
async fn test_delete_missing_document_is_404() {
    let app = test_app().await;

    let (status, json) = send(&app, delete("/documents/bot1/nada.txt")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "DOCUMENT_NOT_FOUND");
}

#[tokio::test]
async fn test_delete_hidden_name_is_404() {
    let app = test_app().await;

    let (status, json) = send(&app, delete("/documents/bot1/.hidden")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "DOCUMENT_NOT_FOUND");
}

#[tokio::test]
async fn test_reupload_without_text_removes_old_vectors() {
    let app = test_app().await;
    let collection_dir = app.tmp.path().join("chroma-data/documents_collection_bot1");
    send(&app, upload("/documents/upload/bot1", "a.txt", "secreto antiguo")).await;
    assert!(collection_dir.exists());

    let (status, json) = send(&app, upload("/documents/upload/bot1", "a.txt", "   ")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INDEX_BUILD_FAILED");

    let (_, json) = send(&app, get("/bots/bot1/status")).await;
    assert_eq!(json["ready"], false);
    assert!(!collection_dir.exists());
}

#[tokio::test]
async fn test_deleted_document_is_no_longer_retrieved() {
    let app = test_app().await;
    send(&app, upload("/documents/upload/bot1", "a.txt", "hola mundo")).await;
    let (_, json) = send(&app, get("/bots/bot1/status")).await;
    let chunks_of_a = json["chunks"].as_u64().unwrap();
    send(&app, upload("/documents/upload/bot1", "b.txt", "hola desde b")).await;

    let (status, _) = send(&app, delete("/documents/bot1/b.txt")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(&app, get("/bots/bot1/status")).await;
    assert_eq!(json["ready"], true);
    assert_eq!(json["documents"], 1);
    assert_eq!(json["chunks"].as_u64().unwrap(), chunks_of_a);

    let (status, _) = send(&app, chat("bot1", "hola")).await;
    assert_eq!(status, StatusCode::OK);
    let context = app.model.last_context().unwrap();
    assert!(context.contains("[a.txt]"));
    assert!(!context.contains("[b.txt]"));
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_lifecycle() {
    let app = test_app().await;

    let (status, json) = send(&app, chat("bot1", "hola")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INDEX_NOT_READY");

    let (status, _) = send(&app, upload("/documents/upload/bot1", "a.txt", "hola mundo")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, chat("bot1", "hola")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!json["response"].as_str().unwrap().is_empty());
    let context = json["context"].as_array().unwrap();
    assert!(context.len() <= 2);
    assert_eq!(context[0]["role"], "user");
    assert_eq!(context[0]["content"], "hola");
    assert_eq!(context[1]["role"], "assistant");
}

#[tokio::test]
async fn test_delete_last_document_disables_chat_and_clears_memory() {
    let app = test_app().await;
    send(&app, upload("/documents/upload/bot1", "a.txt", "hola mundo")).await;
    send(&app, chat("bot1", "hola")).await;

    let (status, json) = send(&app, delete("/documents/bot1/a.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "Document 'a.txt' deleted successfully");

    let (_, json) = send(&app, get("/bots/bot1/status")).await;
    assert_eq!(json["memory_turns"], 0);
    assert_eq!(json["ready"], false);

    let (status, json) = send(&app, chat("bot1", "¿sigues ahí?")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INDEX_NOT_READY");
}

#[tokio::test]
async fn test_engine_failure_is_generic_500() {
    let app = test_app().await;
    send(&app, upload("/documents/upload/bot1", "a.txt", "hola mundo")).await;
    app.model.set_fail_chat(true);

    let (status, json) = send(&app, chat("bot1", "hola")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "ENGINE_ERROR");
    assert_eq!(json["error"], "Failed to process the chat message");
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let app = test_app().await;

    let (status, _) = send(&app, chat("bot1", "   ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clear_chat_memory() {
    let app = test_app().await;
    send(&app, upload("/documents/upload/bot1", "a.txt", "hola mundo")).await;
    send(&app, chat("bot1", "hola")).await;

    let request = Request::builder()
        .method("POST")
        .uri("/chat/bot1/clear")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(&app, get("/bots/bot1/status")).await;
    assert_eq!(json["memory_turns"], 0);
    assert_eq!(json["ready"], true);
}
