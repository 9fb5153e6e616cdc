use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use multibot_rag::{
    api,
    app_state::AppState,
    config::AppConfig,
    index::IndexBuilder,
    llm::{LanguageModel, LlmManager},
    registry::BotRegistry,
    session::SessionManager,
    vector_store::VectorClient,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración y registro de bots
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    let registry = Arc::new(BotRegistry::load(cfg.bots_config.as_deref())?);

    // 3. Base de datos vectorial y LLM
    let vector = Arc::new(
        VectorClient::persistent(&cfg.vector_db_dir)
            .context("Error abriendo la base de datos vectorial")?,
    );
    let llm: Arc<dyn LanguageModel> =
        Arc::new(LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?);

    // 4. Sesiones por bot: directorios, memoria e índices iniciales
    let sessions = SessionManager::new(
        registry,
        IndexBuilder::new(vector, llm.clone()),
        llm,
        cfg.memory_token_limit,
        cfg.similarity_top_k,
    );
    sessions.initialize_all().await;

    let app_state = AppState::new(sessions);

    // 5. Router de la API y, si se configura, el frontend estático
    let mut app: Router = api::create_router(app_state);
    if let Some(static_dir) = &cfg.static_dir {
        if static_dir.is_dir() {
            app = app.fallback_service(ServeDir::new(static_dir));
        } else {
            warn!("STATIC_DIR no es un directorio: {}", static_dir.display());
        }
    }
    let app = app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // 6. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
