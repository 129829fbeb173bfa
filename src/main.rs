use std::sync::Arc;

use axum::{routing::get, routing::post, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use driftline::agent::AgentService;
use driftline::config::{AppConfig, StoreBackend};
use driftline::routes::api_routes::{
    chat_handler, chat_title_handler, create_chat_handler, list_chats_handler,
    list_messages_handler,
};
use driftline::service::chat_service::ChatService;
use driftline::store::{DynChatStore, FileChatStore, SqliteChatStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driftline=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // ── Store selection (one backend per deployment) ──────────────────────────
    let store: DynChatStore = match config.backend {
        StoreBackend::File => {
            info!("Using file chat store at {}", config.chat_dir);
            Arc::new(FileChatStore::new(&config.chat_dir).await?)
        }
        StoreBackend::Sqlite => {
            info!("Using sqlite chat store at {}", config.database_url);
            Arc::new(SqliteChatStore::connect(&config.database_url).await?)
        }
    };

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let agent = AgentService::new(&config.model_base_url, &config.model_name);
    let chat_service = ChatService::new(store, agent);

    // ── Router ────────────────────────────────────────────────────────────────
    let app = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chats", post(create_chat_handler).get(list_chats_handler))
        .route("/api/chats/{id}/messages", get(list_messages_handler))
        .route("/api/chats/{id}/title", get(chat_title_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(chat_service);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
