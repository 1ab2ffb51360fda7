//! Retail Insights HTTP Server
//!
//! Axum server exposing the retail insights chatbot:
//!
//! - `GET  /`       welcome message
//! - `GET  /health` liveness and default models
//! - `POST /query`  answer a question, with token and cost accounting

mod config;
mod handlers;
mod routes;
mod state;
mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;

use agent_runtime::{ModelRegistry, ModelRole, OpenAiEmbedder, RemoteProviderFactory};
use retail_insights::{InsightsService, SqliteStore, load_csv};

use crate::config::Settings;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();
    let settings = Settings::from_env().context("loading configuration")?;

    telemetry::init(&settings.log_dir)?;
    tracing::info!("Application is starting up...");

    // Optional database bootstrap from CSV
    if let Some(csv_path) = settings.csv_path.clone() {
        let db_path = settings.db_path.clone();
        let rows = tokio::task::spawn_blocking(move || load_csv(&csv_path, &db_path))
            .await?
            .context("loading retail CSV")?;
        tracing::info!(rows, db = %settings.db_path.display(), "retail data loaded");
    }
    let store = Arc::new(SqliteStore::open(&settings.db_path)?);

    // Model clients; the defaults are built now so bad credentials fail at startup
    let factory = RemoteProviderFactory::new(settings.credentials.clone(), settings.runtime.clone());
    let registry = Arc::new(ModelRegistry::new(Arc::new(factory)));
    registry.resolve(settings.tool_model.as_str(), ModelRole::Tool)?;
    registry.resolve(settings.agent_model.as_str(), ModelRole::Agent)?;

    let mut service = InsightsService::new(registry, store, settings.service_config())?;
    if settings.few_shot_enabled {
        let key = settings
            .credentials
            .openai_api_key
            .clone()
            .context("OPENAI_API_KEY is required for few-shot retrieval")?;
        service = service.with_embedder(Arc::new(OpenAiEmbedder::new(key, &settings.runtime)?));
        tracing::info!("✓ Few-shot retrieval enabled");
    }

    let state = AppState::new(service, settings.tool_model, settings.agent_model);
    let app = routes::router(state)
        .layer(routes::cors_layer(&settings.cors_origins)?)
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 retail insights server running on http://{}", settings.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!(tool_model = %settings.tool_model, agent_model = %settings.agent_model, "default models");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /        - Welcome");
    tracing::info!("  GET  /health  - Health check");
    tracing::info!("  POST /query   - Ask a retail insights question");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Application is shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
