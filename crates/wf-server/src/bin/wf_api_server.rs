//! Control API binary: tracing init -> DB connect -> router assembly ->
//! CORS/trace layers -> `axum::serve`, matching `everruns-api::main`'s shape.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use wf_adapters::LoggingAdapter;
use wf_api::{app_router, AppState};
use wf_core::adapter::NoopSharedFlowInvoker;
use wf_core::clock::SystemClock;
use wf_core::engine::Orchestrator;
use wf_core::registry::NodeRegistry;
use wf_server::config::{adapter_timeout_from_env, ApiConfig, DatabaseConfig};
use wf_storage::{PostgresQueue, PostgresStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "wf_api=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("wf-api-server starting");

    let db = DatabaseConfig::from_env()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&db.url)
        .await
        .context("failed to connect to database")?;

    let store = Arc::new(PostgresStore::new(pool.clone()));
    store.migrate().await.context("failed to run migrations")?;
    let queue = Arc::new(PostgresQueue::new(pool));

    let adapter: Arc<dyn wf_core::adapter::SideEffectAdapter> = Arc::new(LoggingAdapter::new());
    let registry = Arc::new(NodeRegistry::with_defaults(
        adapter,
        Arc::new(SystemClock),
        Arc::new(NoopSharedFlowInvoker),
        adapter_timeout_from_env(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), registry, Arc::new(SystemClock)));

    let state = AppState::new(store, queue, orchestrator);
    let app = app_router(state);

    let api = ApiConfig::from_env();
    let listener = tokio::net::TcpListener::bind(&api.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", api.bind_addr))?;
    tracing::info!(addr = %api.bind_addr, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
