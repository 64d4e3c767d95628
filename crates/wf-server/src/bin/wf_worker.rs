//! Worker binary: runs the Scheduler's tick/recovery loops and the Queue's
//! worker pool side by side in one process (§4.9). Replicable — start as
//! many `wf-worker` processes as needed; the named locks and atomic claims
//! keep them from stepping on each other (§5).

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use wf_adapters::{HttpWebhookAdapter, LoggingAdapter, WebhookConfig};
use wf_core::adapter::{NoopSharedFlowInvoker, SideEffectAdapter};
use wf_core::clock::SystemClock;
use wf_core::engine::Orchestrator;
use wf_core::registry::NodeRegistry;
use wf_core::scheduler::Scheduler;
use wf_core::worker::QueueWorker;
use wf_server::config::{
    adapter_timeout_from_env, scheduler_config_from_env, webhook_signing_secret_from_env, webhook_url_from_env,
    worker_config_from_env, DatabaseConfig,
};
use wf_storage::{PostgresLock, PostgresQueue, PostgresStore};

fn build_adapter() -> anyhow::Result<Arc<dyn SideEffectAdapter>> {
    match webhook_url_from_env() {
        Some(url) => {
            let mut config = WebhookConfig::new(url);
            if let Some(secret) = webhook_signing_secret_from_env() {
                config = config.with_signing_secret(secret);
            }
            Ok(Arc::new(HttpWebhookAdapter::new(config)?))
        }
        None => Ok(Arc::new(LoggingAdapter::new())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "wf_worker=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("wf-worker starting");

    let db = DatabaseConfig::from_env()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&db.url)
        .await
        .context("failed to connect to database")?;

    let store = Arc::new(PostgresStore::new(pool.clone()));
    store.migrate().await.context("failed to run migrations")?;
    let lock = Arc::new(PostgresLock::new(pool.clone()));
    let queue = Arc::new(PostgresQueue::new(pool));

    let adapter = build_adapter()?;
    let registry = Arc::new(NodeRegistry::with_defaults(
        adapter,
        Arc::new(SystemClock),
        Arc::new(NoopSharedFlowInvoker),
        adapter_timeout_from_env(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), registry, Arc::new(SystemClock)));

    let triggers = Arc::new(wf_server::triggers::build_registry(store.pool().clone()));
    let scheduler = Scheduler::new(store.clone(), lock, queue.clone(), triggers, scheduler_config_from_env());
    let worker = QueueWorker::new(store, queue, orchestrator, worker_config_from_env());

    scheduler.start();
    worker.start();
    tracing::info!("scheduler and queue worker running");

    signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");

    scheduler.shutdown().await;
    worker.shutdown().await;
    Ok(())
}
