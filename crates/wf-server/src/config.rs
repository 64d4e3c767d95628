//! Environment-driven configuration, loaded once at binary start via
//! `from_env()` constructors carrying the hard defaults named in §6,
//! mirroring `RunnerConfig::from_env()` / `durable`'s worker config shape.

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use wf_core::scheduler::SchedulerConfig;
use wf_core::worker::WorkerConfig;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl DatabaseConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let url = std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable required"))?;
        Ok(Self { url })
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env_or("API_PORT", 9000);
        Self {
            bind_addr: format!("{host}:{port}"),
        }
    }
}

/// Builds a `SchedulerConfig` from the environment, falling back to the
/// defaults `SchedulerConfig::default()` already carries per §6.
pub fn scheduler_config_from_env() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    if let Ok(replica_id) = std::env::var("REPLICA_ID") {
        config.replica_id = replica_id;
    }
    config.tick_interval = Duration::from_secs(env_or("SCHEDULER_TICK_INTERVAL_SECS", config.tick_interval.as_secs()));
    config.main_lock_ttl = Duration::from_secs(env_or("SCHEDULER_MAIN_LOCK_TTL_SECS", config.main_lock_ttl.as_secs()));
    config.lock_ttl = Duration::from_secs(env_or("SCHEDULER_LOCK_TTL_SECS", config.lock_ttl.as_secs()));
    config.delay_batch_size = env_or("DELAY_BATCH_SIZE", config.delay_batch_size);
    config.stale_execution_threshold =
        ChronoDuration::hours(env_or("STALE_EXECUTION_HOURS", config.stale_execution_threshold.num_hours()));
    config.terminal_retention = ChronoDuration::days(env_or("RETENTION_DAYS", config.terminal_retention.num_days()));
    config.delay_retention = ChronoDuration::days(env_or("DELAY_RETENTION_DAYS", config.delay_retention.num_days()));
    config
}

pub fn worker_config_from_env() -> WorkerConfig {
    let mut config = WorkerConfig::default();
    if let Ok(worker_id) = std::env::var("WORKER_ID") {
        config.worker_id = worker_id;
    }
    config.poll_interval = Duration::from_secs(env_or("WORKER_POLL_INTERVAL_SECS", config.poll_interval.as_secs()));
    config.jobs_batch_size = env_or("WORKER_JOBS_BATCH_SIZE", config.jobs_batch_size);
    config.delays_batch_size = env_or("WORKER_DELAYS_BATCH_SIZE", config.delays_batch_size);
    config
}

pub fn adapter_timeout_from_env() -> Duration {
    Duration::from_secs(env_or("ADAPTER_TIMEOUT_SECS", 30))
}

pub fn webhook_url_from_env() -> Option<String> {
    std::env::var("WEBHOOK_URL").ok()
}

pub fn webhook_signing_secret_from_env() -> Option<String> {
    std::env::var("WEBHOOK_SIGNING_SECRET").ok()
}
