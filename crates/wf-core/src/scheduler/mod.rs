//! Distributed scheduler: a background loop, safe to run on every replica,
//! that polls triggers, promotes due delays, and sweeps for recovery under
//! cluster-wide locks (§4.4, §4.5, §4.7). Lifecycle grounded on `durable`'s
//! `WorkerPool` (named background loops driven by `tokio::select!` against
//! a `watch` shutdown channel).

pub mod recovery;
pub mod tick;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::engine::store::{Store, StoreError};
use crate::lock::Lock;
use crate::queue::Queue;
use crate::registry::TriggerRegistry;

pub use recovery::RecoveryReport;
pub use tick::{DELAY_LOCK_KEY, DELAY_PROMOTION_TOPIC, TRIGGER_LOCK_KEY, WORKFLOW_JOB_TOPIC};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub replica_id: String,
    /// Cron cadence: once per minute (`* * * * *`, §4.4, §6).
    #[serde(with = "duration_millis")]
    pub tick_interval: Duration,
    /// TTL of `lock("workflow_scheduler_main")`, held for the whole trigger
    /// tick (§4.4 step 1, §6).
    #[serde(with = "duration_millis")]
    pub main_lock_ttl: Duration,
    /// Default TTL for every other named lock, e.g. `delayed_executions_processing`
    /// (§6).
    #[serde(with = "duration_millis")]
    pub lock_ttl: Duration,
    /// Batch size for delay promotion (§6); per-trigger-type poll batch sizes
    /// come from each `TriggerPoller::default_batch_size()` instead.
    pub delay_batch_size: i64,
    #[serde(with = "chrono_duration_secs")]
    pub stale_execution_threshold: ChronoDuration,
    #[serde(with = "chrono_duration_secs")]
    pub terminal_retention: ChronoDuration,
    #[serde(with = "chrono_duration_secs")]
    pub delay_retention: ChronoDuration,
    #[serde(with = "duration_millis")]
    pub recovery_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            replica_id: format!("scheduler-{}", Uuid::now_v7()),
            tick_interval: Duration::from_secs(60),
            main_lock_ttl: Duration::from_secs(60),
            lock_ttl: Duration::from_secs(30),
            delay_batch_size: 50,
            stale_execution_threshold: ChronoDuration::hours(24),
            terminal_retention: ChronoDuration::days(30),
            delay_retention: ChronoDuration::days(30),
            recovery_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("scheduler is already running")]
    AlreadyRunning,
}

/// Ticks the trigger-poll/delay-promotion/recovery loops for as long as it's
/// running. Safe to instantiate identically on every replica: the named
/// locks in `tick` ensure only one replica's tick does real work per period.
pub struct Scheduler<S, L, Q>
where
    S: Store,
    L: Lock + 'static,
    Q: Queue + 'static,
{
    store: Arc<S>,
    lock: Arc<L>,
    queue: Arc<Q>,
    triggers: Arc<TriggerRegistry>,
    config: SchedulerConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tick_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    recovery_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<S, L, Q> Scheduler<S, L, Q>
where
    S: Store,
    L: Lock + 'static,
    Q: Queue + 'static,
{
    pub fn new(store: Arc<S>, lock: Arc<L>, queue: Arc<Q>, triggers: Arc<TriggerRegistry>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            store,
            lock,
            queue,
            triggers,
            config,
            shutdown_tx,
            shutdown_rx,
            tick_handle: std::sync::Mutex::new(None),
            recovery_handle: std::sync::Mutex::new(None),
        }
    }

    #[instrument(skip(self), fields(replica_id = %self.config.replica_id))]
    pub fn start(&self) {
        info!(replica_id = %self.config.replica_id, "starting scheduler loops");
        self.start_tick_loop();
        self.start_recovery_loop();
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let tick = self.tick_handle.lock().unwrap().take();
        let recovery = self.recovery_handle.lock().unwrap().take();
        if let Some(h) = tick {
            let _ = h.await;
        }
        if let Some(h) = recovery {
            let _ = h.await;
        }
    }

    /// Run the trigger-poll and delay-promotion ticks once, outside the
    /// background loop. Used by `wf-server`'s one-shot CLI mode and by tests.
    pub async fn tick_once(&self) -> Result<tick::TickOutcome, SchedulerError> {
        let fired = tick::run_trigger_tick(
            self.store.as_ref(),
            self.lock.as_ref(),
            self.queue.as_ref(),
            self.triggers.as_ref(),
            self.config.main_lock_ttl,
        )
        .await?;
        let promoted = tick::run_delay_promotion_tick(
            self.store.as_ref(),
            self.lock.as_ref(),
            self.queue.as_ref(),
            self.config.lock_ttl,
            self.config.delay_batch_size,
        )
        .await?;
        Ok(tick::TickOutcome {
            triggers_fired: fired,
            delays_promoted: promoted,
        })
    }

    pub async fn recover_once(&self) -> Result<RecoveryReport, SchedulerError> {
        Ok(recovery::run_recovery(
            self.store.as_ref(),
            self.config.stale_execution_threshold,
            self.config.terminal_retention,
            self.config.delay_retention,
        )
        .await?)
    }

    fn start_tick_loop(&self) {
        let store = self.store.clone();
        let lock = self.lock.clone();
        let queue = self.queue.clone();
        let triggers = self.triggers.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match tick::run_trigger_tick(store.as_ref(), lock.as_ref(), queue.as_ref(), triggers.as_ref(), config.main_lock_ttl).await {
                            Ok(fired) if fired > 0 => debug!(fired, "trigger tick fired executions"),
                            Ok(_) => {}
                            Err(err) => error!(%err, "trigger tick failed"),
                        }
                        match tick::run_delay_promotion_tick(store.as_ref(), lock.as_ref(), queue.as_ref(), config.lock_ttl, config.delay_batch_size).await {
                            Ok(promoted) if promoted > 0 => debug!(promoted, "delay promotion tick claimed delays"),
                            Ok(_) => {}
                            Err(err) => error!(%err, "delay promotion tick failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("tick loop: shutdown requested");
                        break;
                    }
                }
            }
        });
        *self.tick_handle.lock().unwrap() = Some(handle);
    }

    fn start_recovery_loop(&self) {
        let store = self.store.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.recovery_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match recovery::run_recovery(store.as_ref(), config.stale_execution_threshold, config.terminal_retention, config.delay_retention).await {
                            Ok(report) if report.stale_reset > 0 || report.executions_pruned > 0 || report.delays_pruned > 0 => {
                                info!(?report, "recovery sweep made changes");
                            }
                            Ok(_) => {}
                            Err(err) => error!(%err, "recovery sweep failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("recovery loop: shutdown requested");
                        break;
                    }
                }
            }
        });
        *self.recovery_handle.lock().unwrap() = Some(handle);
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod chrono_duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.num_seconds().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::{InMemoryLock, InMemoryQueue, InMemoryStore};

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(60));
        assert_eq!(config.main_lock_ttl, Duration::from_secs(60));
        assert_eq!(config.lock_ttl, Duration::from_secs(30));
        assert_eq!(config.delay_batch_size, 50);
        assert_eq!(config.stale_execution_threshold, ChronoDuration::hours(24));
    }

    #[tokio::test]
    async fn tick_once_runs_without_registered_triggers() {
        let store = Arc::new(InMemoryStore::new());
        let lock = Arc::new(InMemoryLock::new());
        let queue = Arc::new(InMemoryQueue::new());
        let triggers = Arc::new(TriggerRegistry::new());
        let scheduler = Scheduler::new(store, lock, queue, triggers, SchedulerConfig::default());
        let outcome = scheduler.tick_once().await.unwrap();
        assert_eq!(outcome.triggers_fired, 0);
        assert_eq!(outcome.delays_promoted, 0);
    }

    #[tokio::test]
    async fn recover_once_is_a_noop_on_an_empty_store() {
        let store = Arc::new(InMemoryStore::new());
        let lock = Arc::new(InMemoryLock::new());
        let queue = Arc::new(InMemoryQueue::new());
        let triggers = Arc::new(TriggerRegistry::new());
        let scheduler = Scheduler::new(store, lock, queue, triggers, SchedulerConfig::default());
        let report = scheduler.recover_once().await.unwrap();
        assert_eq!(report.stale_reset, 0);
    }
}
