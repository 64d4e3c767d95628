//! Queue consumer for the two job topics the scheduler produces
//! (`workflow-jobs`, `delay-promotions`), invoking the orchestrator for each
//! claimed job. Lifecycle grounded on `durable::worker::pool::WorkerPool`: a
//! named background loop per topic, driven by `tokio::select!` against a
//! `watch` shutdown channel and a polling interval, claimed jobs never shared
//! across two workers thanks to the `Queue::claim` contract (§4.4, §5).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;
use wf_schemas::delay::Delay;
use wf_schemas::trigger::WorkflowJob;

use crate::engine::orchestrator::Orchestrator;
use crate::engine::store::Store;
use crate::queue::{JobFailureOutcome, Queue};
use crate::scheduler::{DELAY_PROMOTION_TOPIC, WORKFLOW_JOB_TOPIC};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    pub jobs_batch_size: i64,
    pub delays_batch_size: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            poll_interval: Duration::from_secs(1),
            jobs_batch_size: 10,
            delays_batch_size: 20,
        }
    }
}

/// Drains `workflow-jobs` and `delay-promotions` against one `Orchestrator`.
/// Safe to run identically on every replica: `Queue::claim`'s atomic claim
/// guarantees each job reaches exactly one worker.
pub struct QueueWorker<S, Q>
where
    S: Store,
    Q: Queue + 'static,
{
    store: Arc<S>,
    queue: Arc<Q>,
    orchestrator: Arc<Orchestrator<S>>,
    config: WorkerConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    jobs_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    delays_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<S, Q> QueueWorker<S, Q>
where
    S: Store,
    Q: Queue + 'static,
{
    pub fn new(store: Arc<S>, queue: Arc<Q>, orchestrator: Arc<Orchestrator<S>>, config: WorkerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            store,
            queue,
            orchestrator,
            config,
            shutdown_tx,
            shutdown_rx,
            jobs_handle: std::sync::Mutex::new(None),
            delays_handle: std::sync::Mutex::new(None),
        }
    }

    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub fn start(&self) {
        self.start_jobs_loop();
        self.start_delays_loop();
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let jobs = self.jobs_handle.lock().unwrap().take();
        let delays = self.delays_handle.lock().unwrap().take();
        if let Some(h) = jobs {
            let _ = h.await;
        }
        if let Some(h) = delays {
            let _ = h.await;
        }
    }

    fn start_jobs_loop(&self) {
        let store = self.store.clone();
        let queue = self.queue.clone();
        let orchestrator = self.orchestrator.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = drain_workflow_jobs(&store, &queue, &orchestrator, &config).await {
                            error!(%err, "workflow job drain failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("jobs loop: shutdown requested");
                        break;
                    }
                }
            }
        });
        *self.jobs_handle.lock().unwrap() = Some(handle);
    }

    fn start_delays_loop(&self) {
        let store = self.store.clone();
        let queue = self.queue.clone();
        let orchestrator = self.orchestrator.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = drain_delay_promotions(&store, &queue, &orchestrator, &config).await {
                            error!(%err, "delay promotion drain failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("delays loop: shutdown requested");
                        break;
                    }
                }
            }
        });
        *self.delays_handle.lock().unwrap() = Some(handle);
    }
}

async fn drain_workflow_jobs<S: Store, Q: Queue>(
    store: &S,
    queue: &Q,
    orchestrator: &Orchestrator<S>,
    config: &WorkerConfig,
) -> Result<(), crate::queue::QueueError> {
    let claimed = queue.claim(WORKFLOW_JOB_TOPIC, &config.worker_id, config.jobs_batch_size).await?;
    for job in claimed {
        let outcome = process_workflow_job(store, orchestrator, &job.payload).await;
        match outcome {
            Ok(()) => queue.complete(job.id).await?,
            Err(err) => {
                warn!(job_id = %job.id, %err, "workflow job failed");
                queue.fail(job.id, &err).await?;
            }
        }
    }
    Ok(())
}

async fn process_workflow_job<S: Store>(
    store: &S,
    orchestrator: &Orchestrator<S>,
    payload: &serde_json::Value,
) -> Result<(), String> {
    let job: WorkflowJob = serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;
    let workflow = store.get_workflow(job.workflow_id).await.map_err(|e| e.to_string())?;
    let trigger = wf_schemas::trigger::TriggerContext {
        workflow_id: job.workflow_id,
        user_id: job.user_id,
        trigger_type: job.trigger_type,
        trigger_id: job.trigger_id,
        entity_data: job.trigger_data,
        metadata: job.metadata,
    };
    orchestrator.start_execution(&workflow, &trigger).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn drain_delay_promotions<S: Store, Q: Queue>(
    store: &S,
    queue: &Q,
    orchestrator: &Orchestrator<S>,
    config: &WorkerConfig,
) -> Result<(), crate::queue::QueueError> {
    let claimed = queue.claim(DELAY_PROMOTION_TOPIC, &config.worker_id, config.delays_batch_size).await?;
    for job in claimed {
        let outcome = process_delay_promotion(store, orchestrator, &job.payload).await;
        match outcome {
            Ok(()) => queue.complete(job.id).await?,
            Err(err) => {
                warn!(job_id = %job.id, %err, "delay promotion failed");
                if let JobFailureOutcome::Dead = queue.fail(job.id, &err).await? {
                    mark_delay_failed(store, &job.payload, &err).await;
                }
            }
        }
    }
    Ok(())
}

async fn process_delay_promotion<S: Store>(
    store: &S,
    orchestrator: &Orchestrator<S>,
    payload: &serde_json::Value,
) -> Result<(), String> {
    let delay: Delay = serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;
    let execution = store.get_execution(delay.execution_id).await.map_err(|e| e.to_string())?;
    if execution.status.is_terminal() {
        store
            .finish_delay(delay.id, wf_schemas::delay::DelayStatus::Cancelled, None, None)
            .await
            .map_err(|e| e.to_string())?;
        return Ok(());
    }
    orchestrator.resume_from_delay(delay.execution_id, &delay).await.map_err(|e| e.to_string())?;
    store
        .finish_delay(delay.id, wf_schemas::delay::DelayStatus::Executed, None, None)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

async fn mark_delay_failed<S: Store>(store: &S, payload: &serde_json::Value, error: &str) {
    if let Ok(delay) = serde_json::from_value::<Delay>(payload.clone()) {
        let _ = store
            .finish_delay(delay.id, wf_schemas::delay::DelayStatus::Failed, None, Some(error.to_string()))
            .await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::NoopSharedFlowInvoker;
    use crate::clock::ManualClock;
    use crate::engine::memory::{InMemoryQueue, InMemoryStore};
    use crate::registry::NodeRegistry;
    use crate::reliability::RetryPolicy;
    use wf_schemas::execution::{Execution, ExecutionState, ExecutionStatus};
    use wf_schemas::step::{Step, StepKind};
    use wf_schemas::workflow::WorkflowDefinition;

    struct NoopAdapter;

    #[async_trait::async_trait]
    impl crate::adapter::SideEffectAdapter for NoopAdapter {
        async fn send_email(&self, _ctx: &crate::adapter::ActionContext) -> Result<crate::adapter::AdapterOutcome, crate::adapter::AdapterError> {
            Ok(Default::default())
        }
        async fn send_sms(&self, _ctx: &crate::adapter::ActionContext) -> Result<crate::adapter::AdapterOutcome, crate::adapter::AdapterError> {
            Ok(Default::default())
        }
        async fn webhook(&self, _ctx: &crate::adapter::ActionContext) -> Result<crate::adapter::AdapterOutcome, crate::adapter::AdapterError> {
            Ok(Default::default())
        }
        async fn custom(&self, _ctx: &crate::adapter::ActionContext) -> Result<crate::adapter::AdapterOutcome, crate::adapter::AdapterError> {
            Ok(Default::default())
        }
    }

    fn orchestrator(store: Arc<InMemoryStore>) -> Arc<Orchestrator<InMemoryStore>> {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let registry = Arc::new(NodeRegistry::with_defaults(
            Arc::new(NoopAdapter),
            clock.clone(),
            Arc::new(NoopSharedFlowInvoker),
            Duration::from_secs(5),
        ));
        Arc::new(Orchestrator::new(store, registry, clock))
    }

    #[tokio::test]
    async fn drains_a_workflow_job_and_runs_it_to_completion() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryQueue::new());
        let orch = orchestrator(store.clone());

        let step = Step::new("step_0", StepKind::End, serde_json::json!({}));
        let workflow = WorkflowDefinition {
            id: Uuid::now_v7(),
            name: "t".into(),
            rule: serde_json::json!({}),
            compiled_steps: vec![step],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        store.put_workflow(workflow.clone()).await.unwrap();

        let job = WorkflowJob {
            execution_id: Uuid::now_v7(),
            workflow_id: workflow.id,
            trigger_type: "manual".into(),
            trigger_id: "t1".into(),
            user_id: "u1".into(),
            trigger_data: serde_json::json!({}),
            metadata: serde_json::json!({}),
        };
        queue
            .enqueue(WORKFLOW_JOB_TOPIC, serde_json::to_value(&job).unwrap(), 0, chrono::Utc::now(), RetryPolicy::queue_default())
            .await
            .unwrap();

        let config = WorkerConfig::default();
        drain_workflow_jobs(store.as_ref(), queue.as_ref(), orch.as_ref(), &config).await.unwrap();

        let executions = store
            .list_executions(crate::engine::store::ExecutionFilter::default())
            .await
            .unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn cancelled_execution_releases_its_delay_without_resuming() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryQueue::new());
        let orch = orchestrator(store.clone());

        let execution = Execution {
            id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
            user_id: "u1".into(),
            trigger_type: "manual".into(),
            trigger_id: "t1".into(),
            current_step: "step_0".into(),
            status: ExecutionStatus::Cancelled,
            workflow_definition: vec![],
            state: ExecutionState::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            completed_at: None,
            failed_at: Some(chrono::Utc::now()),
            error: None,
            retry_count: 0,
        };
        store.create_execution(execution.clone()).await.unwrap();

        let delay = Delay {
            id: Uuid::now_v7(),
            execution_id: execution.id,
            step_id: "step_0".into(),
            delay_type: "1_second".into(),
            delay_ms: 1000,
            scheduled_at: chrono::Utc::now(),
            execute_at: chrono::Utc::now(),
            status: wf_schemas::delay::DelayStatus::Processing,
            context: serde_json::json!({}),
            result: None,
            error: None,
            retry_count: 0,
            executed_at: None,
        };
        store.create_delay(delay.clone()).await.unwrap();

        queue
            .enqueue(DELAY_PROMOTION_TOPIC, serde_json::to_value(&delay).unwrap(), 10, chrono::Utc::now(), RetryPolicy::queue_default())
            .await
            .unwrap();

        let config = WorkerConfig::default();
        drain_delay_promotions(store.as_ref(), queue.as_ref(), orch.as_ref(), &config).await.unwrap();

        let persisted = store.get_delay(delay.id).await.unwrap();
        assert_eq!(persisted.status, wf_schemas::delay::DelayStatus::Cancelled);
    }
}
