//! In-memory `Store`/`Lock`/`Queue` used by the test suite (§8.1) and by
//! `wf-server` in `--no-db` demo mode, mirroring `durable`'s
//! `InMemoryWorkflowEventStore`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;
use wf_schemas::prelude::*;

use crate::engine::store::{ExecutionFilter, Store, StoreError};
use crate::lock::{Lock, LockError, LockToken};
use crate::queue::{ClaimedJob, JobFailureOutcome, Queue, QueueError, QueueStats};
use crate::reliability::RetryPolicy;

#[derive(Default)]
pub struct InMemoryStore {
    workflows: Mutex<HashMap<Uuid, WorkflowDefinition>>,
    executions: Mutex<HashMap<Uuid, Execution>>,
    delays: Mutex<HashMap<Uuid, Delay>>,
    cursors: Mutex<HashMap<(Uuid, String), DateTime<Utc>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put_workflow(&self, def: WorkflowDefinition) -> Result<(), StoreError> {
        self.workflows.lock().unwrap().insert(def.id, def);
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowDefinition, StoreError> {
        self.workflows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::WorkflowNotFound(id))
    }

    async fn list_workflows_for_trigger(&self, trigger_type: &str) -> Result<Vec<WorkflowDefinition>, StoreError> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .values()
            .filter(|w| {
                w.rule
                    .get("triggerType")
                    .and_then(|v| v.as_str())
                    .map(|t| t == trigger_type)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn find_active_execution(&self, key: &ExecutionKey) -> Result<Option<Execution>, StoreError> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .values()
            .find(|e| e.key() == *key && e.status != ExecutionStatus::Completed)
            .cloned())
    }

    async fn create_execution(&self, execution: Execution) -> Result<(), StoreError> {
        self.executions.lock().unwrap().insert(execution.id, execution);
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Execution, StoreError> {
        self.executions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::ExecutionNotFound(id))
    }

    async fn save_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        let mut guard = self.executions.lock().unwrap();
        if !guard.contains_key(&execution.id) {
            return Err(StoreError::ExecutionNotFound(execution.id));
        }
        guard.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn list_executions(&self, filter: ExecutionFilter) -> Result<Vec<Execution>, StoreError> {
        let guard = self.executions.lock().unwrap();
        let mut matches: Vec<Execution> = guard
            .values()
            .filter(|e| filter.workflow_id.map(|w| w == e.workflow_id).unwrap_or(true))
            .filter(|e| filter.user_id.as_deref().map(|u| u == e.user_id).unwrap_or(true))
            .filter(|e| filter.status.map(|s| s == e.status).unwrap_or(true))
            .filter(|e| {
                filter
                    .trigger_type
                    .as_deref()
                    .map(|t| t == e.trigger_type)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        matches.sort_by_key(|e| e.created_at);
        let offset = filter.offset.max(0) as usize;
        let limit = if filter.limit > 0 { filter.limit as usize } else { matches.len() };
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_stale_running(&self, older_than: DateTime<Utc>) -> Result<Vec<Execution>, StoreError> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.status == ExecutionStatus::Running && e.updated_at < older_than)
            .cloned()
            .collect())
    }

    async fn create_delay(&self, delay: Delay) -> Result<(), StoreError> {
        self.delays.lock().unwrap().insert(delay.id, delay);
        Ok(())
    }

    async fn get_delay(&self, id: Uuid) -> Result<Delay, StoreError> {
        self.delays
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::DelayNotFound(id))
    }

    async fn claim_due_delays(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Delay>, StoreError> {
        let mut guard = self.delays.lock().unwrap();
        let mut due: Vec<Uuid> = guard
            .values()
            .filter(|d| d.status == DelayStatus::Pending && d.execute_at <= now)
            .map(|d| d.id)
            .collect();
        due.sort();
        due.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(delay) = guard.get_mut(&id) {
                delay.status = DelayStatus::Processing;
                claimed.push(delay.clone());
            }
        }
        Ok(claimed)
    }

    async fn finish_delay(
        &self,
        id: Uuid,
        status: DelayStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut guard = self.delays.lock().unwrap();
        let delay = guard.get_mut(&id).ok_or(StoreError::DelayNotFound(id))?;
        delay.status = status;
        delay.result = result;
        delay.error = error;
        delay.executed_at = Some(Utc::now());
        Ok(())
    }

    async fn cancel_future_delays(&self, execution_id: Uuid) -> Result<(), StoreError> {
        let mut guard = self.delays.lock().unwrap();
        for delay in guard.values_mut() {
            if delay.execution_id == execution_id && delay.status == DelayStatus::Pending {
                delay.status = DelayStatus::Cancelled;
            }
        }
        Ok(())
    }

    async fn delete_old_delays(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut guard = self.delays.lock().unwrap();
        let before = guard.len();
        guard.retain(|_, d| !(d.status == DelayStatus::Failed && d.execute_at < older_than));
        Ok((before - guard.len()) as u64)
    }

    async fn get_cursor(&self, workflow_id: Uuid, trigger_type: &str) -> Result<DateTime<Utc>, StoreError> {
        Ok(self
            .cursors
            .lock()
            .unwrap()
            .get(&(workflow_id, trigger_type.to_string()))
            .copied()
            .unwrap_or(DateTime::<Utc>::from_timestamp(0, 0).unwrap()))
    }

    async fn advance_cursor(&self, workflow_id: Uuid, trigger_type: &str, to: DateTime<Utc>) -> Result<(), StoreError> {
        self.cursors
            .lock()
            .unwrap()
            .insert((workflow_id, trigger_type.to_string()), to);
        Ok(())
    }

    async fn delete_old_terminal_executions(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        // `Failed` is kept for post-mortem regardless of age (§4.7); only
        // `Completed`/`Cancelled` rows are pruned.
        let mut guard = self.executions.lock().unwrap();
        let before = guard.len();
        guard.retain(|_, e| {
            let prunable = matches!(e.status, ExecutionStatus::Completed | ExecutionStatus::Cancelled);
            !(prunable && e.updated_at < older_than)
        });
        Ok((before - guard.len()) as u64)
    }
}

/// In-memory lock. Useful for single-replica tests; multi-replica race-free
/// claiming (§8 property) is exercised against this too, since the mutex
/// makes acquisition itself atomic regardless of backend.
#[derive(Default)]
pub struct InMemoryLock {
    holders: Mutex<HashMap<String, (LockToken, DateTime<Utc>)>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Lock for InMemoryLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let mut guard = self.holders.lock().unwrap();
        let now = Utc::now();
        if let Some((_, expires_at)) = guard.get(key) {
            if *expires_at > now {
                return Ok(None);
            }
        }
        let token = LockToken::new();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30));
        guard.insert(key.to_string(), (token, expires_at));
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: LockToken) -> Result<(), LockError> {
        let mut guard = self.holders.lock().unwrap();
        if let Some((holder, _)) = guard.get(key) {
            if *holder == token {
                guard.remove(key);
            }
        }
        Ok(())
    }
}

struct QueueEntry {
    job: ClaimedJob,
    status: JobState,
    visible_at: DateTime<Utc>,
    retry_policy: RetryPolicy,
}

#[derive(PartialEq)]
enum JobState {
    Pending,
    Claimed,
    Dead,
}

#[derive(Default)]
pub struct InMemoryQueue {
    jobs: Mutex<HashMap<Uuid, QueueEntry>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(
        &self,
        topic: &str,
        payload: Value,
        _priority: i32,
        visible_at: DateTime<Utc>,
        retry_policy: RetryPolicy,
    ) -> Result<Uuid, QueueError> {
        let id = Uuid::now_v7();
        self.jobs.lock().unwrap().insert(
            id,
            QueueEntry {
                job: ClaimedJob {
                    id,
                    topic: topic.to_string(),
                    payload,
                    attempt: 0,
                    max_attempts: retry_policy.max_attempts,
                },
                status: JobState::Pending,
                visible_at,
                retry_policy,
            },
        );
        Ok(id)
    }

    async fn claim(&self, topic: &str, _worker_id: &str, max: i64) -> Result<Vec<ClaimedJob>, QueueError> {
        let mut guard = self.jobs.lock().unwrap();
        let now = Utc::now();
        let mut claimed = Vec::new();
        for entry in guard.values_mut() {
            if claimed.len() as i64 >= max {
                break;
            }
            if entry.job.topic == topic && entry.status == JobState::Pending && entry.visible_at <= now {
                entry.status = JobState::Claimed;
                entry.job.attempt += 1;
                claimed.push(entry.job.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.jobs.lock().unwrap().remove(&job_id);
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, _error: &str) -> Result<JobFailureOutcome, QueueError> {
        let mut guard = self.jobs.lock().unwrap();
        let entry = guard.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
        if entry.retry_policy.has_attempts_remaining(entry.job.attempt) {
            let delay = entry.retry_policy.delay_for_attempt(entry.job.attempt);
            entry.status = JobState::Pending;
            entry.visible_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            Ok(JobFailureOutcome::WillRetry {
                next_attempt: entry.job.attempt + 1,
                delay,
            })
        } else {
            entry.status = JobState::Dead;
            Ok(JobFailureOutcome::Dead)
        }
    }

    async fn stats(&self, topic: &str) -> Result<QueueStats, QueueError> {
        let guard = self.jobs.lock().unwrap();
        let mut stats = QueueStats::default();
        for entry in guard.values().filter(|e| e.job.topic == topic) {
            match entry.status {
                JobState::Pending => stats.pending += 1,
                JobState::Claimed => stats.claimed += 1,
                JobState::Dead => stats.dead += 1,
            }
        }
        Ok(stats)
    }
}
