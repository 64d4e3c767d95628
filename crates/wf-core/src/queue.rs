//! Named FIFO job queue with delayed visibility and retry/backoff (§3.1, §6).
//! Implemented as durable rows rather than a standalone broker process, in
//! the same spirit as `durable`'s Postgres task queue (`claim` uses
//! `SELECT ... FOR UPDATE SKIP LOCKED` in the `wf-storage` implementation).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::reliability::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(Uuid),
    #[error("queue backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub topic: String,
    pub payload: Value,
    pub attempt: u32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub enum JobFailureOutcome {
    WillRetry { next_attempt: u32, delay: std::time::Duration },
    Dead,
}

#[async_trait]
pub trait Queue: Send + Sync + 'static {
    async fn enqueue(
        &self,
        topic: &str,
        payload: Value,
        priority: i32,
        visible_at: DateTime<Utc>,
        retry_policy: RetryPolicy,
    ) -> Result<Uuid, QueueError>;

    /// Claim up to `max` visible jobs from `topic`. Implementations must use
    /// an atomic claim (row lock / `SKIP LOCKED`) so two workers never
    /// receive the same job (§5).
    async fn claim(&self, topic: &str, worker_id: &str, max: i64) -> Result<Vec<ClaimedJob>, QueueError>;

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<JobFailureOutcome, QueueError>;

    /// Topic depth and oldest-visible-age, for the Control API's
    /// `/queues/:name/stats` (§6).
    async fn stats(&self, topic: &str) -> Result<QueueStats, QueueError>;
}

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub pending: i64,
    pub claimed: i64,
    pub dead: i64,
}
