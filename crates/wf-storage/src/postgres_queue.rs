//! Postgres-backed [`Queue`]: the same `FOR UPDATE SKIP LOCKED` claim shape
//! as `workflow_delays`, keyed by topic and ordered by priority then
//! visibility (§3.1, §6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;
use wf_core::queue::{ClaimedJob, JobFailureOutcome, Queue, QueueError, QueueStats};
use wf_core::reliability::RetryPolicy;

#[derive(Clone)]
pub struct PostgresQueue {
    pool: PgPool,
}

impl PostgresQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Queue for PostgresQueue {
    async fn enqueue(
        &self,
        topic: &str,
        payload: Value,
        priority: i32,
        visible_at: DateTime<Utc>,
        retry_policy: RetryPolicy,
    ) -> Result<Uuid, QueueError> {
        let id = Uuid::now_v7();
        let retry_policy_json = serde_json::to_value(&retry_policy).map_err(|e| QueueError::Backend(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO workflow_queue_jobs (id, topic, payload, priority, status, visible_at, attempt, max_attempts, retry_policy)
            VALUES ($1, $2, $3, $4, 'pending', $5, 0, $6, $7)
            "#,
        )
        .bind(id)
        .bind(topic)
        .bind(&payload)
        .bind(priority)
        .bind(visible_at)
        .bind(retry_policy.max_attempts as i32)
        .bind(&retry_policy_json)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(id)
    }

    async fn claim(&self, topic: &str, worker_id: &str, max: i64) -> Result<Vec<ClaimedJob>, QueueError> {
        let rows = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id FROM workflow_queue_jobs
                WHERE topic = $1 AND status = 'pending' AND visible_at <= now()
                ORDER BY priority DESC, visible_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE workflow_queue_jobs j
            SET status = 'claimed', claimed_by = $3, attempt = attempt + 1
            FROM claimable c
            WHERE j.id = c.id
            RETURNING j.id, j.topic, j.payload, j.attempt, j.max_attempts
            "#,
        )
        .bind(topic)
        .bind(max)
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| ClaimedJob {
                id: row.get("id"),
                topic: row.get("topic"),
                payload: row.get("payload"),
                attempt: row.get::<i32, _>("attempt") as u32,
                max_attempts: row.get::<i32, _>("max_attempts") as u32,
            })
            .collect())
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM workflow_queue_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<JobFailureOutcome, QueueError> {
        let row = sqlx::query("SELECT attempt, max_attempts, topic, payload, retry_policy FROM workflow_queue_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?
            .ok_or(QueueError::NotFound(job_id))?;

        let attempt: i32 = row.get("attempt");
        let retry_policy_json: Value = row.get("retry_policy");
        let retry_policy: RetryPolicy =
            serde_json::from_value(retry_policy_json).map_err(|e| QueueError::Backend(e.to_string()))?;

        if retry_policy.has_attempts_remaining(attempt as u32) {
            let delay = retry_policy.delay_for_attempt(attempt as u32);
            let visible_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            sqlx::query("UPDATE workflow_queue_jobs SET status = 'pending', visible_at = $2 WHERE id = $1")
                .bind(job_id)
                .bind(visible_at)
                .execute(&self.pool)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            Ok(JobFailureOutcome::WillRetry {
                next_attempt: attempt as u32 + 1,
                delay,
            })
        } else {
            let topic: String = row.get("topic");
            let payload: Value = row.get("payload");
            let mut tx = self.pool.begin().await.map_err(|e| QueueError::Backend(e.to_string()))?;
            sqlx::query(
                "INSERT INTO workflow_queue_dead_letters (id, topic, payload, last_error, attempt) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::now_v7())
            .bind(&topic)
            .bind(&payload)
            .bind(error)
            .bind(attempt)
            .execute(&mut *tx)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
            sqlx::query("DELETE FROM workflow_queue_jobs WHERE id = $1")
                .bind(job_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            tx.commit().await.map_err(|e| QueueError::Backend(e.to_string()))?;
            warn!(%job_id, %topic, attempt, "job exhausted retries, moved to dead letter");
            Ok(JobFailureOutcome::Dead)
        }
    }

    async fn stats(&self, topic: &str) -> Result<QueueStats, QueueError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'claimed') AS claimed
            FROM workflow_queue_jobs WHERE topic = $1
            "#,
        )
        .bind(topic)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        let dead_row = sqlx::query("SELECT COUNT(*) AS dead FROM workflow_queue_dead_letters WHERE topic = $1")
            .bind(topic)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(QueueStats {
            pending: row.get("pending"),
            claimed: row.get("claimed"),
            dead: dead_row.get("dead"),
        })
    }
}
