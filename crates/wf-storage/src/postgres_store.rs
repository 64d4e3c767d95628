//! PostgreSQL implementation of [`Store`]. Mirrors `durable`'s
//! `PostgresWorkflowEventStore`: runtime-checked `sqlx::query` (never the
//! `query!` macro, since that needs a live `DATABASE_URL` at compile time),
//! `Row::get` column extraction, `#[instrument]` on every method.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;
use wf_core::engine::{ExecutionFilter, Store, StoreError};
use wf_schemas::prelude::*;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn execution_from_row(row: &sqlx::postgres::PgRow) -> Result<Execution, StoreError> {
    let workflow_definition: serde_json::Value = row.get("workflow_definition");
    let state: serde_json::Value = row.get("state");
    let status: String = row.get("status");
    Ok(Execution {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        user_id: row.get("user_id"),
        trigger_type: row.get("trigger_type"),
        trigger_id: row.get("trigger_id"),
        current_step: row.get("current_step"),
        status: parse_execution_status(&status)?,
        workflow_definition: serde_json::from_value(workflow_definition).map_err(|e| StoreError::Backend(e.to_string()))?,
        state: serde_json::from_value(state).map_err(|e| StoreError::Backend(e.to_string()))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
        failed_at: row.get("failed_at"),
        error: row.get("error"),
        retry_count: row.get("retry_count"),
    })
}

fn parse_execution_status(s: &str) -> Result<ExecutionStatus, StoreError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| StoreError::Backend(format!("unknown execution status: {s}")))
}

fn execution_status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Pending => "pending",
        ExecutionStatus::Running => "running",
        ExecutionStatus::Paused => "paused",
        ExecutionStatus::Delayed => "delayed",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Cancelled => "cancelled",
    }
}

fn delay_from_row(row: &sqlx::postgres::PgRow) -> Result<Delay, StoreError> {
    let status: String = row.get("status");
    Ok(Delay {
        id: row.get("id"),
        execution_id: row.get("execution_id"),
        step_id: row.get("step_id"),
        delay_type: row.get("delay_type"),
        delay_ms: row.get("delay_ms"),
        scheduled_at: row.get("scheduled_at"),
        execute_at: row.get("execute_at"),
        status: parse_delay_status(&status)?,
        context: row.get("context"),
        result: row.get("result"),
        error: row.get("error"),
        retry_count: row.get("retry_count"),
        executed_at: row.get("executed_at"),
    })
}

fn parse_delay_status(s: &str) -> Result<DelayStatus, StoreError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| StoreError::Backend(format!("unknown delay status: {s}")))
}

fn delay_status_str(status: DelayStatus) -> &'static str {
    match status {
        DelayStatus::Pending => "pending",
        DelayStatus::Processing => "processing",
        DelayStatus::Executed => "executed",
        DelayStatus::Failed => "failed",
        DelayStatus::Cancelled => "cancelled",
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self, def))]
    async fn put_workflow(&self, def: WorkflowDefinition) -> Result<(), StoreError> {
        let compiled_steps = serde_json::to_value(&def.compiled_steps).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, rule, compiled_steps, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                rule = EXCLUDED.rule,
                compiled_steps = EXCLUDED.compiled_steps,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(def.id)
        .bind(&def.name)
        .bind(&def.rule)
        .bind(&compiled_steps)
        .bind(def.created_at)
        .bind(def.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowDefinition, StoreError> {
        let row = sqlx::query("SELECT id, name, rule, compiled_steps, created_at, updated_at FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::WorkflowNotFound(id))?;
        let compiled_steps: serde_json::Value = row.get("compiled_steps");
        Ok(WorkflowDefinition {
            id: row.get("id"),
            name: row.get("name"),
            rule: row.get("rule"),
            compiled_steps: serde_json::from_value(compiled_steps).map_err(|e| StoreError::Backend(e.to_string()))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    #[instrument(skip(self))]
    async fn list_workflows_for_trigger(&self, trigger_type: &str) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, rule, compiled_steps, created_at, updated_at FROM workflows WHERE rule ->> 'triggerType' = $1",
        )
        .bind(trigger_type)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let compiled_steps: serde_json::Value = row.get("compiled_steps");
                Ok(WorkflowDefinition {
                    id: row.get("id"),
                    name: row.get("name"),
                    rule: row.get("rule"),
                    compiled_steps: serde_json::from_value(compiled_steps).map_err(|e| StoreError::Backend(e.to_string()))?,
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn find_active_execution(&self, key: &ExecutionKey) -> Result<Option<Execution>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM workflow_executions
            WHERE workflow_id = $1 AND user_id = $2 AND trigger_type = $3 AND trigger_id = $4
              AND status <> 'completed'
            "#,
        )
        .bind(key.workflow_id)
        .bind(&key.user_id)
        .bind(&key.trigger_type)
        .bind(&key.trigger_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(execution_from_row).transpose()
    }

    #[instrument(skip(self, execution))]
    async fn create_execution(&self, execution: Execution) -> Result<(), StoreError> {
        let workflow_definition =
            serde_json::to_value(&execution.workflow_definition).map_err(|e| StoreError::Backend(e.to_string()))?;
        let state = serde_json::to_value(&execution.state).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, user_id, trigger_type, trigger_id, current_step, status,
                 workflow_definition, state, created_at, updated_at, completed_at, failed_at, error, retry_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(execution.id)
        .bind(execution.workflow_id)
        .bind(&execution.user_id)
        .bind(&execution.trigger_type)
        .bind(&execution.trigger_id)
        .bind(&execution.current_step)
        .bind(execution_status_str(execution.status))
        .bind(&workflow_definition)
        .bind(&state)
        .bind(execution.created_at)
        .bind(execution.updated_at)
        .bind(execution.completed_at)
        .bind(execution.failed_at)
        .bind(&execution.error)
        .bind(execution.retry_count)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(%e, "failed to create execution");
            db_err(e)
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_execution(&self, id: Uuid) -> Result<Execution, StoreError> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::ExecutionNotFound(id))?;
        execution_from_row(&row)
    }

    #[instrument(skip(self, execution))]
    async fn save_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        let workflow_definition =
            serde_json::to_value(&execution.workflow_definition).map_err(|e| StoreError::Backend(e.to_string()))?;
        let state = serde_json::to_value(&execution.state).map_err(|e| StoreError::Backend(e.to_string()))?;
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions SET
                current_step = $2, status = $3, workflow_definition = $4, state = $5,
                updated_at = $6, completed_at = $7, failed_at = $8, error = $9, retry_count = $10
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(&execution.current_step)
        .bind(execution_status_str(execution.status))
        .bind(&workflow_definition)
        .bind(&state)
        .bind(execution.updated_at)
        .bind(execution.completed_at)
        .bind(execution.failed_at)
        .bind(&execution.error)
        .bind(execution.retry_count)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ExecutionNotFound(execution.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_executions(&self, filter: ExecutionFilter) -> Result<Vec<Execution>, StoreError> {
        let status_str = filter.status.map(execution_status_str);
        let rows = sqlx::query(
            r#"
            SELECT * FROM workflow_executions
            WHERE ($1::uuid IS NULL OR workflow_id = $1)
              AND ($2::text IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::text IS NULL OR trigger_type = $4)
            ORDER BY created_at
            OFFSET $5 LIMIT $6
            "#,
        )
        .bind(filter.workflow_id)
        .bind(&filter.user_id)
        .bind(status_str)
        .bind(&filter.trigger_type)
        .bind(filter.offset)
        .bind(if filter.limit > 0 { filter.limit } else { i64::MAX })
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(execution_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn list_stale_running(&self, older_than: DateTime<Utc>) -> Result<Vec<Execution>, StoreError> {
        let rows = sqlx::query("SELECT * FROM workflow_executions WHERE status = 'running' AND updated_at < $1")
            .bind(older_than)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(execution_from_row).collect()
    }

    #[instrument(skip(self, delay))]
    async fn create_delay(&self, delay: Delay) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_delays
                (id, execution_id, step_id, delay_type, delay_ms, scheduled_at, execute_at, status, context, result, error, retry_count, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(delay.id)
        .bind(delay.execution_id)
        .bind(&delay.step_id)
        .bind(&delay.delay_type)
        .bind(delay.delay_ms)
        .bind(delay.scheduled_at)
        .bind(delay.execute_at)
        .bind(delay_status_str(delay.status))
        .bind(&delay.context)
        .bind(&delay.result)
        .bind(&delay.error)
        .bind(delay.retry_count)
        .bind(delay.executed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_delay(&self, id: Uuid) -> Result<Delay, StoreError> {
        let row = sqlx::query("SELECT * FROM workflow_delays WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::DelayNotFound(id))?;
        delay_from_row(&row)
    }

    /// Atomic `pending -> processing` claim via a `FOR UPDATE SKIP LOCKED` CTE
    /// feeding an `UPDATE ... RETURNING`, the same shape `durable` uses for
    /// its task queue claim (§4.4).
    #[instrument(skip(self))]
    async fn claim_due_delays(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Delay>, StoreError> {
        let rows = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id FROM workflow_delays
                WHERE status = 'pending' AND execute_at <= $1
                ORDER BY execute_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE workflow_delays d
            SET status = 'processing'
            FROM claimable c
            WHERE d.id = c.id
            RETURNING d.*
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(%e, "failed to claim due delays");
            db_err(e)
        })?;
        let claimed: Result<Vec<Delay>, StoreError> = rows.iter().map(delay_from_row).collect();
        let claimed = claimed?;
        if !claimed.is_empty() {
            debug!(count = claimed.len(), "claimed due delays");
        }
        Ok(claimed)
    }

    #[instrument(skip(self, result))]
    async fn finish_delay(
        &self,
        id: Uuid,
        status: DelayStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE workflow_delays SET status = $2, result = $3, error = $4, executed_at = now() WHERE id = $1")
            .bind(id)
            .bind(delay_status_str(status))
            .bind(&result)
            .bind(&error)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cancel_future_delays(&self, execution_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE workflow_delays SET status = 'cancelled' WHERE execution_id = $1 AND status = 'pending'")
            .bind(execution_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_old_delays(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM workflow_delays WHERE status = 'failed' AND execute_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn get_cursor(&self, workflow_id: Uuid, trigger_type: &str) -> Result<DateTime<Utc>, StoreError> {
        let row = sqlx::query("SELECT last_execution_time FROM workflow_trigger_cursors WHERE workflow_id = $1 AND trigger_type = $2")
            .bind(workflow_id)
            .bind(trigger_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row
            .map(|r| r.get("last_execution_time"))
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap()))
    }

    #[instrument(skip(self))]
    async fn advance_cursor(&self, workflow_id: Uuid, trigger_type: &str, to: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_trigger_cursors (workflow_id, trigger_type, last_execution_time)
            VALUES ($1, $2, $3)
            ON CONFLICT (workflow_id, trigger_type) DO UPDATE SET last_execution_time = EXCLUDED.last_execution_time
            "#,
        )
        .bind(workflow_id)
        .bind(trigger_type)
        .bind(to)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_old_terminal_executions(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        // `failed` rows are retained for post-mortem regardless of age (§4.7).
        let result = sqlx::query("DELETE FROM workflow_executions WHERE status IN ('completed', 'cancelled') AND updated_at < $1")
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
