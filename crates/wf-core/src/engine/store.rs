//! Durable entity CRUD over `WorkflowDefinition`, `Execution`, `Delay` and
//! `TriggerCursor` (§3, §6). Grounded on the same shape as `durable`'s
//! `WorkflowEventStore` trait, generalized from its workflow/task-queue
//! domain to this one's execution/delay/cursor domain.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use wf_schemas::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),
    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),
    #[error("delay not found: {0}")]
    DelayNotFound(Uuid),
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub workflow_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub trigger_type: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ExecutionFilter {
    pub fn paged(limit: i64, offset: i64) -> Self {
        Self {
            limit,
            offset,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    // -- WorkflowDefinition -------------------------------------------------
    async fn put_workflow(&self, def: WorkflowDefinition) -> Result<(), StoreError>;
    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowDefinition, StoreError>;
    async fn list_workflows_for_trigger(&self, trigger_type: &str) -> Result<Vec<WorkflowDefinition>, StoreError>;

    // -- Execution ------------------------------------------------------------
    /// The CAS-free read side of the §4.3 duplicate-suppression rule: returns
    /// the one non-`completed` row matching the natural key, if any.
    async fn find_active_execution(&self, key: &ExecutionKey) -> Result<Option<Execution>, StoreError>;
    async fn create_execution(&self, execution: Execution) -> Result<(), StoreError>;
    async fn get_execution(&self, id: Uuid) -> Result<Execution, StoreError>;
    async fn save_execution(&self, execution: &Execution) -> Result<(), StoreError>;
    async fn list_executions(&self, filter: ExecutionFilter) -> Result<Vec<Execution>, StoreError>;
    async fn list_stale_running(&self, older_than: DateTime<Utc>) -> Result<Vec<Execution>, StoreError>;

    // -- Delay ------------------------------------------------------------
    async fn create_delay(&self, delay: Delay) -> Result<(), StoreError>;
    async fn get_delay(&self, id: Uuid) -> Result<Delay, StoreError>;
    /// Atomic `pending -> processing` CAS claim of up to `limit` due delays
    /// (§4.4). Implementations must guarantee each delay is claimed by at
    /// most one caller even under concurrent invocation.
    async fn claim_due_delays(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Delay>, StoreError>;
    async fn finish_delay(
        &self,
        id: Uuid,
        status: DelayStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), StoreError>;
    async fn cancel_future_delays(&self, execution_id: Uuid) -> Result<(), StoreError>;
    async fn delete_old_delays(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;

    // -- TriggerCursor ------------------------------------------------------
    /// Defaults to the Unix epoch if no cursor row exists yet.
    async fn get_cursor(&self, workflow_id: Uuid, trigger_type: &str) -> Result<DateTime<Utc>, StoreError>;
    async fn advance_cursor(&self, workflow_id: Uuid, trigger_type: &str, to: DateTime<Utc>) -> Result<(), StoreError>;

    // -- Retention (§4.7) ------------------------------------------------------
    async fn delete_old_terminal_executions(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}
