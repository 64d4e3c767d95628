use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::step::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Delayed,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// `completed | failed | cancelled` are absorbing; nothing may leave them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Delayed => "delayed",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HistoryState {
    Completed,
    Suspended,
    Failed,
}

/// One append-only entry in an execution's history. Never mutated after
/// being appended, except for flipping a `Suspended` entry to `Completed`
/// when its delay is promoted (see `wf-core::engine::orchestrator`).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    pub step_id: String,
    pub state: HistoryState,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Runtime state carried alongside an execution's persisted row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ExecutionState {
    #[serde(default)]
    pub current_state: serde_json::Value,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub shared_flows: Vec<serde_json::Value>,
}

/// The natural key used for duplicate-trigger suppression (§4.3): unique
/// among non-completed rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionKey {
    pub workflow_id: Uuid,
    pub user_id: String,
    pub trigger_type: String,
    pub trigger_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub user_id: String,
    pub trigger_type: String,
    pub trigger_id: String,
    pub current_step: String,
    pub status: ExecutionStatus,
    /// Snapshot of the compiled steps at the time the execution started, so a
    /// later edit to the workflow definition never changes an in-flight run.
    pub workflow_definition: Vec<Step>,
    pub state: ExecutionState,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub failed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: i32,
}

impl Execution {
    pub fn key(&self) -> ExecutionKey {
        ExecutionKey {
            workflow_id: self.workflow_id,
            user_id: self.user_id.clone(),
            trigger_type: self.trigger_type.clone(),
            trigger_id: self.trigger_id.clone(),
        }
    }

    pub fn step_by_id(&self, id: &str) -> Option<&Step> {
        self.workflow_definition.iter().find(|s| s.id == id)
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.workflow_definition.iter().position(|s| s.id == id)
    }
}
