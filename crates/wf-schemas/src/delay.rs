use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DelayStatus {
    Pending,
    Processing,
    Executed,
    Failed,
    Cancelled,
}

impl DelayStatus {
    /// The lattice a delay may only move forward through: `pending ->
    /// processing -> {executed, failed}`, plus the explicit-cancel edges.
    pub fn can_transition_to(&self, next: DelayStatus) -> bool {
        use DelayStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Executed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

/// The persistent record of a suspended delay step, promoted once `execute_at`
/// has passed. `context` carries enough of the execution's runtime context to
/// resume without a full reload, including `originalDelayType` for dynamic
/// step reconstruction (see `wf-core::engine::orchestrator`).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Delay {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: String,
    pub delay_type: String,
    pub delay_ms: i64,
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
    pub execute_at: chrono::DateTime<chrono::Utc>,
    pub status: DelayStatus,
    pub context: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: i32,
    #[serde(default)]
    pub executed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Delay {
    pub fn original_delay_type(&self) -> Option<&str> {
        self.context.get("originalDelayType").and_then(|v| v.as_str())
    }
}
