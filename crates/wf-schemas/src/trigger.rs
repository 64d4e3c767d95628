use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// What a `TriggerRegistry` poller yields: enough to create (or recognize a
/// duplicate of) one `Execution`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TriggerContext {
    pub workflow_id: Uuid,
    pub user_id: String,
    pub trigger_type: String,
    pub trigger_id: String,
    pub entity_data: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// The durable queue payload the scheduler enqueues for one trigger firing
/// and the worker pool consumes to invoke the orchestrator (§6).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowJob {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub trigger_type: String,
    pub trigger_id: String,
    pub user_id: String,
    pub trigger_data: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
