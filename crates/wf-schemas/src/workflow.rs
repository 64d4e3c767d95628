use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::step::Step;

/// An immutable, compiled workflow. `rule` is the source JSON document the
/// compiler lowered; `compiled_steps` is the result, keyed positionally by
/// `step_<index>` ids.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub rule: serde_json::Value,
    pub compiled_steps: Vec<Step>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl WorkflowDefinition {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.compiled_steps.iter().find(|s| s.id == id)
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.compiled_steps.iter().position(|s| s.id == id)
    }
}
