//! Compiled step shapes and the result contract every [`StepKind`] executor returns.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The five step kinds the compiler ever emits. See `wf-core::compiler` for the
/// dialects that lower onto each of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Action,
    Delay,
    Condition,
    SharedFlow,
    End,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Delay => "delay",
            Self::Condition => "condition",
            Self::SharedFlow => "shared-flow",
            Self::End => "end",
        }
    }
}

/// One node of a compiled workflow. `id` is positionally stable (`step_<index>`
/// at compile time); `next` names the step(s) that may follow, by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub data: serde_json::Value,
    #[serde(default)]
    pub rule: Option<serde_json::Value>,
    #[serde(default)]
    pub next: Vec<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            data,
            rule: None,
            next: Vec::new(),
        }
    }

    pub fn index(&self) -> Option<usize> {
        self.id.strip_prefix("step_").and_then(|n| n.parse().ok())
    }
}

/// The contract every step executor returns. `metadata.workflow_suspended` is
/// the only signal the orchestrator checks to decide whether to persist and
/// return instead of continuing the loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct StepResult {
    pub success: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub next_steps: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<StepResultMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct StepResultMetadata {
    #[serde(default)]
    pub workflow_suspended: bool,
    #[serde(default)]
    pub resume_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl StepResult {
    pub fn ok(result: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            result,
            error: None,
            next_steps: None,
            metadata: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            next_steps: None,
            metadata: None,
        }
    }

    pub fn suspended(resume_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            success: true,
            result: None,
            error: None,
            next_steps: None,
            metadata: Some(StepResultMetadata {
                workflow_suspended: true,
                resume_at: Some(resume_at),
            }),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.metadata
            .as_ref()
            .map(|m| m.workflow_suspended)
            .unwrap_or(false)
    }

    /// Actions a condition step extracted for splicing into the step list.
    /// Stored at `result.extractedActions` by convention (see `wf-core::compiler`).
    pub fn extracted_actions(&self) -> Vec<serde_json::Value> {
        self.result
            .as_ref()
            .and_then(|r| r.get("extractedActions"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
    }
}
