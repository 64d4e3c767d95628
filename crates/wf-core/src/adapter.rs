//! The side-effect boundary action steps call through (§4.8, §6). Concrete
//! adapters (logging, HTTP webhook) live in the `wf-adapters` crate; this
//! trait is the seam the `NodeRegistry`'s action executor is written against.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ActionContext {
    pub execution_id: Uuid,
    pub step_id: String,
    pub action_type: String,
    pub data: Value,
}

#[derive(Debug, Clone, Default)]
pub struct AdapterOutcome {
    pub detail: Option<Value>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter call timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("adapter rejected the call: {0}")]
    Rejected(String),
}

impl AdapterError {
    /// Maps onto §7's "transient adapter error" class (retryable by the queue).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }
}

#[async_trait]
pub trait SideEffectAdapter: Send + Sync {
    async fn send_email(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError>;
    async fn send_sms(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError>;
    async fn webhook(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError>;
    async fn custom(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError>;

    async fn dispatch(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        match ctx.action_type.as_str() {
            "send_email" => self.send_email(ctx).await,
            "send_sms" => self.send_sms(ctx).await,
            "webhook" => self.webhook(ctx).await,
            _ => self.custom(ctx).await,
        }
    }
}

/// Invokes a shared sub-flow by name (§4.2). Shared flows cannot suspend in
/// the minimal contract, so this is a plain yes/no result.
#[async_trait]
pub trait SharedFlowInvoker: Send + Sync {
    async fn invoke(&self, name: &str, context: &Value) -> Result<(), String>;
}

/// Default collaborator used where no real shared-flow engine is wired up
/// (e.g. tests): every invocation succeeds without side effects.
pub struct NoopSharedFlowInvoker;

#[async_trait]
impl SharedFlowInvoker for NoopSharedFlowInvoker {
    async fn invoke(&self, _name: &str, _context: &Value) -> Result<(), String> {
        Ok(())
    }
}

/// `SideEffectAdapter` that always succeeds without doing anything, for
/// tests that exercise the orchestrator's step loop without a real
/// `wf-adapters` backend.
pub struct NoopSideEffectAdapter;

#[async_trait]
impl SideEffectAdapter for NoopSideEffectAdapter {
    async fn send_email(&self, _ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        Ok(AdapterOutcome::default())
    }

    async fn send_sms(&self, _ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        Ok(AdapterOutcome::default())
    }

    async fn webhook(&self, _ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        Ok(AdapterOutcome::default())
    }

    async fn custom(&self, _ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        Ok(AdapterOutcome::default())
    }
}

pub fn noop_adapter() -> NoopSideEffectAdapter {
    NoopSideEffectAdapter
}
