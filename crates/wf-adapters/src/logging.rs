//! Tracing-backed adapter (§4.8): every call is logged and always succeeds.
//! Useful as the default adapter for local runs and as a collaborator in
//! tests that don't care about the side effect itself.

use async_trait::async_trait;
use tracing::info;
use wf_core::adapter::{ActionContext, AdapterError, AdapterOutcome, SideEffectAdapter};

#[derive(Debug, Default)]
pub struct LoggingAdapter;

impl LoggingAdapter {
    pub fn new() -> Self {
        Self
    }

    fn log(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        info!(
            execution_id = %ctx.execution_id,
            step_id = %ctx.step_id,
            action_type = %ctx.action_type,
            data = %ctx.data,
            "side effect"
        );
        Ok(AdapterOutcome::default())
    }
}

#[async_trait]
impl SideEffectAdapter for LoggingAdapter {
    async fn send_email(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        self.log(ctx)
    }

    async fn send_sms(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        self.log(ctx)
    }

    async fn webhook(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        self.log(ctx)
    }

    async fn custom(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        self.log(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn every_action_type_succeeds() {
        let adapter = LoggingAdapter::new();
        let ctx = ActionContext {
            execution_id: Uuid::now_v7(),
            step_id: "step_1".into(),
            action_type: "send_email".into(),
            data: json!({ "to": "a@example.com" }),
        };
        assert!(adapter.dispatch(&ctx).await.is_ok());
    }
}
