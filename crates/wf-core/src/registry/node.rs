//! Step-type → executor dispatch table (§4.2). Each executor validates a
//! step's compiled `data` and performs its effect; the orchestrator never
//! matches on `StepKind` itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wf_schemas::step::{Step, StepKind, StepResult};

use crate::adapter::{ActionContext, SharedFlowInvoker, SideEffectAdapter};
use crate::clock::Clock;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

/// What an executor needs to run a step: the execution's identity (for
/// idempotency keys) and the live context to read and, for actions only,
/// no write access — context mutation happens in the orchestrator so it
/// stays the single place that persists state.
pub struct ExecutionRef<'a> {
    pub execution_id: uuid::Uuid,
    pub context: &'a Value,
}

#[async_trait]
pub trait NodeExecutor: Send + Sync {
    fn validate(&self, step: &Step) -> ValidationResult;
    async fn execute(&self, step: &Step, exec: &ExecutionRef<'_>) -> StepResult;
}

pub struct NodeRegistry {
    executors: HashMap<StepKind, Arc<dyn NodeExecutor>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registry wired with the five built-in executors, as every deployment
    /// needs (§4.2 names no optional ones).
    pub fn with_defaults(
        adapter: Arc<dyn SideEffectAdapter>,
        clock: Arc<dyn Clock>,
        shared_flows: Arc<dyn SharedFlowInvoker>,
        adapter_timeout: Duration,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(StepKind::Action, Arc::new(ActionExecutor { adapter, timeout: adapter_timeout }));
        registry.register(StepKind::Delay, Arc::new(DelayExecutor { clock }));
        registry.register(StepKind::Condition, Arc::new(ConditionExecutor));
        registry.register(StepKind::SharedFlow, Arc::new(SharedFlowExecutor { invoker: shared_flows }));
        registry.register(StepKind::End, Arc::new(EndExecutor));
        registry
    }

    pub fn register(&mut self, kind: StepKind, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(kind, executor);
    }

    pub fn get(&self, kind: StepKind) -> Option<&Arc<dyn NodeExecutor>> {
        self.executors.get(&kind)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------
// action
// ---------------------------------------------------------------------

pub struct ActionExecutor {
    adapter: Arc<dyn SideEffectAdapter>,
    timeout: Duration,
}

impl ActionExecutor {
    fn action_type(step: &Step) -> &str {
        step.data
            .get("actionType")
            .and_then(|v| v.as_str())
            .unwrap_or("custom")
    }
}

#[async_trait]
impl NodeExecutor for ActionExecutor {
    fn validate(&self, step: &Step) -> ValidationResult {
        let mut errors = Vec::new();
        match Self::action_type(step) {
            "send_email" => {
                for field in ["templateId", "subject", "to"] {
                    if step.data.get(field).filter(|v| !v.is_null()).is_none() {
                        errors.push(format!("send_email step missing `{field}`"));
                    }
                }
            }
            "send_sms" => {
                for field in ["templateId", "to"] {
                    if step.data.get(field).filter(|v| !v.is_null()).is_none() {
                        errors.push(format!("send_sms step missing `{field}`"));
                    }
                }
            }
            _ => {}
        }
        if errors.is_empty() {
            ValidationResult::ok()
        } else {
            ValidationResult::invalid(errors)
        }
    }

    async fn execute(&self, step: &Step, exec: &ExecutionRef<'_>) -> StepResult {
        let validation = self.validate(step);
        if !validation.is_valid {
            return StepResult::failure(validation.errors.join("; "));
        }

        let action_type = Self::action_type(step).to_string();
        let ctx = ActionContext {
            execution_id: exec.execution_id,
            step_id: step.id.clone(),
            action_type: action_type.clone(),
            data: step.data.clone(),
        };

        let call = self.adapter.dispatch(&ctx);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(outcome)) => StepResult::ok(Some(json!({ "actionType": action_type, "detail": outcome.detail }))),
            Ok(Err(err)) => StepResult::failure(err.to_string()),
            Err(_) => StepResult::failure("adapter call timed out"),
        }
    }
}

// ---------------------------------------------------------------------
// delay
// ---------------------------------------------------------------------

pub struct DelayExecutor {
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl NodeExecutor for DelayExecutor {
    fn validate(&self, step: &Step) -> ValidationResult {
        if step.data.get("delayMs").and_then(|v| v.as_i64()).is_some() {
            ValidationResult::ok()
        } else {
            ValidationResult::invalid(vec!["delay step missing `delayMs`".into()])
        }
    }

    async fn execute(&self, step: &Step, _exec: &ExecutionRef<'_>) -> StepResult {
        let validation = self.validate(step);
        if !validation.is_valid {
            return StepResult::failure(validation.errors.join("; "));
        }
        let delay_ms = step.data["delayMs"].as_i64().unwrap_or(1_000);
        let execute_at = self.clock.now() + chrono::Duration::milliseconds(delay_ms);
        let mut result = StepResult::suspended(execute_at);
        result.result = Some(json!({
            "delayType": step.data.get("delayType").cloned().unwrap_or(Value::Null),
            "delayMs": delay_ms,
            "originalDelayType": step.data.get("delayType").cloned().unwrap_or(Value::Null),
        }));
        result
    }
}

// ---------------------------------------------------------------------
// condition
// ---------------------------------------------------------------------

pub struct ConditionExecutor;

impl ConditionExecutor {
    /// Pure over `context.data` by construction (§4.3, §8): reads only the
    /// step's own compiled `data` and the passed-in context, no hidden state.
    fn evaluate(step_data: &Value, context: &Value) -> bool {
        let condition_type = step_data.get("conditionType").and_then(|v| v.as_str());
        let Some(condition_type) = condition_type else {
            return false;
        };
        let operator = step_data
            .get("operator")
            .and_then(|v| v.as_str())
            .unwrap_or("equals");
        let expected = step_data.get("conditionValue").cloned().unwrap_or(Value::Null);

        let actual = context
            .get(condition_type)
            .or_else(|| context.get("data").and_then(|d| d.get(condition_type)))
            .cloned()
            .unwrap_or(Value::Null);

        match operator {
            "equals" => actual == expected,
            "not_equals" => actual != expected,
            "contains" => match (actual.as_str(), expected.as_str()) {
                (Some(a), Some(e)) => a.contains(e),
                _ => false,
            },
            _ => false,
        }
    }
}

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    fn validate(&self, step: &Step) -> ValidationResult {
        if step.data.get("conditionType").is_some() {
            ValidationResult::ok()
        } else {
            ValidationResult::invalid(vec!["condition step missing `conditionType`".into()])
        }
    }

    async fn execute(&self, step: &Step, exec: &ExecutionRef<'_>) -> StepResult {
        let matched = Self::evaluate(&step.data, exec.context);
        let extracted_actions = if matched {
            step.data
                .get("thenActions")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default()
        } else {
            vec![]
        };
        StepResult::ok(Some(json!({
            "matched": matched,
            "extractedActions": extracted_actions,
        })))
    }
}

// ---------------------------------------------------------------------
// shared-flow
// ---------------------------------------------------------------------

pub struct SharedFlowExecutor {
    invoker: Arc<dyn SharedFlowInvoker>,
}

#[async_trait]
impl NodeExecutor for SharedFlowExecutor {
    fn validate(&self, step: &Step) -> ValidationResult {
        if step.data.get("name").and_then(|v| v.as_str()).is_some() {
            ValidationResult::ok()
        } else {
            ValidationResult::invalid(vec!["shared-flow step missing `name`".into()])
        }
    }

    async fn execute(&self, step: &Step, exec: &ExecutionRef<'_>) -> StepResult {
        let name = step.data.get("name").and_then(|v| v.as_str()).unwrap_or_default();
        match self.invoker.invoke(name, exec.context).await {
            Ok(()) => StepResult::ok(Some(json!({ "sharedFlow": name }))),
            Err(err) => StepResult::failure(err),
        }
    }
}

// ---------------------------------------------------------------------
// end
// ---------------------------------------------------------------------

pub struct EndExecutor;

#[async_trait]
impl NodeExecutor for EndExecutor {
    fn validate(&self, _step: &Step) -> ValidationResult {
        ValidationResult::ok()
    }

    async fn execute(&self, _step: &Step, _exec: &ExecutionRef<'_>) -> StepResult {
        let mut result = StepResult::ok(None);
        result.next_steps = Some(vec![]);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wf_schemas::step::Step;

    struct CountingAdapter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SideEffectAdapter for CountingAdapter {
        async fn send_email(&self, _ctx: &ActionContext) -> Result<crate::adapter::AdapterOutcome, crate::adapter::AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Default::default())
        }
        async fn send_sms(&self, _ctx: &ActionContext) -> Result<crate::adapter::AdapterOutcome, crate::adapter::AdapterError> {
            Ok(Default::default())
        }
        async fn webhook(&self, _ctx: &ActionContext) -> Result<crate::adapter::AdapterOutcome, crate::adapter::AdapterError> {
            Ok(Default::default())
        }
        async fn custom(&self, _ctx: &ActionContext) -> Result<crate::adapter::AdapterOutcome, crate::adapter::AdapterError> {
            Ok(Default::default())
        }
    }

    #[tokio::test]
    async fn action_executor_invokes_adapter_once() {
        let adapter = Arc::new(CountingAdapter { calls: AtomicUsize::new(0) });
        let executor = ActionExecutor { adapter: adapter.clone(), timeout: Duration::from_secs(1) };
        let step = Step::new("step_0", StepKind::Action, json!({ "actionType": "send_email", "templateId": "t", "subject": "s", "to": "a@b.com" }));
        let exec = ExecutionRef { execution_id: uuid::Uuid::nil(), context: &json!({}) };
        let result = executor.execute(&step, &exec).await;
        assert!(result.success);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delay_executor_suspends_with_resume_at() {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let executor = DelayExecutor { clock: clock.clone() };
        let step = Step::new("step_1", StepKind::Delay, json!({ "delayType": "1_hour", "delayMs": 3_600_000 }));
        let exec = ExecutionRef { execution_id: uuid::Uuid::nil(), context: &json!({}) };
        let result = executor.execute(&step, &exec).await;
        assert!(result.is_suspended());
    }

    #[tokio::test]
    async fn condition_executor_is_pure_and_extracts_actions_only_when_matched() {
        let executor = ConditionExecutor;
        let step = Step::new(
            "step_2",
            StepKind::Condition,
            json!({
                "conditionType": "product_package",
                "conditionValue": "package_1",
                "operator": "equals",
                "thenActions": [{ "send_email": { "templateId": "upsell" } }],
            }),
        );
        let matching_ctx = json!({ "product_package": "package_1" });
        let exec = ExecutionRef { execution_id: uuid::Uuid::nil(), context: &matching_ctx };
        let result = executor.execute(&step, &exec).await;
        assert_eq!(result.extracted_actions().len(), 1);

        let non_matching_ctx = json!({ "product_package": "package_2" });
        let exec2 = ExecutionRef { execution_id: uuid::Uuid::nil(), context: &non_matching_ctx };
        let result2 = executor.execute(&step, &exec2).await;
        assert_eq!(result2.extracted_actions().len(), 0);
    }
}
