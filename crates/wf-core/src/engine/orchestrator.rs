//! Advances one [`Execution`] through its compiled steps, suspending at
//! delays and resuming after restarts (§4.3). Grounded on `durable`'s
//! `WorkflowExecutor` step loop, generalized from replaying an event log to
//! mutating a directly-persisted `state.context`/`state.history` pair.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;
use wf_schemas::prelude::*;

use crate::clock::Clock;
use crate::compiler::compile_fragment;
use crate::engine::store::{Store, StoreError};
use crate::registry::node::{ExecutionRef, NodeRegistry};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no executor registered for step kind {0:?}")]
    MissingExecutor(StepKind),
    #[error("step not found: {0}")]
    StepNotFound(String),
    #[error("execution {0} is terminal and cannot be advanced")]
    AlreadyTerminal(Uuid),
    #[error("execution {0} is not delayed")]
    NotDelayed(Uuid),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard cap on steps run in one call, so a miscompiled cyclic `next`
    /// cannot spin the worker forever (§7).
    pub max_steps_per_run: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_steps_per_run: 1_000 }
    }
}

pub struct Orchestrator<S: Store> {
    store: Arc<S>,
    registry: Arc<NodeRegistry>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl<S: Store> Orchestrator<S> {
    pub fn new(store: Arc<S>, registry: Arc<NodeRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            registry,
            clock,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Create and run a fresh execution from a fired trigger (§4.3 steps 1-6).
    /// Returns the execution in whatever state it settled into: `completed`,
    /// `failed`, or `delayed` (suspended on a pending `Delay` row).
    pub async fn start_execution(
        &self,
        workflow: &WorkflowDefinition,
        trigger: &TriggerContext,
    ) -> Result<Execution, OrchestratorError> {
        let key = ExecutionKey {
            workflow_id: workflow.id,
            user_id: trigger.user_id.clone(),
            trigger_type: trigger.trigger_type.clone(),
            trigger_id: trigger.trigger_id.clone(),
        };
        if let Some(existing) = self.store.find_active_execution(&key).await? {
            return Ok(existing);
        }

        let now = self.clock.now();
        let first_step = workflow.compiled_steps.first().map(|s| s.id.clone()).unwrap_or_default();
        let execution = Execution {
            id: Uuid::now_v7(),
            workflow_id: workflow.id,
            user_id: trigger.user_id.clone(),
            trigger_type: trigger.trigger_type.clone(),
            trigger_id: trigger.trigger_id.clone(),
            current_step: first_step,
            status: ExecutionStatus::Running,
            workflow_definition: workflow.compiled_steps.clone(),
            state: ExecutionState {
                current_state: Value::Null,
                context: build_initial_context(trigger),
                history: vec![],
                shared_flows: vec![],
            },
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            error: None,
            retry_count: 0,
        };
        self.store.create_execution(execution.clone()).await?;
        self.run_from(execution).await
    }

    /// Resume an execution whose `Delay` has just been promoted (§4.4). The
    /// execution's `current_step` is the delay step id; this reconstructs any
    /// dynamic steps that preceded it, merges the delay's carried context, and
    /// continues the loop from the delay's `next`.
    pub async fn resume_from_delay(&self, execution_id: Uuid, delay: &Delay) -> Result<Execution, OrchestratorError> {
        let mut execution = self.store.get_execution(execution_id).await?;
        if execution.status.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal(execution_id));
        }

        merge_context_into(&mut execution.state.context, &delay.context);
        self.reconstruct_dynamic_steps(&mut execution, &delay.step_id).await?;

        if let Some(entry) = execution
            .state
            .history
            .iter_mut()
            .rev()
            .find(|h| h.step_id == delay.step_id && h.state == HistoryState::Suspended)
        {
            entry.state = HistoryState::Completed;
            entry.result = delay.result.clone();
        }

        execution.status = ExecutionStatus::Running;
        let next = execution
            .step_by_id(&delay.step_id)
            .and_then(|s| s.next.first())
            .cloned();
        execution.current_step = next.unwrap_or_default();
        self.persist(&execution).await?;

        if execution.current_step.is_empty() {
            return self.finish(execution, ExecutionStatus::Completed, None).await;
        }
        self.run_from(execution).await
    }

    /// If `step_id` is a `..._dyn_<n>` id not present in `workflow_definition`,
    /// re-evaluates the originating condition step's executor against the
    /// restored context and splices back only the fragment from position `n`
    /// onward — the steps before it already ran on the prior run and are
    /// never looked up again. This is the only place dynamic-shape workflows
    /// get reconstituted after a restart: only the statically compiled shape
    /// is ever persisted (§9 decision), so the condition's predicate is
    /// re-run rather than trusted from anything saved.
    async fn reconstruct_dynamic_steps(&self, execution: &mut Execution, step_id: &str) -> Result<(), OrchestratorError> {
        if execution.step_by_id(step_id).is_some() {
            return Ok(());
        }
        let Some((origin_id, suffix)) = step_id.rsplit_once("_dyn_") else {
            return Err(OrchestratorError::StepNotFound(step_id.to_string()));
        };
        let from_index: usize = suffix.parse().unwrap_or(0);
        let origin = execution
            .step_by_id(origin_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::StepNotFound(origin_id.to_string()))?;

        let executor = self
            .registry
            .get(origin.kind)
            .ok_or(OrchestratorError::MissingExecutor(origin.kind))?
            .clone();
        let result = {
            let exec_ref = ExecutionRef {
                execution_id: execution.id,
                context: &execution.state.context,
            };
            executor.execute(&origin, &exec_ref).await
        };
        let extracted = result.extracted_actions();
        if extracted.is_empty() {
            return Err(OrchestratorError::StepNotFound(step_id.to_string()));
        }

        let fragment = compile_fragment(&extracted, origin_id)
            .map_err(|e| OrchestratorError::Store(StoreError::Backend(e.to_string())))?;
        for step in fragment.into_iter().skip(from_index) {
            if execution.step_by_id(&step.id).is_none() {
                execution.workflow_definition.push(step);
            }
        }
        Ok(())
    }

    /// Dynamic steps spliced in by a matched condition (`_dyn_` ids) are kept
    /// only in the in-memory run, never saved: the persisted row always
    /// reflects just the statically compiled shape, recomputed on demand by
    /// `reconstruct_dynamic_steps` (§4.3, §9).
    async fn persist(&self, execution: &Execution) -> Result<(), OrchestratorError> {
        if execution.workflow_definition.iter().any(|s| s.id.contains("_dyn_")) {
            let mut durable = execution.clone();
            durable.workflow_definition.retain(|s| !s.id.contains("_dyn_"));
            self.store.save_execution(&durable).await?;
        } else {
            self.store.save_execution(execution).await?;
        }
        Ok(())
    }

    /// The step-execution loop proper: run `execution.current_step` and
    /// whatever follows until completion, failure, or suspension.
    async fn run_from(&self, mut execution: Execution) -> Result<Execution, OrchestratorError> {
        for _ in 0..self.config.max_steps_per_run {
            if execution.current_step.is_empty() {
                return self.finish(execution, ExecutionStatus::Completed, None).await;
            }

            let step_id = execution.current_step.clone();
            self.reconstruct_dynamic_steps(&mut execution, &step_id).await?;
            let step = execution
                .step_by_id(&step_id)
                .cloned()
                .ok_or_else(|| OrchestratorError::StepNotFound(step_id.clone()))?;

            let executor = self
                .registry
                .get(step.kind)
                .ok_or(OrchestratorError::MissingExecutor(step.kind))?
                .clone();

            let exec_ref = ExecutionRef {
                execution_id: execution.id,
                context: &execution.state.context,
            };
            let result = executor.execute(&step, &exec_ref).await;

            if !result.success {
                let error = result.error.clone().unwrap_or_else(|| "step failed".into());
                execution.state.history.push(HistoryEntry {
                    step_id: step.id.clone(),
                    state: HistoryState::Failed,
                    timestamp: self.clock.now(),
                    result: None,
                    error: Some(error.clone()),
                });
                return self.finish(execution, ExecutionStatus::Failed, Some(error)).await;
            }

            if result.is_suspended() {
                let resume_at = result
                    .metadata
                    .as_ref()
                    .and_then(|m| m.resume_at)
                    .unwrap_or_else(|| self.clock.now());
                let delay = Delay {
                    id: Uuid::now_v7(),
                    execution_id: execution.id,
                    step_id: step.id.clone(),
                    delay_type: step
                        .data
                        .get("delayType")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    delay_ms: step.data.get("delayMs").and_then(|v| v.as_i64()).unwrap_or(0),
                    scheduled_at: self.clock.now(),
                    execute_at: resume_at,
                    status: DelayStatus::Pending,
                    context: execution.state.context.clone(),
                    result: None,
                    error: None,
                    retry_count: 0,
                    executed_at: None,
                };
                self.store.create_delay(delay).await?;

                execution.state.history.push(HistoryEntry {
                    step_id: step.id.clone(),
                    state: HistoryState::Suspended,
                    timestamp: self.clock.now(),
                    result: None,
                    error: None,
                });
                execution.status = ExecutionStatus::Delayed;
                execution.updated_at = self.clock.now();
                self.persist(&execution).await?;
                return Ok(execution);
            }

            if let Some(extra) = merge_extracted_actions(&mut execution, &step, &result) {
                execution.current_step = extra;
            } else {
                execution.current_step = result
                    .next_steps
                    .clone()
                    .or_else(|| Some(step.next.clone()))
                    .and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) })
                    .unwrap_or_default();
            }

            execution.state.history.push(HistoryEntry {
                step_id: step.id.clone(),
                state: HistoryState::Completed,
                timestamp: self.clock.now(),
                result: result.result.clone(),
                error: None,
            });
            merge_step_result_into_context(&mut execution.state.context, &step, &result);
            execution.updated_at = self.clock.now();
            self.persist(&execution).await?;
        }
        Err(OrchestratorError::Store(StoreError::Backend(format!(
            "execution {} exceeded max_steps_per_run",
            execution.id
        ))))
    }

    async fn finish(
        &self,
        mut execution: Execution,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<Execution, OrchestratorError> {
        let now = self.clock.now();
        execution.status = status;
        execution.updated_at = now;
        execution.error = error;
        match status {
            ExecutionStatus::Completed => execution.completed_at = Some(now),
            ExecutionStatus::Failed => execution.failed_at = Some(now),
            _ => {}
        }
        self.persist(&execution).await?;
        Ok(execution)
    }

    // -- control operations (§4.6) ------------------------------------------

    pub async fn pause(&self, execution_id: Uuid) -> Result<Execution, OrchestratorError> {
        let mut execution = self.store.get_execution(execution_id).await?;
        if execution.status.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal(execution_id));
        }
        execution.status = ExecutionStatus::Paused;
        execution.updated_at = self.clock.now();
        self.persist(&execution).await?;
        Ok(execution)
    }

    /// Resuming a paused, non-delayed execution re-enters the step loop
    /// directly; a paused-while-delayed execution simply waits for its
    /// existing `Delay` row to be promoted normally (§4.6 decision: delay
    /// promotion always forces status back to `running`, so pausing never
    /// strands an execution).
    pub async fn resume(&self, execution_id: Uuid) -> Result<Execution, OrchestratorError> {
        let mut execution = self.store.get_execution(execution_id).await?;
        if execution.status.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal(execution_id));
        }
        if execution.status == ExecutionStatus::Delayed {
            return Ok(execution);
        }
        execution.status = ExecutionStatus::Running;
        execution.updated_at = self.clock.now();
        self.persist(&execution).await?;
        self.run_from(execution).await
    }

    pub async fn cancel(&self, execution_id: Uuid) -> Result<Execution, OrchestratorError> {
        let execution = self.store.get_execution(execution_id).await?;
        if execution.status.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal(execution_id));
        }
        self.store.cancel_future_delays(execution_id).await?;
        self.finish(execution, ExecutionStatus::Cancelled, None).await
    }

    /// `stop` is an operator-facing alias for `cancel` used by the Control
    /// API's `/executions/:id/stop` (§6) — same effect, different intent.
    pub async fn stop(&self, execution_id: Uuid) -> Result<Execution, OrchestratorError> {
        self.cancel(execution_id).await
    }
}

fn build_initial_context(trigger: &TriggerContext) -> Value {
    json!({
        "data": trigger.entity_data,
        "metadata": trigger.metadata,
        "triggerType": trigger.trigger_type,
        "triggerId": trigger.trigger_id,
        "userId": trigger.user_id,
    })
}

/// Shallow-merges `patch` (a delay's carried context, or a step's own result)
/// onto `context`'s top-level object keys. Non-object inputs are ignored.
fn merge_context_into(context: &mut Value, patch: &Value) {
    let (Value::Object(ctx_map), Value::Object(patch_map)) = (context, patch) else {
        return;
    };
    for (k, v) in patch_map {
        ctx_map.insert(k.clone(), v.clone());
    }
}

fn merge_step_result_into_context(context: &mut Value, step: &Step, result: &StepResult) {
    if step.kind != StepKind::Action {
        return;
    }
    if let Some(result_value) = &result.result {
        if let Value::Object(ctx_map) = context {
            ctx_map
                .entry("lastActionResult")
                .or_insert_with(|| Value::Object(Default::default()));
            ctx_map.insert("lastActionResult".to_string(), result_value.clone());
        }
    }
}

/// When a condition step matched and extracted `thenActions`, those clauses
/// get compiled and spliced in right after it, and the loop continues onto
/// the first of them instead of the condition's own static `next`. Returns
/// `None` when there is nothing to splice (no match, or no `thenActions`).
fn merge_extracted_actions(execution: &mut Execution, step: &Step, result: &StepResult) -> Option<String> {
    if step.kind != StepKind::Condition {
        return None;
    }
    let extracted = result.extracted_actions();
    if extracted.is_empty() {
        return None;
    }
    let fragment = compile_fragment(&extracted, &step.id).ok()?;
    let first_id = fragment.first()?.id.clone();
    for s in fragment {
        if execution.step_by_id(&s.id).is_none() {
            execution.workflow_definition.push(s);
        }
    }
    Some(first_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{noop_adapter, NoopSharedFlowInvoker};
    use crate::engine::memory::InMemoryStore;
    use crate::registry::node::NodeRegistry;

    fn workflow_from_rule(rule: Value) -> WorkflowDefinition {
        let steps = crate::compiler::compile(&rule).unwrap();
        let now = Utc::now();
        WorkflowDefinition {
            id: Uuid::now_v7(),
            name: "test".into(),
            rule,
            compiled_steps: steps,
            created_at: now,
            updated_at: now,
        }
    }

    fn trigger(workflow_id: Uuid) -> TriggerContext {
        TriggerContext {
            workflow_id,
            user_id: "user-1".into(),
            trigger_type: "subscription_created".into(),
            trigger_id: "trig-1".into(),
            entity_data: json!({ "product_package": "package_1" }),
            metadata: json!({}),
        }
    }

    async fn orchestrator() -> (Orchestrator<InMemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(NodeRegistry::with_defaults(
            Arc::new(noop_adapter()),
            clock.clone() as Arc<dyn Clock>,
            Arc::new(NoopSharedFlowInvoker),
            Duration::from_secs(5),
        ));
        (Orchestrator::new(store, registry, clock.clone() as Arc<dyn Clock>), clock)
    }

    #[tokio::test]
    async fn runs_to_completion_without_delays() {
        let (orch, _clock) = orchestrator().await;
        let rule = json!({ "and": [
            { "send_email": { "templateId": "welcome", "subject": "hi", "to": "a@b.com" } },
            { "end": true },
        ]});
        let workflow = workflow_from_rule(rule);
        let execution = orch.start_execution(&workflow, &trigger(workflow.id)).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn suspends_at_delay_and_resumes_via_promotion() {
        use crate::clock::Clock as _;
        let (orch, clock) = orchestrator().await;
        let rule = json!({ "and": [
            { "send_email": { "templateId": "welcome", "subject": "hi", "to": "a@b.com" } },
            { "delay": { "type": "1_hour" } },
            { "end": true },
        ]});
        let workflow = workflow_from_rule(rule);
        let execution = orch.start_execution(&workflow, &trigger(workflow.id)).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Delayed);

        clock.advance(chrono::Duration::hours(2));
        let delays = orch
            .store
            .claim_due_delays(clock.now(), 10)
            .await
            .unwrap();
        assert_eq!(delays.len(), 1);
        let resumed = orch.resume_from_delay(execution.id, &delays[0]).await.unwrap();
        assert_eq!(resumed.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn condition_match_splices_dynamic_then_actions() {
        let (orch, _clock) = orchestrator().await;
        let rule = json!({ "and": [
            {
                "condition": { "field": "product_package", "value": "package_1" },
                "then": [
                    { "send_email": { "templateId": "upsell", "subject": "hi", "to": "a@b.com" } },
                ],
            },
            { "end": true },
        ]});
        let workflow = workflow_from_rule(rule);
        let execution = orch.start_execution(&workflow, &trigger(workflow.id)).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(execution.workflow_definition.iter().any(|s| s.id.contains("_dyn_")));
    }

    #[tokio::test]
    async fn dynamic_steps_are_reconstructed_after_restart_not_persisted() {
        let (orch, clock) = orchestrator().await;
        let rule = json!({ "and": [
            {
                "condition": { "field": "product_package", "value": "package_1" },
                "then": [
                    { "send_email": { "templateId": "upsell", "subject": "hi", "to": "a@b.com" } },
                    { "delay": { "type": "1_hour" } },
                    { "end": true },
                ],
            },
            { "end": true },
        ]});
        let workflow = workflow_from_rule(rule);
        let execution = orch.start_execution(&workflow, &trigger(workflow.id)).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Delayed);

        // The persisted row never carries the spliced dynamic steps (§4.3, §9).
        let persisted = orch.store.get_execution(execution.id).await.unwrap();
        assert!(persisted.workflow_definition.iter().all(|s| !s.id.contains("_dyn_")));

        clock.advance(chrono::Duration::hours(2));
        let delays = orch.store.claim_due_delays(clock.now(), 10).await.unwrap();
        assert_eq!(delays.len(), 1);
        assert!(delays[0].step_id.contains("_dyn_"));

        // Resuming re-derives the dynamic fragment by re-running the origin
        // condition's executor against the restored context, not from
        // anything persisted.
        let resumed = orch.resume_from_delay(execution.id, &delays[0]).await.unwrap();
        assert_eq!(resumed.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn pause_then_resume_continues_from_current_step() {
        let (orch, _clock) = orchestrator().await;
        let rule = json!({ "and": [
            { "send_email": { "templateId": "welcome", "subject": "hi", "to": "a@b.com" } },
            { "end": true },
        ]});
        let workflow = workflow_from_rule(rule);
        let execution = orch.start_execution(&workflow, &trigger(workflow.id)).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);

        // Pausing/cancelling an already-terminal execution is rejected (§4.6).
        assert!(orch.pause(execution.id).await.is_err());
    }
}
