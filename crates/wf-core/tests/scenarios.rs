//! Cross-component scenarios (§8.1): `Orchestrator`, `Scheduler`, and the
//! in-memory `Store`/`Lock`/`Queue` driven together rather than in
//! isolation, exercising the properties unit tests colocated with a single
//! module can't: duplicate suppression across two trigger fires, a restart
//! between suspension and resumption, cancellation racing a due delay, and
//! two replicas contending for the same named lock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;
use wf_core::engine::{InMemoryLock, InMemoryQueue};
use wf_core::prelude::*;
use wf_schemas::execution::ExecutionStatus;
use wf_schemas::trigger::TriggerContext;
use wf_schemas::workflow::WorkflowDefinition;

fn workflow_from_rule(rule: serde_json::Value) -> WorkflowDefinition {
    let steps = wf_core::compiler::compile(&rule).unwrap();
    let now = chrono::Utc::now();
    WorkflowDefinition {
        id: Uuid::now_v7(),
        name: "scenario".into(),
        rule,
        compiled_steps: steps,
        created_at: now,
        updated_at: now,
    }
}

fn trigger(workflow_id: Uuid, trigger_id: &str) -> TriggerContext {
    TriggerContext {
        workflow_id,
        user_id: "user-1".into(),
        trigger_type: "subscription_created".into(),
        trigger_id: trigger_id.into(),
        entity_data: json!({ "product_package": "package_1" }),
        metadata: json!({}),
    }
}

fn orchestrator_over(store: Arc<InMemoryStore>, clock: Arc<ManualClock>) -> Orchestrator<InMemoryStore> {
    let registry = Arc::new(NodeRegistry::with_defaults(
        Arc::new(noop_adapter()),
        clock.clone() as Arc<dyn Clock>,
        Arc::new(NoopSharedFlowInvoker),
        Duration::from_secs(5),
    ));
    Orchestrator::new(store, registry, clock as Arc<dyn Clock>)
}

#[tokio::test]
async fn happy_path_runs_to_completion() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let orch = orchestrator_over(store.clone(), clock);

    let rule = json!({ "and": [
        { "send_email": { "templateId": "welcome", "subject": "hi", "to": "a@b.com" } },
        { "end": true },
    ]});
    let workflow = workflow_from_rule(rule);
    store.put_workflow(workflow.clone()).await.unwrap();

    let execution = orch.start_execution(&workflow, &trigger(workflow.id, "t1")).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);

    let persisted = store.get_execution(execution.id).await.unwrap();
    assert_eq!(persisted.status, ExecutionStatus::Completed);
}

/// A second fire for the same natural key while the first is still active
/// must return the existing execution rather than starting a parallel one
/// (SPEC_FULL.md §4.3).
#[tokio::test]
async fn duplicate_trigger_is_suppressed_until_completion() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let orch = orchestrator_over(store.clone(), clock);

    let rule = json!({ "and": [
        { "delay": { "type": "1_hour" } },
        { "end": true },
    ]});
    let workflow = workflow_from_rule(rule);
    store.put_workflow(workflow.clone()).await.unwrap();

    let first = orch.start_execution(&workflow, &trigger(workflow.id, "same-trigger")).await.unwrap();
    assert_eq!(first.status, ExecutionStatus::Delayed);

    let second = orch.start_execution(&workflow, &trigger(workflow.id, "same-trigger")).await.unwrap();
    assert_eq!(second.id, first.id, "duplicate fire must not create a second execution");

    let all = store
        .list_executions(wf_core::engine::ExecutionFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

/// A worker crash between suspending at a delay and the delay firing is
/// simulated by building a brand new `Orchestrator` over the same store
/// (the only state carried across the "restart" is whatever was persisted).
#[tokio::test]
async fn crash_mid_delay_resumes_on_a_fresh_orchestrator() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));

    let rule = json!({ "and": [
        { "send_email": { "templateId": "welcome", "subject": "hi", "to": "a@b.com" } },
        { "delay": { "type": "1_hour" } },
        { "end": true },
    ]});
    let workflow = workflow_from_rule(rule);
    store.put_workflow(workflow.clone()).await.unwrap();

    {
        let orch = orchestrator_over(store.clone(), clock.clone());
        let execution = orch.start_execution(&workflow, &trigger(workflow.id, "t1")).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Delayed);
    }
    // `orch` (and any in-memory-only state it held) is gone here; only `store` survives.

    clock.advance(chrono::Duration::hours(2));
    let delays = store.claim_due_delays(clock.now(), 10).await.unwrap();
    assert_eq!(delays.len(), 1);

    let restarted = orchestrator_over(store.clone(), clock);
    let resumed = restarted.resume_from_delay(delays[0].execution_id, &delays[0]).await.unwrap();
    assert_eq!(resumed.status, ExecutionStatus::Completed);
}

/// Dynamic steps spliced in by a matched condition are reconstructed from
/// the persisted (static-shape-only) row, not trusted from anything saved,
/// surviving the same "fresh orchestrator" restart as the scenario above.
#[tokio::test]
async fn dynamic_reconstruction_survives_a_restart() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));

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
    store.put_workflow(workflow.clone()).await.unwrap();

    let execution_id = {
        let orch = orchestrator_over(store.clone(), clock.clone());
        let execution = orch.start_execution(&workflow, &trigger(workflow.id, "t1")).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Delayed);
        execution.id
    };

    let persisted = store.get_execution(execution_id).await.unwrap();
    assert!(
        persisted.workflow_definition.iter().all(|s| !s.id.contains("_dyn_")),
        "dynamic steps must never be part of the persisted row"
    );

    clock.advance(chrono::Duration::hours(2));
    let delays = store.claim_due_delays(clock.now(), 10).await.unwrap();
    assert_eq!(delays.len(), 1);
    assert!(delays[0].step_id.contains("_dyn_"));

    let restarted = orchestrator_over(store.clone(), clock);
    let resumed = restarted.resume_from_delay(execution_id, &delays[0]).await.unwrap();
    assert_eq!(resumed.status, ExecutionStatus::Completed);
}

/// A delay whose execution was cancelled while it was pending must release
/// as cancelled on promotion, never resuming the orchestrator loop.
#[tokio::test]
async fn cancel_during_delay_releases_without_resuming() {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let orch = orchestrator_over(store.clone(), clock.clone());

    let rule = json!({ "and": [
        { "delay": { "type": "1_hour" } },
        { "send_email": { "templateId": "welcome", "subject": "hi", "to": "a@b.com" } },
        { "end": true },
    ]});
    let workflow = workflow_from_rule(rule);
    store.put_workflow(workflow.clone()).await.unwrap();

    let execution = orch.start_execution(&workflow, &trigger(workflow.id, "t1")).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Delayed);

    let mut execution = store.get_execution(execution.id).await.unwrap();
    execution.status = ExecutionStatus::Cancelled;
    store.save_execution(&execution).await.unwrap();

    clock.advance(chrono::Duration::hours(2));
    let delays = store.claim_due_delays(clock.now(), 10).await.unwrap();
    assert_eq!(delays.len(), 1);

    // Mirrors `worker::process_delay_promotion`'s terminal-status check:
    // a cancelled execution's delay finishes as cancelled, never resumed.
    let reloaded = store.get_execution(delays[0].execution_id).await.unwrap();
    assert!(reloaded.status.is_terminal());
    store
        .finish_delay(delays[0].id, wf_schemas::delay::DelayStatus::Cancelled, None, None)
        .await
        .unwrap();

    let finished = store.get_delay(delays[0].id).await.unwrap();
    assert_eq!(finished.status, wf_schemas::delay::DelayStatus::Cancelled);
}

/// Two replicas racing the same named lock: only one wins a given tick, and
/// the loser can win a later tick once the winner releases (§4.4, §9).
#[tokio::test]
async fn leader_election_only_one_replica_holds_the_lock_per_tick() {
    let lock = Arc::new(InMemoryLock::new());
    let ttl = Duration::from_secs(30);

    let token_a = lock.try_acquire("workflow_scheduler_main", ttl).await.unwrap();
    assert!(token_a.is_some(), "first replica should win the lock");

    let token_b = lock.try_acquire("workflow_scheduler_main", ttl).await.unwrap();
    assert!(token_b.is_none(), "second replica must not win the same tick");

    lock.release("workflow_scheduler_main", token_a.unwrap()).await.unwrap();

    let token_c = lock.try_acquire("workflow_scheduler_main", ttl).await.unwrap();
    assert!(token_c.is_some(), "lock must be available again once released");
}

/// A registered trigger poller fires exactly one workflow job per due row
/// and advances its cursor, end to end through the scheduler's tick.
#[tokio::test]
async fn scheduler_tick_enqueues_a_job_for_a_due_trigger() {
    struct OneShotPoller {
        fired: std::sync::Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl TriggerPoller for OneShotPoller {
        fn trigger_type(&self) -> &'static str {
            "subscription_created"
        }

        async fn poll(
            &self,
            workflow_id: Uuid,
            _cursor: chrono::DateTime<chrono::Utc>,
            _limit: i64,
        ) -> Result<Vec<TriggerContext>, PollError> {
            let mut fired = self.fired.lock().unwrap();
            if *fired {
                return Ok(vec![]);
            }
            *fired = true;
            Ok(vec![TriggerContext {
                workflow_id,
                user_id: "user-1".into(),
                trigger_type: self.trigger_type().to_string(),
                trigger_id: "sub-1".into(),
                entity_data: json!({ "product_package": "package_1" }),
                metadata: json!({}),
            }])
        }
    }

    let store = Arc::new(InMemoryStore::new());
    let lock = Arc::new(InMemoryLock::new());
    let queue = Arc::new(InMemoryQueue::new());

    let rule = json!({ "triggerType": "subscription_created", "and": [{ "end": true }] });
    let workflow = workflow_from_rule(rule);
    store.put_workflow(workflow.clone()).await.unwrap();

    let mut triggers = TriggerRegistry::new();
    triggers.register(Arc::new(OneShotPoller {
        fired: std::sync::Mutex::new(false),
    }));

    let scheduler = Scheduler::new(store.clone(), lock, queue.clone(), Arc::new(triggers), SchedulerConfig::default());
    let outcome = scheduler.tick_once().await.unwrap();
    assert_eq!(outcome.triggers_fired, 1);

    let stats = queue.stats(wf_core::scheduler::WORKFLOW_JOB_TOPIC).await.unwrap();
    assert_eq!(stats.pending, 1);

    // Second tick: the poller has nothing new to report.
    let second = scheduler.tick_once().await.unwrap();
    assert_eq!(second.triggers_fired, 0);
}
