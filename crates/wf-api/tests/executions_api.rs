//! Black-box Control API tests over `InMemoryStore`/`NoopAdapter` (§8),
//! exercising the lifecycle routes an operator actually calls.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use wf_adapters::LoggingAdapter;
use wf_api::{app_router, AppState};
use wf_core::adapter::NoopSharedFlowInvoker;
use wf_core::clock::SystemClock;
use wf_core::engine::{InMemoryLock, InMemoryQueue, InMemoryStore, Orchestrator};
use wf_core::registry::node::NodeRegistry;
use wf_schemas::execution::{Execution, ExecutionState, ExecutionStatus};
use wf_schemas::step::{Step, StepKind};
use wf_schemas::workflow::WorkflowDefinition;

async fn seed_execution(store: &InMemoryStore) -> Uuid {
    let step = Step::new("step_0", StepKind::End, serde_json::json!({}));
    let workflow = WorkflowDefinition {
        id: Uuid::now_v7(),
        name: "test".into(),
        rule: serde_json::json!({}),
        compiled_steps: vec![step.clone()],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.put_workflow(workflow.clone()).await.unwrap();

    let execution = Execution {
        id: Uuid::now_v7(),
        workflow_id: workflow.id,
        user_id: "user-1".into(),
        trigger_type: "manual".into(),
        trigger_id: "trigger-1".into(),
        current_step: "step_0".into(),
        status: ExecutionStatus::Paused,
        workflow_definition: vec![step],
        state: ExecutionState::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        completed_at: None,
        failed_at: None,
        error: None,
        retry_count: 0,
    };
    let id = execution.id;
    store.create_execution(execution).await.unwrap();
    id
}

fn build_app() -> (axum::Router, Arc<InMemoryStore>, Uuid) {
    let store = Arc::new(InMemoryStore::new());
    let _lock = Arc::new(InMemoryLock::new());
    let _queue = Arc::new(InMemoryQueue::new());
    let registry = Arc::new(NodeRegistry::with_defaults(
        Arc::new(LoggingAdapter::new()),
        Arc::new(SystemClock),
        Arc::new(NoopSharedFlowInvoker),
        std::time::Duration::from_secs(30),
    ));
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), registry, Arc::new(SystemClock)));
    let queue_for_state = Arc::new(InMemoryQueue::new());
    let state = AppState::new(store.clone(), queue_for_state, orchestrator);
    let app = app_router(state);
    (app, store, Uuid::nil())
}

#[tokio::test]
async fn get_missing_execution_returns_404() {
    let (app, _store, _) = build_app();
    let response = app
        .oneshot(Request::builder().uri(format!("/executions/{}", Uuid::now_v7())).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resume_runs_a_paused_execution_to_completion() {
    let (app, store, _) = build_app();
    let id = seed_execution(&store).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/executions/{id}/resume"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let execution: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(execution["status"], "completed");
}

#[tokio::test]
async fn cancel_is_idempotent_against_a_terminal_execution() {
    let (app, store, _) = build_app();
    let id = seed_execution(&store).await;

    let mut execution = store.get_execution(id).await.unwrap();
    execution.status = ExecutionStatus::Completed;
    store.save_execution(&execution).await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/executions/{id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn queue_stats_reports_zeroed_counters_for_an_unused_topic() {
    let (app, _store, _) = build_app();
    let response = app
        .oneshot(Request::builder().uri("/queues/workflow-jobs/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let stats: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["pending"], 0);
}
