//! Execution inspection and lifecycle routes (§4.6): list with filters, fetch
//! one, and drive `start | stop | pause | resume | cancel`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use wf_core::engine::{ExecutionFilter, Store};
use wf_core::queue::Queue;
use wf_schemas::execution::{Execution, ExecutionStatus};

use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListExecutionsParams {
    pub workflow_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub trigger_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

pub fn routes<S: Store, Q: Queue>(state: AppState<S, Q>) -> Router {
    Router::new()
        .route("/executions", get(list_executions::<S, Q>))
        .route("/executions/:id", get(get_execution::<S, Q>))
        .route("/executions/:id/start", post(start_execution::<S, Q>))
        .route("/executions/:id/stop", post(stop_execution::<S, Q>))
        .route("/executions/:id/pause", post(pause_execution::<S, Q>))
        .route("/executions/:id/resume", post(resume_execution::<S, Q>))
        .route("/executions/:id/cancel", post(cancel_execution::<S, Q>))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/executions",
    params(ListExecutionsParams),
    responses((status = 200, description = "Matching executions", body = Vec<Execution>)),
    tag = "executions"
)]
pub async fn list_executions<S: Store, Q: Queue>(
    State(state): State<AppState<S, Q>>,
    Query(params): Query<ListExecutionsParams>,
) -> Result<Json<Vec<Execution>>, StatusCode> {
    let filter = ExecutionFilter {
        workflow_id: params.workflow_id,
        user_id: params.user_id,
        status: params.status,
        trigger_type: params.trigger_type,
        limit: params.limit,
        offset: params.offset,
    };
    let executions = state.store.list_executions(filter).await.map_err(|e| {
        tracing::error!(%e, "failed to list executions");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(executions))
}

#[utoipa::path(
    get,
    path = "/executions/{id}",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Execution found", body = Execution),
        (status = 404, description = "Execution not found"),
    ),
    tag = "executions"
)]
pub async fn get_execution<S: Store, Q: Queue>(
    State(state): State<AppState<S, Q>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Execution>, StatusCode> {
    let execution = state.store.get_execution(id).await.map_err(not_found_or_500)?;
    Ok(Json(execution))
}

#[utoipa::path(
    post,
    path = "/executions/{id}/start",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses((status = 200, description = "Execution is running", body = Execution)),
    tag = "executions"
)]
pub async fn start_execution<S: Store, Q: Queue>(
    State(state): State<AppState<S, Q>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Execution>, StatusCode> {
    // `pending -> running` is the same loop re-entry as resuming a paused
    // execution (§4.6); the orchestrator's `resume` already runs `current_step`
    // forward regardless of which non-terminal status it started from.
    let execution = state.orchestrator.resume(id).await.map_err(orchestrator_err)?;
    Ok(Json(execution))
}

#[utoipa::path(
    post,
    path = "/executions/{id}/stop",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses((status = 200, description = "Execution cancelled", body = Execution)),
    tag = "executions"
)]
pub async fn stop_execution<S: Store, Q: Queue>(
    State(state): State<AppState<S, Q>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Execution>, StatusCode> {
    let execution = state.orchestrator.stop(id).await.map_err(orchestrator_err)?;
    Ok(Json(execution))
}

#[utoipa::path(
    post,
    path = "/executions/{id}/pause",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses((status = 200, description = "Execution paused", body = Execution)),
    tag = "executions"
)]
pub async fn pause_execution<S: Store, Q: Queue>(
    State(state): State<AppState<S, Q>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Execution>, StatusCode> {
    let execution = state.orchestrator.pause(id).await.map_err(orchestrator_err)?;
    Ok(Json(execution))
}

#[utoipa::path(
    post,
    path = "/executions/{id}/resume",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses((status = 200, description = "Execution resumed", body = Execution)),
    tag = "executions"
)]
pub async fn resume_execution<S: Store, Q: Queue>(
    State(state): State<AppState<S, Q>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Execution>, StatusCode> {
    let execution = state.orchestrator.resume(id).await.map_err(orchestrator_err)?;
    Ok(Json(execution))
}

#[utoipa::path(
    post,
    path = "/executions/{id}/cancel",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses((status = 200, description = "Execution cancelled", body = Execution)),
    tag = "executions"
)]
pub async fn cancel_execution<S: Store, Q: Queue>(
    State(state): State<AppState<S, Q>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Execution>, StatusCode> {
    let execution = state.orchestrator.cancel(id).await.map_err(orchestrator_err)?;
    Ok(Json(execution))
}

fn not_found_or_500(err: wf_core::engine::StoreError) -> StatusCode {
    match err {
        wf_core::engine::StoreError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
        e => {
            tracing::error!(%e, "store error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn orchestrator_err(err: wf_core::engine::OrchestratorError) -> StatusCode {
    use wf_core::engine::OrchestratorError;
    match err {
        OrchestratorError::Store(wf_core::engine::StoreError::ExecutionNotFound(_)) => StatusCode::NOT_FOUND,
        e => {
            tracing::error!(%e, "orchestrator error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
