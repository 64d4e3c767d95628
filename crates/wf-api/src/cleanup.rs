//! `POST /cleanup` (§4.7, §6): an operator-triggered retention sweep, the
//! same one the recovery loop runs periodically, exposed for ad-hoc use.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use wf_core::engine::Store;
use wf_core::queue::Queue;
use wf_core::scheduler::recovery::run_retention_sweep;

use crate::state::AppState;

pub fn routes<S: Store, Q: Queue>(state: AppState<S, Q>) -> Router {
    Router::new().route("/cleanup", post(cleanup::<S, Q>)).with_state(state)
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CleanupResponse {
    pub executions_pruned: u64,
    pub delays_pruned: u64,
}

#[utoipa::path(
    post,
    path = "/cleanup",
    responses((status = 200, description = "Retention sweep result", body = CleanupResponse)),
    tag = "operations"
)]
pub async fn cleanup<S: Store, Q: Queue>(
    State(state): State<AppState<S, Q>>,
) -> Result<Json<CleanupResponse>, StatusCode> {
    let (executions_pruned, delays_pruned) = run_retention_sweep(
        state.store.as_ref(),
        state.retention.terminal_retention,
        state.retention.delay_retention,
    )
    .await
    .map_err(|e| {
        tracing::error!(%e, "retention sweep failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(CleanupResponse {
        executions_pruned,
        delays_pruned,
    }))
}
