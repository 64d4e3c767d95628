//! `GET /queues/:name/stats` (§6): topic depth and dead-letter count.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use wf_core::engine::Store;
use wf_core::queue::{Queue, QueueStats};

use crate::state::AppState;

pub fn routes<S: Store, Q: Queue>(state: AppState<S, Q>) -> Router {
    Router::new().route("/queues/:name/stats", get(queue_stats::<S, Q>)).with_state(state)
}

#[utoipa::path(
    get,
    path = "/queues/{name}/stats",
    params(("name" = String, Path, description = "Queue topic name")),
    responses((status = 200, description = "Queue depth and dead-letter count", body = QueueStatsResponse)),
    tag = "queues"
)]
pub async fn queue_stats<S: Store, Q: Queue>(
    State(state): State<AppState<S, Q>>,
    Path(name): Path<String>,
) -> Result<Json<QueueStatsResponse>, StatusCode> {
    let stats = state.queue.stats(&name).await.map_err(|e| {
        tracing::error!(%e, topic = %name, "failed to fetch queue stats");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(stats.into()))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct QueueStatsResponse {
    pub pending: i64,
    pub claimed: i64,
    pub dead: i64,
}

impl From<QueueStats> for QueueStatsResponse {
    fn from(s: QueueStats) -> Self {
        Self {
            pending: s.pending,
            claimed: s.claimed,
            dead: s.dead,
        }
    }
}
