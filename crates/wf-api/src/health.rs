//! `GET /health` and `GET /status` (§6): a liveness probe and a slightly
//! richer status line, matching the shape of `everruns-api::main::health`.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use wf_core::engine::Store;
use wf_core::queue::Queue;

use crate::state::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub fn routes<S: Store, Q: Queue>(state: AppState<S, Q>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status::<S, Q>))
        .with_state(state)
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)), tag = "status")]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[utoipa::path(get, path = "/status", responses((status = 200, body = HealthResponse)), tag = "status")]
pub async fn status<S: Store, Q: Queue>(State(_state): State<AppState<S, Q>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
