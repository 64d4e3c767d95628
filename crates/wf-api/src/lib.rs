//! The Control API (§4.6, §4.9, §6): axum routes over an execution's
//! lifecycle plus queue/health inspection, generic over the `Store`/`Queue`
//! backend so the same router runs against `InMemoryStore` in tests and
//! `PostgresStore` in the shipped binary.

mod cleanup;
mod executions;
mod health;
mod queues;
mod state;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use wf_core::engine::Store;
use wf_core::queue::Queue;

pub use state::{AppState, RetentionConfig};

#[derive(OpenApi)]
#[openapi(
    paths(
        executions::list_executions,
        executions::get_execution,
        executions::start_execution,
        executions::stop_execution,
        executions::pause_execution,
        executions::resume_execution,
        executions::cancel_execution,
        queues::queue_stats,
        cleanup::cleanup,
        health::health,
        health::status,
    ),
    components(schemas(
        wf_schemas::execution::Execution,
        wf_schemas::execution::ExecutionStatus,
        queues::QueueStatsResponse,
        cleanup::CleanupResponse,
        health::HealthResponse,
    )),
    tags(
        (name = "executions", description = "Execution inspection and lifecycle"),
        (name = "queues", description = "Queue depth and dead-letter inspection"),
        (name = "operations", description = "Operator-triggered maintenance"),
        (name = "status", description = "Liveness and status"),
    ),
    info(
        title = "Workflow Engine Control API",
        version = "0.1.0",
        description = "Inspect and operate on workflow executions",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

/// Builds the full Control API router, CORS/trace layers and Swagger UI
/// included, matching `everruns-api::main`'s assembly shape.
pub fn app_router<S: Store, Q: Queue>(state: AppState<S, Q>) -> Router {
    Router::new()
        .merge(health::routes(state.clone()))
        .merge(executions::routes(state.clone()))
        .merge(queues::routes(state.clone()))
        .merge(cleanup::routes(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}
