use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use wf_core::engine::{Orchestrator, Store};
use wf_core::queue::Queue;

/// Shared state for every route, generic over the `Store`/`Queue`
/// implementation so the same router serves both `InMemoryStore`-backed
/// tests and the Postgres-backed binary.
#[derive(Clone)]
pub struct AppState<S: Store, Q: Queue> {
    pub store: Arc<S>,
    pub queue: Arc<Q>,
    pub orchestrator: Arc<Orchestrator<S>>,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub terminal_retention: ChronoDuration,
    pub delay_retention: ChronoDuration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            terminal_retention: ChronoDuration::days(30),
            delay_retention: ChronoDuration::days(30),
        }
    }
}

impl<S: Store, Q: Queue> AppState<S, Q> {
    pub fn new(store: Arc<S>, queue: Arc<Q>, orchestrator: Arc<Orchestrator<S>>) -> Self {
        Self {
            store,
            queue,
            orchestrator,
            retention: RetentionConfig::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }
}
