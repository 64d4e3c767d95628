//! Wires the concrete demo-domain pollers from `wf-storage` into a
//! `TriggerRegistry` (§4.5), shared by both binaries so the scheduler and any
//! future one-shot tooling agree on what triggers exist.

use std::sync::Arc;

use sqlx::PgPool;
use wf_core::registry::TriggerRegistry;
use wf_storage::{NewsletterSubscribedPoller, SubscriptionCreatedPoller, UserCreatedPoller};

pub fn build_registry(pool: PgPool) -> TriggerRegistry {
    let mut registry = TriggerRegistry::new();
    registry.register(Arc::new(SubscriptionCreatedPoller::new(pool.clone())));
    registry.register(Arc::new(NewsletterSubscribedPoller::new(pool.clone())));
    registry.register(Arc::new(UserCreatedPoller::new(pool)));
    registry
}
