//! Postgres-backed `Store`, `Lock`, and `Queue` for the workflow engine, plus
//! the concrete `TriggerPoller`s over the shipped demo domain.

mod postgres_lock;
mod postgres_queue;
mod postgres_store;
mod trigger_pollers;

pub use postgres_lock::PostgresLock;
pub use postgres_queue::PostgresQueue;
pub use postgres_store::PostgresStore;
pub use trigger_pollers::{NewsletterSubscribedPoller, SubscriptionCreatedPoller, UserCreatedPoller};
