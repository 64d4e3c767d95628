pub mod memory;
pub mod orchestrator;
pub mod store;

pub use memory::{InMemoryLock, InMemoryQueue, InMemoryStore};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
pub use store::{ExecutionFilter, Store, StoreError};
