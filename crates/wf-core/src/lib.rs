//! Compiler, registries, and durable engine for running compiled workflows
//! to completion across restarts and replicas. Side-effect adapters, the
//! HTTP control surface, and the Postgres-backed `Store`/`Lock`/`Queue`
//! implementations live in their own crates; this one is pure orchestration
//! logic plus the trait seams those crates implement.

pub mod adapter;
pub mod clock;
pub mod compiler;
pub mod engine;
pub mod lock;
pub mod queue;
pub mod registry;
pub mod reliability;
pub mod scheduler;
pub mod worker;

pub mod prelude {
    pub use crate::adapter::{
        noop_adapter, ActionContext, AdapterError, AdapterOutcome, NoopSharedFlowInvoker, NoopSideEffectAdapter, SharedFlowInvoker,
        SideEffectAdapter,
    };
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::compiler::{compile, compile_fragment, rule_for_steps, CompileError};
    pub use crate::engine::{ExecutionFilter, InMemoryStore, Orchestrator, OrchestratorConfig, OrchestratorError, Store, StoreError};
    pub use crate::lock::{Lock, LockError, LockToken};
    pub use crate::queue::{ClaimedJob, JobFailureOutcome, Queue, QueueError, QueueStats};
    pub use crate::registry::{NodeExecutor, NodeRegistry, PollError, TriggerPoller, TriggerRegistry, ValidationResult};
    pub use crate::reliability::RetryPolicy;
    pub use crate::scheduler::{Scheduler, SchedulerConfig};
    pub use crate::worker::{QueueWorker, WorkerConfig};
}
