pub mod node;
pub mod trigger;

pub use node::{NodeExecutor, NodeRegistry, ValidationResult};
pub use trigger::{PollError, TriggerPoller, TriggerRegistry};
