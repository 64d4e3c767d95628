//! Shared wiring for the `wf-api-server` and `wf-worker` binaries: the
//! environment-driven configuration, matching `RunnerConfig::from_env` /
//! `DurableWorkerConfig::from_env`'s shape in the reference workspace, and
//! the trigger registry both binaries register the same demo pollers into.

pub mod config;
pub mod triggers;
