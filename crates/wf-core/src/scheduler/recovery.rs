//! Startup and periodic recovery sweeps (§4.7): executions stuck `running`
//! past a staleness threshold (crashed worker mid-step) get reset so the
//! next tick's job claim can pick them back up, and old terminal rows /
//! terminal delays are pruned per the retention window.

use chrono::Duration as ChronoDuration;
use tracing::{info, warn};
use wf_schemas::prelude::*;

use crate::engine::store::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub stale_reset: usize,
    pub executions_pruned: u64,
    pub delays_pruned: u64,
}

/// Fails executions whose `updated_at` is older than `stale_after`: a worker
/// that crashed mid-step left the row `running` with no further progress
/// possible, and restart timeout is treated as a terminal failure rather than
/// a silent retry (§4.7).
pub async fn reset_stale_running<S: Store>(store: &S, stale_after: ChronoDuration) -> Result<usize, StoreError> {
    let threshold = chrono::Utc::now() - stale_after;
    let stale = store.list_stale_running(threshold).await?;
    let mut reset = 0usize;
    for mut execution in stale {
        warn!(execution_id = %execution.id, "failing stale running execution: restart timeout");
        execution.status = ExecutionStatus::Failed;
        execution.error = Some("restart timeout".to_string());
        execution.failed_at = Some(chrono::Utc::now());
        execution.updated_at = chrono::Utc::now();
        store.save_execution(&execution).await?;
        reset += 1;
    }
    Ok(reset)
}

pub async fn run_retention_sweep<S: Store>(
    store: &S,
    terminal_retention: ChronoDuration,
    delay_retention: ChronoDuration,
) -> Result<(u64, u64), StoreError> {
    let executions_pruned = store
        .delete_old_terminal_executions(chrono::Utc::now() - terminal_retention)
        .await?;
    let delays_pruned = store.delete_old_delays(chrono::Utc::now() - delay_retention).await?;
    if executions_pruned > 0 || delays_pruned > 0 {
        info!(executions_pruned, delays_pruned, "retention sweep complete");
    }
    Ok((executions_pruned, delays_pruned))
}

pub async fn run_recovery<S: Store>(
    store: &S,
    stale_after: ChronoDuration,
    terminal_retention: ChronoDuration,
    delay_retention: ChronoDuration,
) -> Result<RecoveryReport, StoreError> {
    let stale_reset = reset_stale_running(store, stale_after).await?;
    let (executions_pruned, delays_pruned) = run_retention_sweep(store, terminal_retention, delay_retention).await?;
    Ok(RecoveryReport {
        stale_reset,
        executions_pruned,
        delays_pruned,
    })
}
