//! One scheduler tick: poll every registered trigger type for due rows,
//! enqueue a job per firing, and promote due delays (§4.4, §4.5).
//!
//! Both halves run under their own named lock (`scheduler:triggers` and
//! `scheduler:delays`) so N replicas ticking concurrently never double-fire
//! a trigger or double-promote a delay — losing the race is a normal,
//! silent no-op, not an error.

use std::time::Duration;

use tracing::{debug, warn};
use wf_schemas::prelude::*;
use wf_schemas::trigger::WorkflowJob;

/// Queue priority inferred from trigger type (§4.4 step 3, §6): lower value
/// is consumed first. Unrecognized trigger types fall back to the newsletter
/// priority, the lowest of the three named ones.
fn priority_for_trigger_type(trigger_type: &str) -> i32 {
    match trigger_type {
        "subscription_created" => 1,
        "user_created" => 2,
        _ => 0,
    }
}

use crate::engine::store::{Store, StoreError};
use crate::lock::{with_lock, Lock};
use crate::queue::Queue;
use crate::registry::TriggerRegistry;
use crate::reliability::RetryPolicy;

pub const TRIGGER_LOCK_KEY: &str = "scheduler:triggers";
pub const DELAY_LOCK_KEY: &str = "scheduler:delays";
pub const WORKFLOW_JOB_TOPIC: &str = "workflow-jobs";
pub const DELAY_PROMOTION_TOPIC: &str = "delay-promotions";

#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub triggers_fired: usize,
    pub delays_promoted: usize,
}

pub async fn run_trigger_tick<S, L, Q>(
    store: &S,
    lock: &L,
    queue: &Q,
    triggers: &TriggerRegistry,
    lock_ttl: Duration,
) -> Result<usize, StoreError>
where
    S: Store,
    L: Lock + ?Sized,
    Q: Queue + ?Sized,
{
    let outcome = with_lock(lock, TRIGGER_LOCK_KEY, lock_ttl, || async {
        let mut fired = 0usize;
        for trigger_type in triggers.trigger_types() {
            let Some(poller) = triggers.get(trigger_type) else {
                continue;
            };
            let workflows = store.list_workflows_for_trigger(trigger_type).await?;
            for workflow in workflows {
                let cursor_workflow_id = if poller.uses_global_cursor() {
                    GLOBAL_CURSOR_ID
                } else {
                    workflow.id
                };
                let since = store.get_cursor(cursor_workflow_id, trigger_type).await?;
                let contexts = poller
                    .poll(workflow.id, since, poller.default_batch_size())
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?;

                for ctx in &contexts {
                    if !poller.should_execute(ctx) {
                        continue;
                    }
                    let key = ExecutionKey {
                        workflow_id: ctx.workflow_id,
                        user_id: ctx.user_id.clone(),
                        trigger_type: ctx.trigger_type.clone(),
                        trigger_id: ctx.trigger_id.clone(),
                    };
                    if store.find_active_execution(&key).await?.is_some() {
                        debug!(trigger_id = %ctx.trigger_id, "skipping already-active execution");
                        continue;
                    }
                    let job = WorkflowJob {
                        execution_id: uuid::Uuid::now_v7(),
                        workflow_id: ctx.workflow_id,
                        trigger_type: ctx.trigger_type.clone(),
                        trigger_id: ctx.trigger_id.clone(),
                        user_id: ctx.user_id.clone(),
                        trigger_data: ctx.entity_data.clone(),
                        metadata: ctx.metadata.clone(),
                    };
                    queue
                        .enqueue(
                            WORKFLOW_JOB_TOPIC,
                            serde_json::to_value(&job).unwrap_or_default(),
                            priority_for_trigger_type(&ctx.trigger_type),
                            chrono::Utc::now(),
                            RetryPolicy::queue_default(),
                        )
                        .await
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    fired += 1;
                }
                if !contexts.is_empty() {
                    // Advance to "now", never to a fired row's own timestamp,
                    // so a row with a slightly-behind clock can't be skipped
                    // by a future poll (§9).
                    store.advance_cursor(cursor_workflow_id, trigger_type, chrono::Utc::now()).await?;
                }
            }
        }
        Ok::<usize, StoreError>(fired)
    })
    .await
    .map_err(|e| StoreError::Backend(e.to_string()))?;

    match outcome {
        Some(result) => result,
        None => {
            debug!("trigger tick skipped: lock held by another replica");
            Ok(0)
        }
    }
}

pub async fn run_delay_promotion_tick<S, L, Q>(
    store: &S,
    lock: &L,
    queue: &Q,
    lock_ttl: Duration,
    batch_size: i64,
) -> Result<usize, StoreError>
where
    S: Store,
    L: Lock + ?Sized,
    Q: Queue + ?Sized,
{
    let outcome = with_lock(lock, DELAY_LOCK_KEY, lock_ttl, || async {
        let now = chrono::Utc::now();
        let due = store.claim_due_delays(now, batch_size).await?;
        let count = due.len();
        for delay in due {
            if let Err(err) = queue
                .enqueue(
                    DELAY_PROMOTION_TOPIC,
                    serde_json::to_value(&delay).unwrap_or_default(),
                    10,
                    now,
                    RetryPolicy::queue_default(),
                )
                .await
            {
                warn!(delay_id = %delay.id, %err, "failed to enqueue delay promotion");
            }
        }
        Ok::<usize, StoreError>(count)
    })
    .await
    .map_err(|e| StoreError::Backend(e.to_string()))?;

    match outcome {
        Some(result) => result,
        None => {
            debug!("delay promotion tick skipped: lock held by another replica");
            Ok(0)
        }
    }
}
