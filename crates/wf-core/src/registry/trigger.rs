//! Trigger-type → poller dispatch table (§4.5). Pollers read domain rows
//! from the store and turn them into [`TriggerContext`]s; the concrete
//! Postgres-backed pollers live in `wf-storage` since they need a pool, but
//! the registry and the contract live here so the scheduler only ever talks
//! to `dyn TriggerPoller`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use wf_schemas::trigger::TriggerContext;

use crate::registry::node::ValidationResult;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("store error while polling: {0}")]
    Store(String),
}

#[async_trait]
pub trait TriggerPoller: Send + Sync {
    fn trigger_type(&self) -> &'static str;

    /// Fetch rows newer than `cursor` for `workflow_id`, up to `limit`,
    /// ascending by the trigger's own time column.
    async fn poll(
        &self,
        workflow_id: Uuid,
        cursor: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TriggerContext>, PollError>;

    fn validate(&self, raw: &serde_json::Value) -> ValidationResult {
        if raw.is_object() {
            ValidationResult::ok()
        } else {
            ValidationResult::invalid(vec!["trigger row must be a JSON object".into()])
        }
    }

    /// Whether a context should actually fire a workflow once it passes
    /// `poll` (e.g. `user_created` rejecting disposable email domains).
    fn should_execute(&self, _ctx: &TriggerContext) -> bool {
        true
    }

    /// Whether this trigger type uses the reserved global cursor (§3, §4.5)
    /// instead of a per-workflow one.
    fn uses_global_cursor(&self) -> bool {
        false
    }

    /// Default batch size if not overridden by configuration (§6).
    fn default_batch_size(&self) -> i64 {
        10
    }
}

pub struct TriggerRegistry {
    pollers: HashMap<String, Arc<dyn TriggerPoller>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self {
            pollers: HashMap::new(),
        }
    }

    pub fn register(&mut self, poller: Arc<dyn TriggerPoller>) {
        self.pollers.insert(poller.trigger_type().to_string(), poller);
    }

    pub fn get(&self, trigger_type: &str) -> Option<&Arc<dyn TriggerPoller>> {
        self.pollers.get(trigger_type)
    }

    pub fn trigger_types(&self) -> impl Iterator<Item = &str> {
        self.pollers.keys().map(|s| s.as_str())
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Disposable-email policy used by the `user_created` poller's
/// `should_execute` (§4.5). Deliberately small and explicit rather than a
/// pulled-in denylist crate/service.
const DISPOSABLE_EMAIL_DOMAINS: &[&str] = &[
    "mailinator.com",
    "10minutemail.com",
    "guerrillamail.com",
    "tempmail.com",
    "yopmail.com",
];

pub fn is_disposable_email_domain(domain: &str) -> bool {
    DISPOSABLE_EMAIL_DOMAINS.contains(&domain.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposable_domains_are_flagged_case_insensitively() {
        assert!(is_disposable_email_domain("Mailinator.com"));
        assert!(!is_disposable_email_domain("gmail.com"));
    }
}
