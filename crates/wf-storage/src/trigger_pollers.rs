//! Concrete [`TriggerPoller`]s over the demo domain tables (§4.5). Each reads
//! rows newer than its cursor, ascending by its own time column, and maps
//! them onto a [`TriggerContext`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use wf_core::registry::{PollError, TriggerPoller};
use wf_schemas::trigger::TriggerContext;

pub struct SubscriptionCreatedPoller {
    pool: PgPool,
}

impl SubscriptionCreatedPoller {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerPoller for SubscriptionCreatedPoller {
    fn trigger_type(&self) -> &'static str {
        "subscription_created"
    }

    async fn poll(
        &self,
        workflow_id: uuid::Uuid,
        cursor: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TriggerContext>, PollError> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.user_id, s.product_package, s.status, s.created_at, u.email
            FROM subscriptions s JOIN users u ON u.id = s.user_id
            WHERE s.created_at >= $1 AND s.workflow_processed = false AND s.status = 'active'
            ORDER BY s.created_at
            LIMIT $2
            "#,
        )
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PollError::Store(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let subscription_id: uuid::Uuid = row.get("id");
                let user_id: uuid::Uuid = row.get("user_id");
                TriggerContext {
                    workflow_id,
                    user_id: user_id.to_string(),
                    trigger_type: self.trigger_type().to_string(),
                    trigger_id: subscription_id.to_string(),
                    entity_data: serde_json::json!({
                        "product_package": row.get::<String, _>("product_package"),
                        "subscription_status": row.get::<String, _>("status"),
                        "email": row.get::<String, _>("email"),
                    }),
                    metadata: serde_json::json!({}),
                }
            })
            .collect())
    }
}

pub struct NewsletterSubscribedPoller {
    pool: PgPool,
}

impl NewsletterSubscribedPoller {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerPoller for NewsletterSubscribedPoller {
    fn trigger_type(&self) -> &'static str {
        "newsletter_subscribed"
    }

    fn default_batch_size(&self) -> i64 {
        15
    }

    async fn poll(
        &self,
        workflow_id: uuid::Uuid,
        cursor: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TriggerContext>, PollError> {
        let rows = sqlx::query(
            r#"
            SELECT n.id, n.user_id, n.subscribed_at, n.status, u.email
            FROM newsletters n JOIN users u ON u.id = n.user_id
            WHERE n.subscribed_at >= $1 AND n.status = 'active'
            ORDER BY n.subscribed_at
            LIMIT $2
            "#,
        )
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PollError::Store(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let newsletter_id: uuid::Uuid = row.get("id");
                let user_id: uuid::Uuid = row.get("user_id");
                TriggerContext {
                    workflow_id,
                    user_id: user_id.to_string(),
                    trigger_type: self.trigger_type().to_string(),
                    trigger_id: newsletter_id.to_string(),
                    entity_data: serde_json::json!({ "email": row.get::<String, _>("email") }),
                    metadata: serde_json::json!({}),
                }
            })
            .collect())
    }
}

pub struct UserCreatedPoller {
    pool: PgPool,
}

impl UserCreatedPoller {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerPoller for UserCreatedPoller {
    fn trigger_type(&self) -> &'static str {
        "user_created"
    }

    /// `user_created` fans out to every workflow registered for it from one
    /// watermark rather than per-workflow, so it uses the reserved global
    /// cursor (§3, §4.5).
    fn uses_global_cursor(&self) -> bool {
        true
    }

    fn default_batch_size(&self) -> i64 {
        20
    }

    fn should_execute(&self, ctx: &TriggerContext) -> bool {
        let domain = ctx
            .entity_data
            .get("email")
            .and_then(|v| v.as_str())
            .and_then(|email| email.rsplit('@').next())
            .unwrap_or_default();
        !wf_core::registry::trigger::is_disposable_email_domain(domain)
    }

    async fn poll(
        &self,
        workflow_id: uuid::Uuid,
        cursor: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TriggerContext>, PollError> {
        let rows = sqlx::query("SELECT id, email, created_at FROM users WHERE created_at > $1 ORDER BY created_at LIMIT $2")
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PollError::Store(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let user_id: uuid::Uuid = row.get("id");
                TriggerContext {
                    workflow_id,
                    user_id: user_id.to_string(),
                    trigger_type: self.trigger_type().to_string(),
                    trigger_id: user_id.to_string(),
                    entity_data: serde_json::json!({ "email": row.get::<String, _>("email") }),
                    metadata: serde_json::json!({}),
                }
            })
            .collect())
    }
}
