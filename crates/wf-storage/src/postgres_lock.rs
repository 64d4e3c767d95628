//! Postgres-backed cluster lock via a CAS row, not an advisory lock: a plain
//! `UPDATE ... WHERE expires_at < now()` (or insert-if-absent) acquire and a
//! `DELETE ... WHERE holder = $token` release keep the lock visible and
//! inspectable like any other table, and survive a connection drop the
//! moment its TTL lapses rather than needing session-scoped cleanup (§9).

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use wf_core::lock::{Lock, LockError, LockToken};

#[derive(Clone)]
pub struct PostgresLock {
    pool: PgPool,
}

impl PostgresLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Lock for PostgresLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let token = LockToken::new();
        let ttl_secs = ttl.as_secs_f64();

        let row = sqlx::query(
            r#"
            INSERT INTO workflow_locks (key, holder, expires_at)
            VALUES ($1, $2, now() + ($3 || ' seconds')::interval)
            ON CONFLICT (key) DO UPDATE SET
                holder = EXCLUDED.holder,
                expires_at = EXCLUDED.expires_at
            WHERE workflow_locks.expires_at < now()
            RETURNING holder
            "#,
        )
        .bind(key)
        .bind(token.0)
        .bind(ttl_secs.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LockError::Backend(e.to_string()))?;

        match row {
            Some(row) => {
                let holder: uuid::Uuid = row.get("holder");
                Ok((holder == token.0).then_some(token))
            }
            None => Ok(None),
        }
    }

    async fn release(&self, key: &str, token: LockToken) -> Result<(), LockError> {
        sqlx::query("DELETE FROM workflow_locks WHERE key = $1 AND holder = $2")
            .bind(key)
            .bind(token.0)
            .execute(&self.pool)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;
        Ok(())
    }
}
