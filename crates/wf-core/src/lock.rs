//! Best-effort, TTL-bounded cluster-wide named mutex (§4.4, §5, §9).
//!
//! Losing a lock is not an error: callers treat `try_acquire` returning
//! `None` as "another replica has it this tick" and move on. Release is
//! always CAS-by-value against the holder token handed back on acquisition,
//! never a bare delete-by-key, so a lock that has already expired and been
//! re-acquired by someone else is never yanked out from under them (§9).

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Opaque proof of ownership returned by `try_acquire`. Only a `release`
/// call presenting the matching token can release the lock early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken(pub Uuid);

impl LockToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
pub trait Lock: Send + Sync + 'static {
    /// Attempt to acquire `key` for `ttl`. Returns `None` (not an error) if
    /// someone else currently holds it.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError>;

    /// Release `key`, but only if `token` is still the current holder.
    /// A mismatch (including "already expired and taken by someone else")
    /// is not an error — it's simply a no-op.
    async fn release(&self, key: &str, token: LockToken) -> Result<(), LockError>;
}

/// Convenience for "acquire, do the work, always release" call sites
/// (the scheduler's main tick and delay-promotion lock, §4.4).
pub async fn with_lock<L, F, Fut, T>(
    lock: &L,
    key: &str,
    ttl: Duration,
    work: F,
) -> Result<Option<T>, LockError>
where
    L: Lock + ?Sized,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    match lock.try_acquire(key, ttl).await? {
        None => Ok(None),
        Some(token) => {
            let result = work().await;
            lock.release(key, token).await?;
            Ok(Some(result))
        }
    }
}
