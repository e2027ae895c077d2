//! Distributed lease locks for cross-process serialization.
//!
//! Locks are acquired by set-if-absent in the memory store with a random
//! owner token and a TTL, and released only if the token still matches
//! (compare-and-delete). [`with_lock`] runs a section under a lock and
//! renews the lease in the background so long-running sections survive the
//! TTL.
//!
//! Lock ordering, to avoid deadlock: (1) distributed lock → (2) balance row
//! lock → (3) order row lock → (4) memory-store counters. Never acquire in
//! reverse.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// An acquired lease: key plus the random owner token that guards release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockLease {
    /// The lock key (`ecom:lock:{domain}:{key}`).
    pub key: String,
    /// Owner token; release and extend only apply while it matches.
    pub token: String,
}

/// Per-key lease locks in the memory store.
pub trait LockManager: Send + Sync {
    /// Acquire `key` with the given TTL, waiting up to `wait_timeout` with
    /// jittered exponential backoff. Fails with
    /// [`CommerceError::LockTimeout`](crate::error::CommerceError) when the
    /// wait budget runs out.
    fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        wait_timeout: Duration,
    ) -> impl Future<Output = Result<LockLease>> + Send;

    /// Extend the lease TTL if the owner token still matches. Returns
    /// `false` when the lease was lost.
    fn extend(
        &self,
        lease: &LockLease,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Release the lease if the owner token still matches
    /// (compare-and-delete). Releasing a lost lease is a no-op.
    fn release(&self, lease: LockLease) -> impl Future<Output = Result<()>> + Send;
}

/// Run `section` under a lock, renewing the lease in the background.
///
/// The lease is renewed every `ttl / 3`; renewal stops when the section
/// finishes. Release failures are logged, not surfaced — the TTL reclaims
/// the lease either way.
///
/// # Errors
///
/// Returns the acquisition error (typically `LockTimeout`) or whatever the
/// section returns.
pub async fn with_lock<L, T, F, Fut>(
    manager: &L,
    key: &str,
    ttl: Duration,
    wait_timeout: Duration,
    section: F,
) -> Result<T>
where
    L: LockManager + Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let lease = manager.acquire(key, ttl, wait_timeout).await?;

    let renewer = {
        let manager = manager.clone();
        let lease = lease.clone();
        let period = ttl / 3;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                match manager.extend(&lease, ttl).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(key = %lease.key, "lock lease lost during renewal");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(key = %lease.key, error = %e, "lock renewal failed");
                        break;
                    }
                }
            }
        })
    };

    let outcome = section().await;

    renewer.abort();
    if let Err(e) = manager.release(lease).await {
        tracing::warn!(key, error = %e, "lock release failed; lease will expire by TTL");
    }

    outcome
}
