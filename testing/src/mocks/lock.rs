//! In-memory lease lock manager.
//!
//! Same contract as the Redis implementation (set-if-absent with an owner
//! token, compare-and-delete release, bounded wait with backoff); the TTL is
//! accepted but never enforced, since a test process that dies takes its
//! locks with it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use storefront_core::error::{CommerceError, Result};
use storefront_core::lock::{LockLease, LockManager};
use uuid::Uuid;

/// In-memory lock manager, cheap to clone.
#[derive(Clone, Default)]
pub struct InMemoryLockManager {
    held: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryLockManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn try_acquire(&self, key: &str) -> Option<LockLease> {
        let mut held = self.held.lock();
        if held.contains_key(key) {
            return None;
        }
        let token = Uuid::new_v4().to_string();
        held.insert(key.to_string(), token.clone());
        Some(LockLease {
            key: key.to_string(),
            token,
        })
    }
}

impl LockManager for InMemoryLockManager {
    async fn acquire(
        &self,
        key: &str,
        _ttl: Duration,
        wait_timeout: Duration,
    ) -> Result<LockLease> {
        let deadline = tokio::time::Instant::now() + wait_timeout;
        let mut backoff = Duration::from_millis(1);

        loop {
            if let Some(lease) = self.try_acquire(key) {
                return Ok(lease);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CommerceError::LockTimeout {
                    key: key.to_string(),
                });
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_millis(20));
        }
    }

    async fn extend(&self, lease: &LockLease, _ttl: Duration) -> Result<bool> {
        Ok(self.held.lock().get(&lease.key) == Some(&lease.token))
    }

    async fn release(&self, lease: LockLease) -> Result<()> {
        let mut held = self.held.lock();
        if held.get(&lease.key) == Some(&lease.token) {
            held.remove(&lease.key);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let locks = InMemoryLockManager::new();
        let ttl = Duration::from_secs(10);

        let lease = locks
            .acquire("ecom:lock:pt:1", ttl, Duration::from_millis(10))
            .await
            .unwrap();

        let err = locks
            .acquire("ecom:lock:pt:1", ttl, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LOCK001");

        locks.release(lease).await.unwrap();
        let lease = locks
            .acquire("ecom:lock:pt:1", ttl, Duration::from_millis(10))
            .await
            .unwrap();
        locks.release(lease).await.unwrap();
    }

    #[tokio::test]
    async fn release_with_wrong_token_is_a_noop() {
        let locks = InMemoryLockManager::new();
        let ttl = Duration::from_secs(10);

        let lease = locks
            .acquire("ecom:lock:pt:1", ttl, Duration::from_millis(10))
            .await
            .unwrap();

        locks
            .release(LockLease {
                key: "ecom:lock:pt:1".to_string(),
                token: "stale".to_string(),
            })
            .await
            .unwrap();

        // Still held by the original owner.
        assert!(locks.extend(&lease, ttl).await.unwrap());
        locks.release(lease).await.unwrap();
    }

    #[tokio::test]
    async fn waiters_get_the_lock_once_freed() {
        let locks = InMemoryLockManager::new();
        let ttl = Duration::from_secs(10);
        let lease = locks
            .acquire("ecom:lock:cpn:7", ttl, Duration::from_millis(10))
            .await
            .unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .acquire("ecom:lock:cpn:7", ttl, Duration::from_secs(1))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        locks.release(lease).await.unwrap();

        let lease = waiter.await.unwrap().unwrap();
        locks.release(lease).await.unwrap();
    }
}
