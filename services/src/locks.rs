//! In-process per-user lock table.
//!
//! Serializes same-user operations within one process before the
//! distributed lock is even attempted; `tokio::sync::Mutex` hands the lock
//! to waiters in FIFO order, which is what gives concurrent same-user
//! charges their fairness. Entries are pruned once nobody holds or awaits
//! them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use storefront_core::ids::UserId;
use tokio::sync::OwnedMutexGuard;

/// Process-wide table of per-user async mutexes.
#[derive(Default)]
pub struct UserLockTable {
    entries: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLockTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the user's in-process lock, FIFO among local waiters.
    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let entry = {
            let mut entries = self.entries.lock();
            // Drop idle entries (only the map still references them).
            entries.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(
                entries
                    .entry(user_id.value())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        entry.lock_owned().await
    }

    /// Number of live entries (for tests).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_user_is_serialized() {
        let table = Arc::new(UserLockTable::new());
        let counter = Arc::new(Mutex::new(0_i64));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let table = Arc::clone(&table);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = table.lock(UserId::new(1)).await;
                // Non-atomic read-modify-write; only safe if serialized.
                let current = *counter.lock();
                tokio::task::yield_now().await;
                *counter.lock() = current + 1;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*counter.lock(), 50);
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let table = UserLockTable::new();
        drop(table.lock(UserId::new(1)).await);
        drop(table.lock(UserId::new(2)).await);
        // The next lock call prunes the idle entries before inserting.
        drop(table.lock(UserId::new(3)).await);
        assert!(table.len() <= 2);
    }

    #[tokio::test]
    async fn different_users_do_not_block() {
        let table = Arc::new(UserLockTable::new());
        let guard1 = table.lock(UserId::new(1)).await;
        // A different user's lock must be acquirable immediately.
        let guard2 = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            table.lock(UserId::new(2)),
        )
        .await
        .unwrap();
        drop(guard1);
        drop(guard2);
    }
}
