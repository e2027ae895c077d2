//! Redis lease locks: SET NX PX with a random owner token, Lua
//! compare-and-delete / compare-and-extend, bounded jittered wait.

use crate::mem_err;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;
use storefront_core::error::{CommerceError, Result};
use storefront_core::lock::{LockLease, LockManager};
use uuid::Uuid;

const RELEASE_SCRIPT: &str = r"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    else
        return 0
    end
";

const EXTEND_SCRIPT: &str = r"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('pexpire', KEYS[1], ARGV[2])
    else
        return 0
    end
";

/// Redis-backed lock manager.
#[derive(Clone)]
pub struct RedisLockManager {
    conn: ConnectionManager,
}

impl RedisLockManager {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::MemoryStore`] when the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| mem_err(&e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let outcome: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
            .query_async(&mut conn)
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(outcome.is_some())
    }
}

impl LockManager for RedisLockManager {
    async fn acquire(&self, key: &str, ttl: Duration, wait_timeout: Duration) -> Result<LockLease> {
        let token = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + wait_timeout;
        let mut backoff = Duration::from_millis(10);

        loop {
            if self.try_acquire(key, &token, ttl).await? {
                return Ok(LockLease {
                    key: key.to_string(),
                    token,
                });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CommerceError::LockTimeout {
                    key: key.to_string(),
                });
            }

            // Jittered exponential backoff keeps competing waiters apart.
            let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() / 2);
            #[allow(clippy::cast_possible_truncation)]
            tokio::time::sleep(backoff + Duration::from_millis(jitter as u64)).await;
            backoff = (backoff * 2).min(Duration::from_millis(200));
        }
    }

    async fn extend(&self, lease: &LockLease, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = Script::new(EXTEND_SCRIPT)
            .key(&lease.key)
            .arg(&lease.token)
            .arg(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(extended == 1)
    }

    async fn release(&self, lease: LockLease) -> Result<()> {
        let mut conn = self.conn.clone();
        let released: i64 = Script::new(RELEASE_SCRIPT)
            .key(&lease.key)
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| mem_err(&e))?;
        if released == 0 {
            // Expired and possibly re-acquired by someone else; the
            // compare-and-delete protected them from us.
            tracing::warn!(key = lease.key.as_str(), "lock lease was already gone at release");
        }
        Ok(())
    }
}
