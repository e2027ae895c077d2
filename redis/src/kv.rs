//! Coupon admission primitives, statistics buffers and the JSON cache.

use crate::mem_err;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use storefront_core::coupon::QueuedIssue;
use storefront_core::error::{CommerceError, Result};
use storefront_core::ids::{CouponId, ProductId, UserId};
use storefront_core::keys;
use storefront_core::memstore::{CacheStore, CouponAdmissionStore, StatsBuffer};
use storefront_core::stats::{StatEvent, StatKind};

/// Redis-backed key/value store.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
}

impl RedisKv {
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
}

impl CouponAdmissionStore for RedisKv {
    async fn activate(&self, coupon_id: CouponId, max_quantity: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .set(keys::coupon_max(coupon_id), max_quantity)
            .del(keys::coupon_soldout(coupon_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(())
    }

    async fn max_quantity(&self, coupon_id: CouponId) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        conn.get(keys::coupon_max(coupon_id))
            .await
            .map_err(|e| mem_err(&e))
    }

    async fn is_sold_out(&self, coupon_id: CouponId) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(keys::coupon_soldout(coupon_id))
            .await
            .map_err(|e| mem_err(&e))
    }

    async fn set_sold_out(&self, coupon_id: CouponId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(keys::coupon_soldout(coupon_id), 1_i64)
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(())
    }

    async fn clear_sold_out(&self, coupon_id: CouponId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(keys::coupon_soldout(coupon_id))
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(())
    }

    async fn add_issued(&self, coupon_id: CouponId, user_id: UserId) -> Result<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = conn
            .sadd(keys::coupon_issued_set(coupon_id), user_id.value())
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(added == 1)
    }

    async fn remove_issued(&self, coupon_id: CouponId, user_id: UserId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .srem(keys::coupon_issued_set(coupon_id), user_id.value())
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(())
    }

    async fn increment_counter(&self, coupon_id: CouponId) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.incr(keys::coupon_counter(coupon_id), 1_i64)
            .await
            .map_err(|e| mem_err(&e))
    }

    async fn decrement_counter(&self, coupon_id: CouponId) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.decr(keys::coupon_counter(coupon_id), 1_i64)
            .await
            .map_err(|e| mem_err(&e))
    }

    async fn counter(&self, coupon_id: CouponId) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn
            .get(keys::coupon_counter(coupon_id))
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(value.unwrap_or(0))
    }

    async fn push_queue(&self, coupon_id: CouponId, user_id: UserId, score: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zadd(keys::coupon_queue(coupon_id), user_id.value(), score)
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(())
    }

    async fn pop_queue(&self, coupon_id: CouponId, limit: usize) -> Result<Vec<QueuedIssue>> {
        let mut conn = self.conn.clone();
        #[allow(clippy::cast_possible_wrap)]
        let popped: Vec<(String, f64)> = conn
            .zpopmin(keys::coupon_queue(coupon_id), limit as isize)
            .await
            .map_err(|e| mem_err(&e))?;

        popped
            .into_iter()
            .map(|(member, score)| {
                let user = member.parse::<i64>().map_err(|e| {
                    CommerceError::MemoryStore(format!("bad queue member {member}: {e}"))
                })?;
                Ok(QueuedIssue {
                    user_id: UserId::new(user),
                    score,
                })
            })
            .collect()
    }

    async fn requeue(&self, coupon_id: CouponId, entry: &QueuedIssue) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zadd(
                keys::coupon_queue(coupon_id),
                entry.user_id.value(),
                entry.score,
            )
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(())
    }

    async fn queue_len(&self, coupon_id: CouponId) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.zcard(keys::coupon_queue(coupon_id))
            .await
            .map_err(|e| mem_err(&e))
    }
}

impl StatsBuffer for RedisKv {
    async fn append_log(&self, hour: i64, entry: &StatEvent) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(entry)
            .map_err(|e| CommerceError::Serialization(e.to_string()))?;
        let _: i64 = conn
            .rpush(keys::stat_log(hour), json)
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(())
    }

    async fn bump_counter(&self, kind: StatKind, product_id: ProductId, by: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.incr(keys::stat_counter(kind, product_id), by)
            .await
            .map_err(|e| mem_err(&e))
    }

    async fn realtime_count(&self, kind: StatKind, product_id: ProductId) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn
            .get(keys::stat_counter(kind, product_id))
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(value.unwrap_or(0))
    }

    async fn rotate_log(&self, hour: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        // RENAMENX: atomic, and refuses to clobber a leftover scratch key
        // from a crashed fold.
        let renamed: std::result::Result<i64, redis::RedisError> = redis::cmd("RENAMENX")
            .arg(keys::stat_log(hour))
            .arg(keys::stat_log_scratch(hour))
            .query_async(&mut conn)
            .await;
        match renamed {
            Ok(1) => Ok(true),
            Ok(_) => Ok(false),
            // No log for this hour.
            Err(e) if e.to_string().contains("no such key") => Ok(false),
            Err(e) => Err(mem_err(&e)),
        }
    }

    async fn read_scratch(&self, hour: i64) -> Result<Vec<StatEvent>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(keys::stat_log_scratch(hour), 0, -1)
            .await
            .map_err(|e| mem_err(&e))?;

        let mut entries = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_str::<StatEvent>(&item) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    // A malformed entry must not wedge the fold forever.
                    tracing::warn!(hour, error = %e, "skipping malformed stat log entry");
                }
            }
        }
        Ok(entries)
    }

    async fn discard_scratch(&self, hour: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(keys::stat_log_scratch(hour))
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(())
    }
}

impl CacheStore for RedisKv {
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(|e| mem_err(&e))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| CommerceError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn put_json(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let json =
            serde_json::to_string(value).map_err(|e| CommerceError::Serialization(e.to_string()))?;
        let _: () = conn
            .set_ex(key, json, ttl.as_secs())
            .await
            .map_err(|e| mem_err(&e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await.map_err(|e| mem_err(&e))?;
        Ok(())
    }
}
