//! In-memory implementation of the memory-store seams: coupon admission
//! primitives, statistics buffers and the JSON cache.
//!
//! Single mutex, so each primitive is atomic exactly like its Redis
//! counterpart (SADD / INCR / ZADD / RENAME).

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use storefront_core::coupon::QueuedIssue;
use storefront_core::error::Result;
use storefront_core::ids::{CouponId, ProductId, UserId};
use storefront_core::memstore::{CacheStore, CouponAdmissionStore, StatsBuffer};
use storefront_core::stats::{StatEvent, StatKind};

struct AdmissionState {
    max_quantity: Option<i64>,
    sold_out: bool,
    issued: HashSet<i64>,
    counter: i64,
    // (entry, seq) — seq breaks score ties deterministically. Fresh pushes
    // count up from zero; re-queued entries count up from a far-negative
    // base so they sort ahead of same-score newcomers in their original
    // relative order.
    queue: Vec<(QueuedIssue, i64)>,
    queue_seq: i64,
    requeue_seq: i64,
}

impl Default for AdmissionState {
    fn default() -> Self {
        Self {
            max_quantity: None,
            sold_out: false,
            issued: HashSet::new(),
            counter: 0,
            queue: Vec::new(),
            queue_seq: 0,
            requeue_seq: i64::MIN / 2,
        }
    }
}

#[derive(Default)]
struct KvInner {
    admissions: HashMap<i64, AdmissionState>,
    logs: HashMap<i64, Vec<StatEvent>>,
    scratch: HashMap<i64, Vec<StatEvent>>,
    counters: HashMap<(StatKind, i64), i64>,
    cache: HashMap<String, serde_json::Value>,
}

/// Cheap-to-clone in-memory key/value store.
#[derive(Clone, Default)]
pub struct MemoryKv {
    inner: Arc<Mutex<KvInner>>,
}

impl MemoryKv {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached keys (for assertions).
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.inner.lock().cache.len()
    }
}

impl CouponAdmissionStore for MemoryKv {
    async fn activate(&self, coupon_id: CouponId, max_quantity: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        let state = inner.admissions.entry(coupon_id.value()).or_default();
        state.max_quantity = Some(max_quantity);
        state.sold_out = false;
        Ok(())
    }

    async fn max_quantity(&self, coupon_id: CouponId) -> Result<Option<i64>> {
        let inner = self.inner.lock();
        Ok(inner
            .admissions
            .get(&coupon_id.value())
            .and_then(|s| s.max_quantity))
    }

    async fn is_sold_out(&self, coupon_id: CouponId) -> Result<bool> {
        let inner = self.inner.lock();
        Ok(inner
            .admissions
            .get(&coupon_id.value())
            .is_some_and(|s| s.sold_out))
    }

    async fn set_sold_out(&self, coupon_id: CouponId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.admissions.entry(coupon_id.value()).or_default().sold_out = true;
        Ok(())
    }

    async fn clear_sold_out(&self, coupon_id: CouponId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.admissions.entry(coupon_id.value()).or_default().sold_out = false;
        Ok(())
    }

    async fn add_issued(&self, coupon_id: CouponId, user_id: UserId) -> Result<bool> {
        let mut inner = self.inner.lock();
        Ok(inner
            .admissions
            .entry(coupon_id.value())
            .or_default()
            .issued
            .insert(user_id.value()))
    }

    async fn remove_issued(&self, coupon_id: CouponId, user_id: UserId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .admissions
            .entry(coupon_id.value())
            .or_default()
            .issued
            .remove(&user_id.value());
        Ok(())
    }

    async fn increment_counter(&self, coupon_id: CouponId) -> Result<i64> {
        let mut inner = self.inner.lock();
        let state = inner.admissions.entry(coupon_id.value()).or_default();
        state.counter += 1;
        Ok(state.counter)
    }

    async fn decrement_counter(&self, coupon_id: CouponId) -> Result<i64> {
        let mut inner = self.inner.lock();
        let state = inner.admissions.entry(coupon_id.value()).or_default();
        state.counter -= 1;
        Ok(state.counter)
    }

    async fn counter(&self, coupon_id: CouponId) -> Result<i64> {
        let inner = self.inner.lock();
        Ok(inner
            .admissions
            .get(&coupon_id.value())
            .map_or(0, |s| s.counter))
    }

    async fn push_queue(&self, coupon_id: CouponId, user_id: UserId, score: f64) -> Result<()> {
        let mut inner = self.inner.lock();
        let state = inner.admissions.entry(coupon_id.value()).or_default();
        state.queue_seq += 1;
        let seq = state.queue_seq;
        state.queue.push((QueuedIssue { user_id, score }, seq));
        Ok(())
    }

    async fn pop_queue(&self, coupon_id: CouponId, limit: usize) -> Result<Vec<QueuedIssue>> {
        let mut inner = self.inner.lock();
        let state = inner.admissions.entry(coupon_id.value()).or_default();
        state.queue.sort_by(|(a, sa), (b, sb)| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| sa.cmp(sb))
        });
        let take = limit.min(state.queue.len());
        Ok(state
            .queue
            .drain(..take)
            .map(|(entry, _)| entry)
            .collect())
    }

    async fn requeue(&self, coupon_id: CouponId, entry: &QueuedIssue) -> Result<()> {
        let mut inner = self.inner.lock();
        let state = inner.admissions.entry(coupon_id.value()).or_default();
        state.requeue_seq += 1;
        let seq = state.requeue_seq;
        state.queue.push((entry.clone(), seq));
        Ok(())
    }

    async fn queue_len(&self, coupon_id: CouponId) -> Result<i64> {
        let inner = self.inner.lock();
        Ok(inner
            .admissions
            .get(&coupon_id.value())
            .map_or(0, |s| s.queue.len() as i64))
    }
}

impl StatsBuffer for MemoryKv {
    async fn append_log(&self, hour: i64, entry: &StatEvent) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.logs.entry(hour).or_default().push(entry.clone());
        Ok(())
    }

    async fn bump_counter(&self, kind: StatKind, product_id: ProductId, by: i64) -> Result<i64> {
        let mut inner = self.inner.lock();
        let counter = inner.counters.entry((kind, product_id.value())).or_insert(0);
        *counter += by;
        Ok(*counter)
    }

    async fn realtime_count(&self, kind: StatKind, product_id: ProductId) -> Result<i64> {
        let inner = self.inner.lock();
        Ok(inner
            .counters
            .get(&(kind, product_id.value()))
            .copied()
            .unwrap_or(0))
    }

    async fn rotate_log(&self, hour: i64) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.scratch.contains_key(&hour) {
            // Leftover from a crashed fold; the caller drains it first.
            return Ok(false);
        }
        match inner.logs.remove(&hour) {
            Some(entries) if !entries.is_empty() => {
                inner.scratch.insert(hour, entries);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn read_scratch(&self, hour: i64) -> Result<Vec<StatEvent>> {
        let inner = self.inner.lock();
        Ok(inner.scratch.get(&hour).cloned().unwrap_or_default())
    }

    async fn discard_scratch(&self, hour: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.scratch.remove(&hour);
        Ok(())
    }
}

impl CacheStore for MemoryKv {
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.inner.lock().cache.get(key).cloned())
    }

    async fn put_json(
        &self,
        key: &str,
        value: &serde_json::Value,
        _ttl: Duration,
    ) -> Result<()> {
        self.inner
            .lock()
            .cache
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().cache.remove(key);
        Ok(())
    }
}
