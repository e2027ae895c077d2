//! Memory-store trait seams: coupon admission primitives, statistics
//! buffers and the JSON cache.
//!
//! Production implementations live in `storefront-redis` under the frozen
//! `ecom:*` key taxonomy; deterministic in-memory implementations live in
//! `storefront-testing`. Components must only touch their own key prefix.

use crate::coupon::QueuedIssue;
use crate::error::Result;
use crate::ids::{CouponId, ProductId, UserId};
use crate::stats::{StatEvent, StatKind};
use std::future::Future;
use std::time::Duration;

/// Fast-path state for limited coupon issuance (`ecom:cpn:iss:*`).
///
/// The admission protocol composes these primitives; each primitive is
/// atomic on its own (SADD / INCR / ZADD semantics), which is all the
/// protocol needs — duplicates are gated by the issued set and quantity by
/// the counter.
pub trait CouponAdmissionStore: Send + Sync {
    /// Record the quantity cap at activation time and clear any stale
    /// soldout flag.
    fn activate(
        &self,
        coupon_id: CouponId,
        max_quantity: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// The quantity cap, if the coupon was activated.
    fn max_quantity(
        &self,
        coupon_id: CouponId,
    ) -> impl Future<Output = Result<Option<i64>>> + Send;

    /// Whether the soldout flag is set.
    fn is_sold_out(&self, coupon_id: CouponId) -> impl Future<Output = Result<bool>> + Send;

    /// Set the soldout flag.
    fn set_sold_out(&self, coupon_id: CouponId) -> impl Future<Output = Result<()>> + Send;

    /// Clear the soldout flag (compensation path).
    fn clear_sold_out(&self, coupon_id: CouponId) -> impl Future<Output = Result<()>> + Send;

    /// Atomically add the user to the admitted set. Returns `true` when the
    /// user was newly added, `false` when already present.
    fn add_issued(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Remove the user from the admitted set (over-cap rollback).
    fn remove_issued(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically increment the admission counter, returning the new value.
    fn increment_counter(
        &self,
        coupon_id: CouponId,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Atomically decrement the admission counter (over-cap rollback),
    /// returning the new value.
    fn decrement_counter(
        &self,
        coupon_id: CouponId,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Current counter value.
    fn counter(&self, coupon_id: CouponId) -> impl Future<Output = Result<i64>> + Send;

    /// Add an admitted user to the issue queue at `score` (acceptance time,
    /// epoch milliseconds).
    fn push_queue(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
        score: f64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Pop up to `limit` queue entries in ascending score order.
    fn pop_queue(
        &self,
        coupon_id: CouponId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<QueuedIssue>>> + Send;

    /// Put a popped entry back with its **unchanged** score, preserving
    /// FIFO across drain failures.
    fn requeue(
        &self,
        coupon_id: CouponId,
        entry: &QueuedIssue,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Number of entries waiting in the queue.
    fn queue_len(&self, coupon_id: CouponId) -> impl Future<Output = Result<i64>> + Send;
}

/// Hot statistics state (`ecom:stat:*`): per-hour JSON log lists and
/// realtime counters.
///
/// # Rename-then-read discipline
///
/// The fold path MUST be: [`StatsBuffer::rotate_log`] (atomic rename of the
/// hour list to its scratch key) → [`StatsBuffer::read_scratch`] → persist →
/// [`StatsBuffer::discard_scratch`]. A naive "read then delete" loses every
/// event between the read and the delete when the worker crashes; with the
/// rename the entries survive in the scratch key and are folded on the next
/// run.
pub trait StatsBuffer: Send + Sync {
    /// Append one event to the hour's log list.
    fn append_log(
        &self,
        hour: i64,
        entry: &StatEvent,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Bump the realtime counter for `(kind, product)` by `by`, returning
    /// the new value.
    fn bump_counter(
        &self,
        kind: StatKind,
        product_id: ProductId,
        by: i64,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Current realtime counter value.
    fn realtime_count(
        &self,
        kind: StatKind,
        product_id: ProductId,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Atomically rename the hour's log list to its scratch key. Returns
    /// `false` when the hour has no log. Must not clobber an existing
    /// scratch key — callers drain leftovers first.
    fn rotate_log(&self, hour: i64) -> impl Future<Output = Result<bool>> + Send;

    /// Read all entries from the hour's scratch key (empty when none).
    fn read_scratch(&self, hour: i64) -> impl Future<Output = Result<Vec<StatEvent>>> + Send;

    /// Delete the hour's scratch key — only after the durable commit.
    fn discard_scratch(&self, hour: i64) -> impl Future<Output = Result<()>> + Send;
}

/// Short-TTL JSON cache (`ecom:cache:*`).
pub trait CacheStore: Send + Sync {
    /// Read a cached JSON value.
    fn get_json(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<serde_json::Value>>> + Send;

    /// Write a JSON value with a TTL.
    fn put_json(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Evict a key.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}
