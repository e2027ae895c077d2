//! Repository trait seams over the durable store.
//!
//! Production implementations live in `storefront-postgres`; deterministic
//! in-memory implementations live in `storefront-testing`.
//!
//! # Atomicity contract
//!
//! Every mutating operation takes the outbox events to co-write. An
//! implementation MUST apply the aggregate change and append the events in
//! one transaction: on commit both are durable, on rollback neither leaks.
//! This is how the transactional-outbox guarantee is expressed at the type
//! level instead of by convention.
//!
//! # Concurrency contract
//!
//! Operations with an `expected_version` (or a status guard) MUST fail with
//! [`CommerceError::ConcurrencyConflict`](crate::error::CommerceError) when
//! the guard affects zero rows, leaving no partial change behind.

use crate::cart::CartItem;
use crate::coupon::{Coupon, UserCoupon};
use crate::delivery::{Delivery, NewDelivery};
use crate::error::Result;
use crate::ids::{CouponId, OrderId, ProductId, UserId};
use crate::inventory::{DeductionOutcome, Inventory, RestoreOutcome};
use crate::order::{NewOrder, Order, OrderStatus};
use crate::outbox::{NewOutboxEvent, OutboxEvent, OutboxEventDlq};
use crate::payment::{Payment, PaymentCompletion};
use crate::point::{BalanceHistory, NewBalanceHistory, UserBalance};
use crate::stats::{PopularProduct, ProductStatistics, StatDelta};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Order rows and their status transitions.
pub trait OrderStore: Send + Sync {
    /// Insert a validated draft in `PENDING_PAYMENT`. The outbox events are
    /// built from the created row (they need the store-assigned id) and
    /// co-written in the same transaction; an error from `events_for`
    /// rolls the insert back.
    fn insert_order<F>(
        &self,
        order: NewOrder,
        events_for: F,
    ) -> impl Future<Output = Result<Order>> + Send
    where
        F: FnOnce(&Order) -> Result<Vec<NewOutboxEvent>> + Send;

    /// Load an order.
    ///
    /// Fails with `OrderNotFound` when absent.
    fn get_order(&self, id: OrderId) -> impl Future<Output = Result<Order>> + Send;

    /// Transition `from -> to` guarded by the current status
    /// (`WHERE status = from`), co-writing `events`. A guard miss is a
    /// `ConcurrencyConflict`.
    fn update_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        events: Vec<NewOutboxEvent>,
    ) -> impl Future<Output = Result<Order>> + Send;

    /// Orders still in `PENDING_PAYMENT` created before `cutoff`, for the
    /// expiry worker.
    fn find_payment_overdue(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Order>>> + Send;
}

/// Point balances and their audit trail.
pub trait BalanceStore: Send + Sync {
    /// Load a user's balance, if a row exists.
    fn get_balance(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<UserBalance>>> + Send;

    /// Load a user's balance, creating a zero row when absent.
    fn get_or_create_balance(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<UserBalance>> + Send;

    /// Apply a balance change: `balance += history.amount`, `version += 1`,
    /// insert the history row, co-write `events` — all guarded by
    /// `WHERE version = expected_version`.
    fn apply_balance_change(
        &self,
        user_id: UserId,
        expected_version: i64,
        history: NewBalanceHistory,
        events: Vec<NewOutboxEvent>,
    ) -> impl Future<Output = Result<UserBalance>> + Send;

    /// Histories for a user, newest first, capped at `limit`.
    fn histories(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<BalanceHistory>>> + Send;

    /// Sum of USE amounts (absolute value) in `[from, to)`, for the daily
    /// limit check.
    fn sum_used_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Whether a REFUND history row exists for `(user, order)` — the refund
    /// idempotency key.
    fn has_refund_for_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Payment rows.
pub trait PaymentStore: Send + Sync {
    /// Atomically commit a successful payment: debit (version-guarded) +
    /// history + COMPLETED payment row + order transition + outbox events.
    /// All or nothing; a guard miss is a `ConcurrencyConflict`.
    fn complete_payment(
        &self,
        completion: PaymentCompletion,
    ) -> impl Future<Output = Result<Payment>> + Send;

    /// Mark the payment for `order_id` FAILED (if a row exists) and co-write
    /// `events` (typically `PaymentFailed`).
    fn mark_payment_failed(
        &self,
        order_id: OrderId,
        reason: &str,
        events: Vec<NewOutboxEvent>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Load the payment for an order, if any.
    fn get_payment_by_order(
        &self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<Option<Payment>>> + Send;
}

/// Coupon definitions and per-user issues.
pub trait CouponStore: Send + Sync {
    /// Load a coupon definition. Fails with `CouponNotFound` when absent.
    fn get_coupon(&self, id: CouponId) -> impl Future<Output = Result<Coupon>> + Send;

    /// Coupons whose validity window contains `now`.
    fn list_active_coupons(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Coupon>>> + Send;

    /// Insert a `UserCoupon(ISSUED)` row and bump `issued_quantity` under
    /// the coupon's optimistic version, co-writing `events`. Fails with
    /// `CouponAlreadyIssued` when an active row exists and
    /// `CouponSoldOut` when the quantity cap is reached.
    fn insert_issued(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        issued_at: DateTime<Utc>,
        events: Vec<NewOutboxEvent>,
    ) -> impl Future<Output = Result<UserCoupon>> + Send;

    /// Load a user's coupon row, if any.
    fn find_user_coupon(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> impl Future<Output = Result<Option<UserCoupon>>> + Send;

    /// Mark the user's ISSUED coupon USED by `order_id`, co-writing
    /// `events`. Already-USED by the same order is a no-op success.
    fn mark_used(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        order_id: OrderId,
        events: Vec<NewOutboxEvent>,
    ) -> impl Future<Output = Result<UserCoupon>> + Send;

    /// Compensation: revert the user's USED coupon to ISSUED and decrement
    /// `issued_quantity`, co-writing `events`. Returns `true` when a row
    /// was actually reverted; replays and never-used rows return `false`
    /// so callers can keep their own side effects idempotent.
    fn restore(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        events: Vec<NewOutboxEvent>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Count of ISSUED rows for a coupon.
    fn count_issued(&self, coupon_id: CouponId) -> impl Future<Output = Result<i64>> + Send;
}

/// Stock rows with order-scoped movements.
///
/// Movements carry a unique key on `(order_id, product_id, kind)`, which
/// makes deduction and restore naturally idempotent under event redelivery.
pub trait InventoryStore: Send + Sync {
    /// Load stock for a product, if tracked.
    fn get_inventory(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Option<Inventory>>> + Send;

    /// Create or reset the stock row for a product.
    fn upsert_inventory(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> impl Future<Output = Result<Inventory>> + Send;

    /// Atomically decrement stock for every `(product, quantity)` line of
    /// an order and record the movement rows, co-writing `events`.
    ///
    /// All-or-nothing: when any line is short the whole operation fails
    /// with `InsufficientStock` and nothing changes. When the order's
    /// movements already exist the call is a no-op returning
    /// `AlreadyDeducted`.
    fn deduct_for_order(
        &self,
        order_id: OrderId,
        lines: &[(ProductId, i64)],
        events: Vec<NewOutboxEvent>,
    ) -> impl Future<Output = Result<DeductionOutcome>> + Send;

    /// Compensation: add back exactly what `deduct_for_order` removed for
    /// this order, recording restore movements so a replay is a no-op.
    fn restore_for_order(
        &self,
        order_id: OrderId,
        events: Vec<NewOutboxEvent>,
    ) -> impl Future<Output = Result<RestoreOutcome>> + Send;
}

/// Delivery rows.
pub trait DeliveryStore: Send + Sync {
    /// Insert a delivery in PREPARING. Idempotent on `order_id`: returns the
    /// existing row when one exists (natural-uniqueness idempotency).
    fn create_delivery(
        &self,
        delivery: NewDelivery,
    ) -> impl Future<Output = Result<Delivery>> + Send;

    /// Load the delivery for an order, if any.
    fn get_delivery_by_order(
        &self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<Option<Delivery>>> + Send;

    /// Update the delivery status, co-writing `events`.
    fn update_delivery_status(
        &self,
        order_id: OrderId,
        status: crate::delivery::DeliveryStatus,
        events: Vec<NewOutboxEvent>,
    ) -> impl Future<Output = Result<Delivery>> + Send;
}

/// Cart rows.
pub trait CartStore: Send + Sync {
    /// Insert or update a cart item.
    fn put_item(&self, item: CartItem) -> impl Future<Output = Result<()>> + Send;

    /// All items in a user's cart.
    fn items(&self, user_id: UserId) -> impl Future<Output = Result<Vec<CartItem>>> + Send;

    /// Remove the given products from a user's cart, returning how many
    /// rows were removed.
    fn remove_items(
        &self,
        user_id: UserId,
        product_ids: &[ProductId],
    ) -> impl Future<Output = Result<u64>> + Send;
}

/// Durable product statistics and the popularity ranking.
pub trait StatsStore: Send + Sync {
    /// Load-or-create the rows for each delta's product and apply the
    /// deltas, in one transaction. Retried by the fold worker; counters are
    /// commutative so at-least-once application is safe.
    fn apply_deltas(&self, deltas: &[StatDelta]) -> impl Future<Output = Result<()>> + Send;

    /// Load the counters for one product.
    fn get_statistics(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Option<ProductStatistics>>> + Send;

    /// Load the counters for several products.
    fn get_many(
        &self,
        product_ids: &[ProductId],
    ) -> impl Future<Output = Result<Vec<ProductStatistics>>> + Send;

    /// Upsert ranking entries (score recomputed from durable counters).
    fn upsert_ranking(
        &self,
        entries: &[PopularProduct],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Top `limit` products by score, descending.
    fn top_ranked(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PopularProduct>>> + Send;
}

/// The outbox table and its dead-letter queue.
pub trait OutboxStore: Send + Sync {
    /// Append a standalone event (its own small transaction). Used for
    /// events that do not accompany an aggregate change, e.g.
    /// `InventoryInsufficient`. The append is synchronous and deterministic.
    fn append(&self, event: NewOutboxEvent) -> impl Future<Output = Result<OutboxEvent>> + Send;

    /// Up to `limit` unprocessed events ordered by id (FIFO per aggregate).
    fn fetch_unprocessed(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<OutboxEvent>>> + Send;

    /// Load one event by row id.
    fn get_event(&self, id: i64) -> impl Future<Output = Result<OutboxEvent>> + Send;

    /// Mark an event successfully processed. Marking twice fails with
    /// `AlreadyProcessed`.
    fn mark_processed(&self, id: i64) -> impl Future<Output = Result<()>> + Send;

    /// Record a failed attempt: increment `retry_count`, store the error.
    /// Returns the new retry count.
    fn record_failure(
        &self,
        id: i64,
        error: &str,
    ) -> impl Future<Output = Result<i32>> + Send;

    /// Move an event to the DLQ: write the snapshot row and close the
    /// original so it is never claimed again. Returns the DLQ row id.
    fn move_to_dlq(
        &self,
        event: &OutboxEvent,
        error: &str,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Count of unresolved DLQ rows.
    fn count_unresolved_dlq(&self) -> impl Future<Output = Result<i64>> + Send;

    /// Unresolved DLQ rows, oldest first, capped at `limit`.
    fn list_unresolved_dlq(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<OutboxEventDlq>>> + Send;

    /// Close a DLQ row with a resolution note.
    fn resolve_dlq(&self, id: i64, note: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Dedup table for handlers using the explicit-idempotency strategy.
pub trait HandledEventStore: Send + Sync {
    /// Record that `handler` processed `event_id` for `aggregate_id`.
    /// Returns `true` on first insert, `false` when the key already existed
    /// (the handler must then treat the delivery as a replay).
    fn try_mark_handled(
        &self,
        handler: &str,
        event_type: &str,
        aggregate_id: &str,
        event_id: i64,
    ) -> impl Future<Output = Result<bool>> + Send;
}
