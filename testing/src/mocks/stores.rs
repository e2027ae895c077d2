//! Single-mutex in-memory implementation of every durable-store seam.
//!
//! One mutex guards all tables, so composite operations (payment
//! completion, balance apply, status transitions with co-written outbox
//! rows) are exactly as atomic as their Postgres counterparts. Guards are
//! checked before any mutation, keeping failed operations side-effect free.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use storefront_core::cart::CartItem;
use storefront_core::clock::Clock;
use storefront_core::coupon::{Coupon, UserCoupon, UserCouponStatus};
use storefront_core::delivery::{Delivery, DeliveryStatus, NewDelivery};
use storefront_core::error::{CommerceError, Result};
use storefront_core::ids::{CouponId, OrderId, ProductId, UserId};
use storefront_core::inventory::{DeductionOutcome, Inventory, RestoreOutcome};
use storefront_core::order::{NewOrder, Order, OrderStatus};
use storefront_core::outbox::{NewOutboxEvent, OutboxEvent, OutboxEventDlq};
use storefront_core::payment::{Payment, PaymentCompletion, PaymentStatus};
use storefront_core::point::{
    BalanceHistory, BalanceHistoryType, NewBalanceHistory, UserBalance,
};
use storefront_core::stats::{PopularProduct, ProductStatistics, StatDelta, StatKind};
use storefront_core::store::{
    BalanceStore, CartStore, CouponStore, DeliveryStore, HandledEventStore, InventoryStore,
    OrderStore, OutboxStore, PaymentStore, StatsStore,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MovementKind {
    Deduct,
    Restore,
}

struct StockMovement {
    order_id: OrderId,
    product_id: ProductId,
    quantity: i64,
    kind: MovementKind,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    orders: HashMap<i64, Order>,
    balances: HashMap<i64, UserBalance>,
    histories: Vec<BalanceHistory>,
    payments: HashMap<i64, Payment>,
    coupons: HashMap<i64, Coupon>,
    user_coupons: Vec<UserCoupon>,
    inventories: HashMap<i64, Inventory>,
    stock_movements: Vec<StockMovement>,
    deliveries: HashMap<i64, Delivery>,
    carts: Vec<CartItem>,
    stats: HashMap<i64, ProductStatistics>,
    ranking: HashMap<i64, f64>,
    outbox: BTreeMap<i64, OutboxEvent>,
    dlq: BTreeMap<i64, OutboxEventDlq>,
    handled: HashSet<(String, String, String, i64)>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn append_event(&mut self, event: NewOutboxEvent, now: DateTime<Utc>) -> Result<OutboxEvent> {
        event.validate()?;
        let id = self.next_id();
        let row = OutboxEvent {
            id,
            event_type: event.event_type,
            aggregate_type: event.aggregate_type,
            aggregate_id: event.aggregate_id,
            payload: event.payload,
            processed: false,
            processed_at: None,
            retry_count: 0,
            error_message: None,
            created_at: now,
        };
        self.outbox.insert(id, row.clone());
        Ok(row)
    }

    fn append_events(&mut self, events: Vec<NewOutboxEvent>, now: DateTime<Utc>) -> Result<()> {
        for event in events {
            self.append_event(event, now)?;
        }
        Ok(())
    }
}

/// Cheap-to-clone handle over the shared in-memory tables.
#[derive(Clone)]
pub struct MemoryStores {
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStores {
    /// Create empty tables with the given clock.
    #[must_use]
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    // ── Seeding and inspection helpers ──────────────────────────────

    /// Insert a coupon definition.
    pub fn seed_coupon(&self, coupon: Coupon) {
        self.inner.lock().coupons.insert(coupon.id.value(), coupon);
    }

    /// Set a user's balance directly, writing a synthetic EARN history row
    /// so the conservation invariant (`balance == Σ history.amount`) holds.
    pub fn seed_balance(&self, user_id: UserId, balance: i64) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let history_id = inner.next_id();
        inner.balances.insert(
            user_id.value(),
            UserBalance {
                user_id,
                balance,
                version: 1,
                updated_at: now,
            },
        );
        inner.histories.push(BalanceHistory {
            id: history_id,
            user_id,
            amount: balance,
            history_type: BalanceHistoryType::Earn,
            balance_before: 0,
            balance_after: balance,
            order_id: None,
            description: "seed".to_string(),
            created_at: now,
        });
    }

    /// Snapshot of the whole outbox table, id order.
    #[must_use]
    pub fn all_outbox(&self) -> Vec<OutboxEvent> {
        self.inner.lock().outbox.values().cloned().collect()
    }

    /// Snapshot of the whole DLQ table, id order.
    #[must_use]
    pub fn all_dlq(&self) -> Vec<OutboxEventDlq> {
        self.inner.lock().dlq.values().cloned().collect()
    }

    /// All balance histories of one user, oldest first.
    #[must_use]
    pub fn all_histories(&self, user_id: UserId) -> Vec<BalanceHistory> {
        self.inner
            .lock()
            .histories
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect()
    }

    /// All user-coupon rows for one coupon.
    #[must_use]
    pub fn all_user_coupons(&self, coupon_id: CouponId) -> Vec<UserCoupon> {
        self.inner
            .lock()
            .user_coupons
            .iter()
            .filter(|uc| uc.coupon_id == coupon_id)
            .cloned()
            .collect()
    }
}

impl OrderStore for MemoryStores {
    async fn insert_order<F>(&self, order: NewOrder, events_for: F) -> Result<Order>
    where
        F: FnOnce(&Order) -> Result<Vec<NewOutboxEvent>> + Send,
    {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let id = inner.next_id();
        let row = Order {
            id: OrderId::new(id),
            order_number: order.order_number,
            user_id: order.user_id,
            total_amount: order.total_amount,
            discount_amount: order.discount_amount,
            final_amount: order.final_amount,
            used_coupon_ids: order.used_coupon_ids,
            status: OrderStatus::PendingPayment,
            items: order.items,
            created_at: now,
            updated_at: now,
        };
        // Events derive from the created row; a failure rolls everything
        // back (nothing has been inserted yet).
        let events = events_for(&row)?;
        inner.orders.insert(id, row.clone());
        inner.append_events(events, now)?;
        Ok(row)
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.inner
            .lock()
            .orders
            .get(&id.value())
            .cloned()
            .ok_or(CommerceError::OrderNotFound { order_id: id })
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        events: Vec<NewOutboxEvent>,
    ) -> Result<Order> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let order = inner
            .orders
            .get(&id.value())
            .ok_or(CommerceError::OrderNotFound { order_id: id })?;
        if order.status != from {
            return Err(CommerceError::ConcurrencyConflict {
                resource: format!("order:{id}"),
            });
        }
        let mut updated = order.clone();
        updated.status = to;
        updated.updated_at = now;
        inner.orders.insert(id.value(), updated.clone());
        inner.append_events(events, now)?;
        Ok(updated)
    }

    async fn find_payment_overdue(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Order>> {
        let inner = self.inner.lock();
        let mut overdue: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::PendingPayment && o.created_at < cutoff)
            .cloned()
            .collect();
        overdue.sort_by_key(|o| o.id);
        overdue.truncate(limit);
        Ok(overdue)
    }
}

impl BalanceStore for MemoryStores {
    async fn get_balance(&self, user_id: UserId) -> Result<Option<UserBalance>> {
        Ok(self.inner.lock().balances.get(&user_id.value()).cloned())
    }

    async fn get_or_create_balance(&self, user_id: UserId) -> Result<UserBalance> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        Ok(inner
            .balances
            .entry(user_id.value())
            .or_insert(UserBalance {
                user_id,
                balance: 0,
                version: 0,
                updated_at: now,
            })
            .clone())
    }

    async fn apply_balance_change(
        &self,
        user_id: UserId,
        expected_version: i64,
        history: NewBalanceHistory,
        events: Vec<NewOutboxEvent>,
    ) -> Result<UserBalance> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let balance = inner
            .balances
            .get(&user_id.value())
            .ok_or(CommerceError::UserPointNotFound { user_id })?;
        if balance.version != expected_version {
            return Err(CommerceError::ConcurrencyConflict {
                resource: format!("balance:{user_id}"),
            });
        }
        let new_amount = balance.balance + history.amount;
        if new_amount < 0 {
            return Err(CommerceError::InsufficientBalance {
                balance: balance.balance,
                requested: -history.amount,
            });
        }

        let updated = UserBalance {
            user_id,
            balance: new_amount,
            version: expected_version + 1,
            updated_at: now,
        };
        inner.balances.insert(user_id.value(), updated.clone());
        let history_id = inner.next_id();
        inner.histories.push(BalanceHistory {
            id: history_id,
            user_id,
            amount: history.amount,
            history_type: history.history_type,
            balance_before: history.balance_before,
            balance_after: history.balance_after,
            order_id: history.order_id,
            description: history.description,
            created_at: now,
        });
        inner.append_events(events, now)?;
        Ok(updated)
    }

    async fn histories(&self, user_id: UserId, limit: usize) -> Result<Vec<BalanceHistory>> {
        let inner = self.inner.lock();
        let mut rows: Vec<BalanceHistory> = inner
            .histories
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|h| std::cmp::Reverse(h.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn sum_used_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let inner = self.inner.lock();
        Ok(inner
            .histories
            .iter()
            .filter(|h| {
                h.user_id == user_id
                    && h.history_type == BalanceHistoryType::Use
                    && h.created_at >= from
                    && h.created_at < to
            })
            .map(|h| h.amount.abs())
            .sum())
    }

    async fn has_refund_for_order(&self, user_id: UserId, order_id: OrderId) -> Result<bool> {
        let inner = self.inner.lock();
        Ok(inner.histories.iter().any(|h| {
            h.user_id == user_id
                && h.history_type == BalanceHistoryType::Refund
                && h.order_id == Some(order_id)
        }))
    }
}

impl PaymentStore for MemoryStores {
    async fn complete_payment(&self, completion: PaymentCompletion) -> Result<Payment> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        // Check every guard before touching anything.
        if let Some(debit) = &completion.debit {
            let balance = inner
                .balances
                .get(&debit.user_id.value())
                .ok_or(CommerceError::UserPointNotFound {
                    user_id: debit.user_id,
                })?;
            if balance.version != debit.expected_version {
                return Err(CommerceError::ConcurrencyConflict {
                    resource: format!("balance:{}", debit.user_id),
                });
            }
            if balance.balance < debit.amount {
                return Err(CommerceError::PaymentBalanceInsufficient {
                    balance: balance.balance,
                    requested: debit.amount,
                });
            }
        }
        let order = inner
            .orders
            .get(&completion.order_id.value())
            .cloned()
            .ok_or(CommerceError::OrderNotFound {
                order_id: completion.order_id,
            })?;
        if order.status != completion.order_from {
            return Err(CommerceError::ConcurrencyConflict {
                resource: format!("order:{}", completion.order_id),
            });
        }
        if let Some(existing) = inner.payments.get(&completion.order_id.value()) {
            if existing.status == PaymentStatus::Completed {
                return Err(CommerceError::AlreadyPaidOrder {
                    order_id: completion.order_id,
                });
            }
        }

        // All guards passed; mutate.
        if let (Some(debit), Some(history)) = (&completion.debit, completion.history.clone()) {
            let updated = UserBalance {
                user_id: debit.user_id,
                balance: history.balance_after,
                version: debit.expected_version + 1,
                updated_at: now,
            };
            inner.balances.insert(debit.user_id.value(), updated);
            let history_id = inner.next_id();
            inner.histories.push(BalanceHistory {
                id: history_id,
                user_id: history.user_id,
                amount: history.amount,
                history_type: history.history_type,
                balance_before: history.balance_before,
                balance_after: history.balance_after,
                order_id: history.order_id,
                description: history.description,
                created_at: now,
            });
        }

        let mut order = order.clone();
        order.status = completion.order_to;
        order.updated_at = now;
        inner.orders.insert(order.id.value(), order);

        let payment = completion.payment;
        let existing_payment_id = inner.payments.get(&payment.order_id.value()).map(|existing| existing.id);
        let id = match existing_payment_id {
            Some(id) => id,
            None => inner.next_id(),
        };
        let row = Payment {
            id,
            order_id: payment.order_id,
            user_id: payment.user_id,
            method: payment.method,
            status: PaymentStatus::Completed,
            external_txn_id: payment.external_txn_id,
            amount: payment.amount,
            point_amount: payment.point_amount,
            gateway_amount: payment.gateway_amount,
            created_at: now,
            paid_at: Some(now),
        };
        inner.payments.insert(payment.order_id.value(), row.clone());
        inner.append_events(completion.events, now)?;
        Ok(row)
    }

    async fn mark_payment_failed(
        &self,
        order_id: OrderId,
        _reason: &str,
        events: Vec<NewOutboxEvent>,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if let Some(payment) = inner.payments.get_mut(&order_id.value()) {
            payment.status = PaymentStatus::Failed;
        }
        inner.append_events(events, now)?;
        Ok(())
    }

    async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.inner.lock().payments.get(&order_id.value()).cloned())
    }
}

impl CouponStore for MemoryStores {
    async fn get_coupon(&self, id: CouponId) -> Result<Coupon> {
        self.inner
            .lock()
            .coupons
            .get(&id.value())
            .cloned()
            .ok_or(CommerceError::CouponNotFound { coupon_id: id })
    }

    async fn list_active_coupons(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>> {
        let inner = self.inner.lock();
        let mut active: Vec<Coupon> = inner
            .coupons
            .values()
            .filter(|c| c.is_active_at(now))
            .cloned()
            .collect();
        active.sort_by_key(|c| c.id);
        Ok(active)
    }

    async fn insert_issued(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        issued_at: DateTime<Utc>,
        events: Vec<NewOutboxEvent>,
    ) -> Result<UserCoupon> {
        let mut inner = self.inner.lock();
        let coupon = inner
            .coupons
            .get(&coupon_id.value())
            .ok_or(CommerceError::CouponNotFound { coupon_id })?;
        if coupon.issued_quantity >= coupon.total_quantity {
            return Err(CommerceError::CouponSoldOut { coupon_id });
        }
        let already = inner.user_coupons.iter().any(|uc| {
            uc.user_id == user_id
                && uc.coupon_id == coupon_id
                && uc.status == UserCouponStatus::Issued
        });
        if already {
            return Err(CommerceError::CouponAlreadyIssued { coupon_id, user_id });
        }

        if let Some(coupon) = inner.coupons.get_mut(&coupon_id.value()) {
            coupon.issued_quantity += 1;
            coupon.version += 1;
        }
        let id = inner.next_id();
        let row = UserCoupon {
            id,
            user_id,
            coupon_id,
            status: UserCouponStatus::Issued,
            used_order_id: None,
            issued_at,
            used_at: None,
        };
        inner.user_coupons.push(row.clone());
        inner.append_events(events, issued_at)?;
        Ok(row)
    }

    async fn find_user_coupon(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> Result<Option<UserCoupon>> {
        let inner = self.inner.lock();
        Ok(inner
            .user_coupons
            .iter()
            .find(|uc| uc.user_id == user_id && uc.coupon_id == coupon_id)
            .cloned())
    }

    async fn mark_used(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        order_id: OrderId,
        events: Vec<NewOutboxEvent>,
    ) -> Result<UserCoupon> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let row = inner
            .user_coupons
            .iter_mut()
            .find(|uc| uc.user_id == user_id && uc.coupon_id == coupon_id)
            .ok_or(CommerceError::CouponNotUsable {
                coupon_id,
                reason: "not held by user".to_string(),
            })?;
        match row.status {
            UserCouponStatus::Used => {
                // Replay of the same order is a no-op.
                if row.used_order_id == Some(order_id) {
                    return Ok(row.clone());
                }
                return Err(CommerceError::CouponNotUsable {
                    coupon_id,
                    reason: "already used by another order".to_string(),
                });
            }
            UserCouponStatus::Expired => {
                return Err(CommerceError::CouponNotUsable {
                    coupon_id,
                    reason: "expired".to_string(),
                });
            }
            UserCouponStatus::Issued => {}
        }
        row.status = UserCouponStatus::Used;
        row.used_order_id = Some(order_id);
        row.used_at = Some(now);
        let updated = row.clone();
        inner.append_events(events, now)?;
        Ok(updated)
    }

    async fn restore(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        events: Vec<NewOutboxEvent>,
    ) -> Result<bool> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let Some(row) = inner
            .user_coupons
            .iter_mut()
            .find(|uc| uc.user_id == user_id && uc.coupon_id == coupon_id)
        else {
            return Ok(false);
        };
        if row.status != UserCouponStatus::Used {
            return Ok(false);
        }
        row.status = UserCouponStatus::Issued;
        row.used_order_id = None;
        row.used_at = None;
        if let Some(coupon) = inner.coupons.get_mut(&coupon_id.value()) {
            coupon.issued_quantity -= 1;
            coupon.version += 1;
        }
        inner.append_events(events, now)?;
        Ok(true)
    }

    async fn count_issued(&self, coupon_id: CouponId) -> Result<i64> {
        let inner = self.inner.lock();
        Ok(inner
            .user_coupons
            .iter()
            .filter(|uc| uc.coupon_id == coupon_id && uc.status == UserCouponStatus::Issued)
            .count() as i64)
    }
}

impl InventoryStore for MemoryStores {
    async fn get_inventory(&self, product_id: ProductId) -> Result<Option<Inventory>> {
        Ok(self
            .inner
            .lock()
            .inventories
            .get(&product_id.value())
            .cloned())
    }

    async fn upsert_inventory(&self, product_id: ProductId, quantity: i64) -> Result<Inventory> {
        let mut inner = self.inner.lock();
        let row = Inventory {
            product_id,
            quantity,
            reserved_quantity: 0,
            version: 0,
        };
        inner.inventories.insert(product_id.value(), row.clone());
        Ok(row)
    }

    async fn deduct_for_order(
        &self,
        order_id: OrderId,
        lines: &[(ProductId, i64)],
        events: Vec<NewOutboxEvent>,
    ) -> Result<DeductionOutcome> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if inner
            .stock_movements
            .iter()
            .any(|m| m.order_id == order_id && m.kind == MovementKind::Deduct)
        {
            return Ok(DeductionOutcome::AlreadyDeducted);
        }

        // Verify every line before touching anything (all-or-nothing).
        for (product_id, quantity) in lines {
            let available = inner
                .inventories
                .get(&product_id.value())
                .map_or(0, Inventory::available);
            if available < *quantity {
                return Err(CommerceError::InsufficientStock {
                    product_id: *product_id,
                    requested: *quantity,
                    available,
                });
            }
        }

        for (product_id, quantity) in lines {
            if let Some(row) = inner.inventories.get_mut(&product_id.value()) {
                row.quantity -= quantity;
                row.version += 1;
            }
            inner.stock_movements.push(StockMovement {
                order_id,
                product_id: *product_id,
                quantity: *quantity,
                kind: MovementKind::Deduct,
            });
        }
        inner.append_events(events, now)?;
        Ok(DeductionOutcome::Deducted)
    }

    async fn restore_for_order(
        &self,
        order_id: OrderId,
        events: Vec<NewOutboxEvent>,
    ) -> Result<RestoreOutcome> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let deducted: Vec<(ProductId, i64)> = inner
            .stock_movements
            .iter()
            .filter(|m| m.order_id == order_id && m.kind == MovementKind::Deduct)
            .map(|m| (m.product_id, m.quantity))
            .collect();
        if deducted.is_empty() {
            return Ok(RestoreOutcome::NothingDeducted);
        }
        if inner
            .stock_movements
            .iter()
            .any(|m| m.order_id == order_id && m.kind == MovementKind::Restore)
        {
            return Ok(RestoreOutcome::AlreadyRestored);
        }

        for (product_id, quantity) in deducted {
            if let Some(row) = inner.inventories.get_mut(&product_id.value()) {
                row.quantity += quantity;
                row.version += 1;
            }
            inner.stock_movements.push(StockMovement {
                order_id,
                product_id,
                quantity,
                kind: MovementKind::Restore,
            });
        }
        inner.append_events(events, now)?;
        Ok(RestoreOutcome::Restored)
    }
}

impl DeliveryStore for MemoryStores {
    async fn create_delivery(&self, delivery: NewDelivery) -> Result<Delivery> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.deliveries.get(&delivery.order_id.value()) {
            return Ok(existing.clone());
        }
        let id = inner.next_id();
        let row = Delivery {
            id,
            order_id: delivery.order_id,
            user_id: delivery.user_id,
            status: DeliveryStatus::Preparing,
            recipient: delivery.recipient,
            address: delivery.address,
            created_at: now,
        };
        inner.deliveries.insert(delivery.order_id.value(), row.clone());
        Ok(row)
    }

    async fn get_delivery_by_order(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        Ok(self.inner.lock().deliveries.get(&order_id.value()).cloned())
    }

    async fn update_delivery_status(
        &self,
        order_id: OrderId,
        status: DeliveryStatus,
        events: Vec<NewOutboxEvent>,
    ) -> Result<Delivery> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let row = inner
            .deliveries
            .get_mut(&order_id.value())
            .ok_or(CommerceError::Validation {
                message: format!("no delivery for order {order_id}"),
            })?;
        row.status = status;
        let updated = row.clone();
        inner.append_events(events, now)?;
        Ok(updated)
    }
}

impl CartStore for MemoryStores {
    async fn put_item(&self, item: CartItem) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .carts
            .retain(|c| !(c.user_id == item.user_id && c.product_id == item.product_id));
        inner.carts.push(item);
        Ok(())
    }

    async fn items(&self, user_id: UserId) -> Result<Vec<CartItem>> {
        let inner = self.inner.lock();
        Ok(inner
            .carts
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove_items(&self, user_id: UserId, product_ids: &[ProductId]) -> Result<u64> {
        let mut inner = self.inner.lock();
        let before = inner.carts.len();
        inner
            .carts
            .retain(|c| !(c.user_id == user_id && product_ids.contains(&c.product_id)));
        Ok((before - inner.carts.len()) as u64)
    }
}

impl StatsStore for MemoryStores {
    async fn apply_deltas(&self, deltas: &[StatDelta]) -> Result<()> {
        let mut inner = self.inner.lock();
        for delta in deltas {
            let row = inner
                .stats
                .entry(delta.product_id.value())
                .or_insert(ProductStatistics {
                    product_id: delta.product_id,
                    view_count: 0,
                    sales_count: 0,
                    wish_count: 0,
                    version: 0,
                });
            match delta.kind {
                StatKind::View => row.view_count += delta.amount,
                StatKind::Sale => row.sales_count += delta.amount,
                StatKind::Wish => row.wish_count += delta.amount,
            }
            row.version += 1;
        }
        Ok(())
    }

    async fn get_statistics(&self, product_id: ProductId) -> Result<Option<ProductStatistics>> {
        Ok(self.inner.lock().stats.get(&product_id.value()).cloned())
    }

    async fn get_many(&self, product_ids: &[ProductId]) -> Result<Vec<ProductStatistics>> {
        let inner = self.inner.lock();
        Ok(product_ids
            .iter()
            .filter_map(|id| inner.stats.get(&id.value()).cloned())
            .collect())
    }

    async fn upsert_ranking(&self, entries: &[PopularProduct]) -> Result<()> {
        let mut inner = self.inner.lock();
        for entry in entries {
            inner.ranking.insert(entry.product_id.value(), entry.score);
        }
        Ok(())
    }

    async fn top_ranked(&self, limit: usize) -> Result<Vec<PopularProduct>> {
        let inner = self.inner.lock();
        let mut ranked: Vec<PopularProduct> = inner
            .ranking
            .iter()
            .map(|(product, score)| PopularProduct {
                product_id: ProductId::new(*product),
                score: *score,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }
}

impl OutboxStore for MemoryStores {
    async fn append(&self, event: NewOutboxEvent) -> Result<OutboxEvent> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.append_event(event, now)
    }

    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let inner = self.inner.lock();
        Ok(inner
            .outbox
            .values()
            .filter(|e| !e.processed)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_event(&self, id: i64) -> Result<OutboxEvent> {
        self.inner
            .lock()
            .outbox
            .get(&id)
            .cloned()
            .ok_or_else(|| CommerceError::Store(format!("outbox event {id} not found")))
    }

    async fn mark_processed(&self, id: i64) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let row = inner
            .outbox
            .get_mut(&id)
            .ok_or_else(|| CommerceError::Store(format!("outbox event {id} not found")))?;
        if row.processed {
            return Err(CommerceError::AlreadyProcessed { event_id: id });
        }
        row.processed = true;
        row.processed_at = Some(now);
        row.error_message = None;
        Ok(())
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<i32> {
        let mut inner = self.inner.lock();
        let row = inner
            .outbox
            .get_mut(&id)
            .ok_or_else(|| CommerceError::Store(format!("outbox event {id} not found")))?;
        row.retry_count += 1;
        row.error_message = Some(error.to_string());
        Ok(row.retry_count)
    }

    async fn move_to_dlq(&self, event: &OutboxEvent, error: &str) -> Result<i64> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let dlq_id = inner.next_id();
        inner.dlq.insert(
            dlq_id,
            OutboxEventDlq {
                id: dlq_id,
                original_event_id: event.id,
                event_type: event.event_type.clone(),
                aggregate_type: event.aggregate_type.clone(),
                aggregate_id: event.aggregate_id.clone(),
                payload: event.payload.clone(),
                error_message: error.to_string(),
                retry_count: event.retry_count,
                failed_at: now,
                resolved: false,
                resolution_note: None,
            },
        );
        // Close the original so it is never claimed again; the error stays.
        if let Some(row) = inner.outbox.get_mut(&event.id) {
            row.processed = true;
            row.error_message = Some(error.to_string());
        }
        Ok(dlq_id)
    }

    async fn count_unresolved_dlq(&self) -> Result<i64> {
        let inner = self.inner.lock();
        Ok(inner.dlq.values().filter(|d| !d.resolved).count() as i64)
    }

    async fn list_unresolved_dlq(&self, limit: usize) -> Result<Vec<OutboxEventDlq>> {
        let inner = self.inner.lock();
        let mut rows: Vec<OutboxEventDlq> =
            inner.dlq.values().filter(|d| !d.resolved).cloned().collect();
        rows.sort_by_key(|d| (d.failed_at, d.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn resolve_dlq(&self, id: i64, note: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let row = inner
            .dlq
            .get_mut(&id)
            .ok_or_else(|| CommerceError::Store(format!("dlq row {id} not found")))?;
        row.resolved = true;
        row.resolution_note = Some(note.to_string());
        Ok(())
    }
}

impl HandledEventStore for MemoryStores {
    async fn try_mark_handled(
        &self,
        handler: &str,
        event_type: &str,
        aggregate_id: &str,
        event_id: i64,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();
        Ok(inner.handled.insert((
            handler.to_string(),
            event_type.to_string(),
            aggregate_id.to_string(),
            event_id,
        )))
    }
}
