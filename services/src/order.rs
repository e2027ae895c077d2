//! Order service: creation, lifecycle transitions and expiry.
//!
//! All transitions follow the lifecycle DAG encoded on [`OrderStatus`];
//! replaying a transition whose target state already holds is an
//! idempotent success, which is what makes the order handler safe under
//! at-least-once event delivery.

use chrono::Duration;
use rand::Rng;
use storefront_core::clock::Clock;
use storefront_core::coupon::UserCouponStatus;
use storefront_core::error::{CommerceError, Result};
use storefront_core::event::{
    CouponRestoredPayload, DomainEvent, OrderCancelledPayload, OrderCompletedPayload,
    OrderConfirmedPayload, OrderCreatedPayload, SaleLine,
};
use storefront_core::ids::{CouponId, OrderId, UserId};
use storefront_core::order::{NewOrder, Order, OrderItem, OrderStatus};
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::store::{CouponStore, OrderStore};
use uuid::Uuid;

/// How long an order may sit in `PENDING_PAYMENT` before it expires.
#[must_use]
pub fn payment_ttl() -> Duration {
    Duration::minutes(30)
}

/// Batch size of the expiry sweep.
const EXPIRY_BATCH: usize = 100;

/// Owns the order aggregate.
pub struct OrderService<S, C> {
    stores: S,
    clock: C,
}

impl<S, C> OrderService<S, C>
where
    S: OrderStore + CouponStore,
    C: Clock,
{
    /// Create the service.
    pub const fn new(stores: S, clock: C) -> Self {
        Self { stores, clock }
    }

    /// Load an order.
    ///
    /// # Errors
    ///
    /// `OrderNotFound` when absent.
    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        self.stores.get_order(order_id).await
    }

    /// Create an order in `PENDING_PAYMENT`, computing the coupon discount,
    /// and publish `OrderCreated` in the creating transaction.
    ///
    /// # Errors
    ///
    /// - `Validation` for empty/inconsistent items or duplicate coupons;
    /// - `CouponNotFound` / `CouponNotUsable` when a coupon cannot apply or
    ///   the user does not hold it;
    /// - store errors.
    pub async fn create_order(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
        coupon_ids: Vec<CouponId>,
    ) -> Result<Order> {
        let now = self.clock.now();
        let total: i64 = items.iter().map(OrderItem::total_price).sum();

        let mut discount = 0_i64;
        for coupon_id in &coupon_ids {
            let coupon = self.stores.get_coupon(*coupon_id).await?;
            coupon.ensure_usable(total, now)?;
            let held = self.stores.find_user_coupon(user_id, *coupon_id).await?;
            match held {
                Some(uc) if uc.status == UserCouponStatus::Issued => {}
                _ => {
                    return Err(CommerceError::CouponNotUsable {
                        coupon_id: *coupon_id,
                        reason: "not held by user".to_string(),
                    });
                }
            }
            discount += coupon.discount_for(total);
        }
        let discount = discount.min(total);

        let draft = NewOrder::validated(
            generate_order_number(&self.clock),
            user_id,
            items,
            discount,
            coupon_ids,
        )?;

        let correlation_id = Uuid::new_v4();
        let order = self
            .stores
            .insert_order(draft, |created| {
                let event = DomainEvent::OrderCreated(OrderCreatedPayload {
                    order_id: created.id,
                    order_number: created.order_number.clone(),
                    user_id,
                    final_amount: created.final_amount,
                    correlation_id,
                });
                Ok(vec![NewOutboxEvent::from_domain(&event)?])
            })
            .await?;

        tracing::info!(
            order_id = %order.id,
            order_number = order.order_number.as_str(),
            user_id = %user_id,
            final_amount = order.final_amount,
            "order created"
        );
        Ok(order)
    }

    /// Payment accepted: `PENDING_PAYMENT -> PENDING`.
    ///
    /// # Errors
    ///
    /// `InvalidOrderStatus` outside the DAG; replays are no-ops.
    pub async fn accept_payment(&self, order_id: OrderId) -> Result<Order> {
        self.transition(order_id, OrderStatus::Pending, |_, _| Ok(Vec::new()))
            .await
    }

    /// Payment completed: `PENDING -> CONFIRMED`, publishing
    /// `OrderConfirmed` with the sold lines.
    ///
    /// # Errors
    ///
    /// `InvalidOrderStatus` outside the DAG; replays are no-ops.
    pub async fn confirm(&self, order_id: OrderId, correlation_id: Uuid) -> Result<Order> {
        self.transition(order_id, OrderStatus::Confirmed, move |order, _| {
            let event = DomainEvent::OrderConfirmed(OrderConfirmedPayload {
                order_id: order.id,
                user_id: order.user_id,
                items: order
                    .items
                    .iter()
                    .map(|item| SaleLine {
                        product_id: item.product_id,
                        quantity: item.quantity,
                    })
                    .collect(),
                correlation_id,
            });
            Ok(vec![NewOutboxEvent::from_domain(&event)?])
        })
        .await
    }

    /// Payment failed: `PENDING -> FAILED`.
    ///
    /// # Errors
    ///
    /// `InvalidOrderStatus` outside the DAG; replays are no-ops.
    pub async fn fail(&self, order_id: OrderId) -> Result<Order> {
        self.transition(order_id, OrderStatus::Failed, |_, _| Ok(Vec::new()))
            .await
    }

    /// Cancel from `PENDING` or `CONFIRMED`, publishing `OrderCancelled`
    /// plus one `CouponRestored` per consumed coupon to drive compensation
    /// (stock restore, point refund, coupon revert).
    ///
    /// # Errors
    ///
    /// `InvalidOrderStatus` outside the DAG; replays are no-ops.
    pub async fn cancel(
        &self,
        order_id: OrderId,
        reason: &str,
        correlation_id: Uuid,
    ) -> Result<Order> {
        let reason = reason.to_string();
        let order = self
            .transition(order_id, OrderStatus::Cancelled, move |order, _| {
                let mut events = vec![NewOutboxEvent::from_domain(&DomainEvent::OrderCancelled(
                    OrderCancelledPayload {
                        order_id: order.id,
                        user_id: order.user_id,
                        reason: reason.clone(),
                        correlation_id,
                    },
                ))?];
                for coupon_id in &order.used_coupon_ids {
                    events.push(NewOutboxEvent::from_domain(&DomainEvent::CouponRestored(
                        CouponRestoredPayload {
                            user_id: order.user_id,
                            coupon_id: *coupon_id,
                            order_id: order.id,
                            correlation_id,
                        },
                    ))?);
                }
                Ok(events)
            })
            .await?;
        tracing::info!(order_id = %order_id, "order cancelled");
        Ok(order)
    }

    /// Fulfilment complete: `CONFIRMED -> COMPLETED`, publishing
    /// `OrderCompleted`.
    ///
    /// # Errors
    ///
    /// `InvalidOrderStatus` outside the DAG; replays are no-ops.
    pub async fn complete(&self, order_id: OrderId, correlation_id: Uuid) -> Result<Order> {
        self.transition(order_id, OrderStatus::Completed, move |order, _| {
            let event = DomainEvent::OrderCompleted(OrderCompletedPayload {
                order_id: order.id,
                user_id: order.user_id,
                correlation_id,
            });
            Ok(vec![NewOutboxEvent::from_domain(&event)?])
        })
        .await
    }

    /// Expire orders stuck in `PENDING_PAYMENT` longer than `ttl`. Returns
    /// how many were expired. Driven by a periodic worker.
    ///
    /// # Errors
    ///
    /// Store errors from the sweep.
    pub async fn expire_overdue(&self, ttl: Duration) -> Result<usize> {
        let cutoff = self.clock.now() - ttl;
        let overdue = self
            .stores
            .find_payment_overdue(cutoff, EXPIRY_BATCH)
            .await?;
        let mut expired = 0;
        for order in overdue {
            match self
                .stores
                .update_order_status(
                    order.id,
                    OrderStatus::PendingPayment,
                    OrderStatus::Expired,
                    Vec::new(),
                )
                .await
            {
                Ok(_) => expired += 1,
                // Lost the race against a payment; nothing to expire.
                Err(CommerceError::ConcurrencyConflict { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if expired > 0 {
            tracing::info!(expired, "expired overdue orders");
        }
        Ok(expired)
    }

    /// Shared transition shape: load, replay-check, DAG-check, guarded
    /// update with events built from the loaded row.
    async fn transition<F>(&self, order_id: OrderId, to: OrderStatus, events_for: F) -> Result<Order>
    where
        F: FnOnce(&Order, OrderStatus) -> Result<Vec<NewOutboxEvent>>,
    {
        let order = self.stores.get_order(order_id).await?;
        if order.status == to {
            // Redelivered event; the transition already happened.
            return Ok(order);
        }
        order.ensure_can_transition_to(to)?;
        let events = events_for(&order, to)?;
        self.stores
            .update_order_status(order_id, order.status, to, events)
            .await
    }
}

/// `ORD-{yyyymmdd}-{4 random digits}`.
fn generate_order_number<C: Clock>(clock: &C) -> String {
    let date = clock.now().format("%Y%m%d");
    let suffix: u32 = rand::thread_rng().gen_range(1000..10_000);
    format!("ORD-{date}-{suffix}")
}
