//! Coupon handler: consumption on payment, restore on compensation.

use crate::coupon::CouponService;
use crate::order::OrderService;
use std::sync::Arc;
use storefront_core::clock::Clock;
use storefront_core::event::{DomainEvent, event_types};
use storefront_core::handler::{EventHandler, HandlerFuture};
use storefront_core::memstore::CouponAdmissionStore;
use storefront_core::outbox::OutboxEvent;
use storefront_core::store::{CouponStore, OrderStore};

/// Consumes `PaymentCompleted` (mark the order's coupons USED) and
/// `CouponRestored` (revert to ISSUED). Idempotency: a coupon already
/// USED by the same order is a replay; restore of an ISSUED coupon is a
/// no-op.
pub struct CouponEventHandler<S, K, C> {
    coupons: Arc<CouponService<S, K>>,
    orders: Arc<OrderService<S, C>>,
}

impl<S, K, C> CouponEventHandler<S, K, C> {
    /// Create the handler.
    pub const fn new(coupons: Arc<CouponService<S, K>>, orders: Arc<OrderService<S, C>>) -> Self {
        Self { coupons, orders }
    }
}

impl<S, K, C> EventHandler for CouponEventHandler<S, K, C>
where
    S: CouponStore + OrderStore + 'static,
    K: CouponAdmissionStore + 'static,
    C: Clock + 'static,
{
    fn name(&self) -> &'static str {
        "coupon"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[event_types::PAYMENT_COMPLETED, event_types::COUPON_RESTORED]
    }

    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            match event.domain_event()? {
                DomainEvent::PaymentCompleted(p) => {
                    let order = self.orders.get(p.order_id).await?;
                    for coupon_id in &order.used_coupon_ids {
                        self.coupons
                            .use_for_order(order.user_id, *coupon_id, order.id, p.correlation_id)
                            .await?;
                    }
                    Ok(())
                }
                DomainEvent::CouponRestored(p) => {
                    self.coupons.restore(p.user_id, p.coupon_id).await
                }
                other => {
                    tracing::debug!(
                        event_type = other.event_type(),
                        "coupon handler ignoring event"
                    );
                    Ok(())
                }
            }
        })
    }
}
