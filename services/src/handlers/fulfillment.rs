//! Delivery and cart handlers: fulfilment side effects of a payment.

use crate::fulfillment::{CartService, DeliveryService};
use crate::order::OrderService;
use std::sync::Arc;
use storefront_core::clock::Clock;
use storefront_core::event::{DomainEvent, event_types};
use storefront_core::handler::{EventHandler, HandlerFuture};
use storefront_core::outbox::OutboxEvent;
use storefront_core::store::{CartStore, CouponStore, DeliveryStore, HandledEventStore, OrderStore};

/// Consumes `PaymentCompleted` and creates the delivery. Idempotency is
/// natural uniqueness: one delivery row per order.
pub struct DeliveryEventHandler<S, C> {
    deliveries: Arc<DeliveryService<S>>,
    orders: Arc<OrderService<S, C>>,
}

impl<S, C> DeliveryEventHandler<S, C> {
    /// Create the handler.
    pub const fn new(deliveries: Arc<DeliveryService<S>>, orders: Arc<OrderService<S, C>>) -> Self {
        Self { deliveries, orders }
    }
}

impl<S, C> EventHandler for DeliveryEventHandler<S, C>
where
    S: DeliveryStore + OrderStore + CouponStore + 'static,
    C: Clock + 'static,
{
    fn name(&self) -> &'static str {
        "delivery"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[event_types::PAYMENT_COMPLETED]
    }

    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            match event.domain_event()? {
                DomainEvent::PaymentCompleted(p) => {
                    let order = self.orders.get(p.order_id).await?;
                    self.deliveries.create_for_order(&order).await?;
                    Ok(())
                }
                other => {
                    tracing::debug!(
                        event_type = other.event_type(),
                        "delivery handler ignoring event"
                    );
                    Ok(())
                }
            }
        })
    }
}

/// Consumes `PaymentCompleted` and removes the purchased products from the
/// user's cart. Idempotency is a dedup row per `(handler, event)`, so a
/// replay cannot clear items the user re-added after the purchase.
pub struct CartEventHandler<S, C> {
    carts: Arc<CartService<S>>,
    orders: Arc<OrderService<S, C>>,
    handled: S,
}

impl<S: Clone, C> CartEventHandler<S, C> {
    /// Create the handler.
    pub const fn new(
        carts: Arc<CartService<S>>,
        orders: Arc<OrderService<S, C>>,
        handled: S,
    ) -> Self {
        Self {
            carts,
            orders,
            handled,
        }
    }
}

impl<S, C> EventHandler for CartEventHandler<S, C>
where
    S: CartStore + OrderStore + CouponStore + HandledEventStore + Clone + 'static,
    C: Clock + 'static,
{
    fn name(&self) -> &'static str {
        "cart"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[event_types::PAYMENT_COMPLETED]
    }

    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            match event.domain_event()? {
                DomainEvent::PaymentCompleted(p) => {
                    let fresh = self
                        .handled
                        .try_mark_handled(
                            self.name(),
                            &event.event_type,
                            &event.aggregate_id,
                            event.id,
                        )
                        .await?;
                    if !fresh {
                        return Ok(());
                    }
                    let order = self.orders.get(p.order_id).await?;
                    self.carts.clear_purchased(order.user_id, &order).await?;
                    Ok(())
                }
                other => {
                    tracing::debug!(
                        event_type = other.event_type(),
                        "cart handler ignoring event"
                    );
                    Ok(())
                }
            }
        })
    }
}
