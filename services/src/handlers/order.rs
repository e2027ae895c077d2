//! Order handler: drives order-state transitions from payment, inventory
//! and delivery events. Runs at priority 1.

use crate::handlers::settled_is_ok;
use crate::order::OrderService;
use std::sync::Arc;
use storefront_core::clock::Clock;
use storefront_core::event::{DomainEvent, event_types};
use storefront_core::handler::{EventHandler, HandlerFuture};
use storefront_core::outbox::OutboxEvent;
use storefront_core::store::{CouponStore, OrderStore};

/// Consumes `PaymentCompleted`, `PaymentFailed`, `InventoryInsufficient`
/// and `DeliveryCompleted`. Idempotency is state-compare: a transition
/// whose target already holds is a replay.
pub struct OrderEventHandler<S, C> {
    service: Arc<OrderService<S, C>>,
}

impl<S, C> OrderEventHandler<S, C> {
    /// Create the handler.
    pub const fn new(service: Arc<OrderService<S, C>>) -> Self {
        Self { service }
    }
}

impl<S, C> EventHandler for OrderEventHandler<S, C>
where
    S: OrderStore + CouponStore + 'static,
    C: Clock + 'static,
{
    fn name(&self) -> &'static str {
        "order"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            event_types::PAYMENT_COMPLETED,
            event_types::PAYMENT_FAILED,
            event_types::INVENTORY_INSUFFICIENT,
            event_types::DELIVERY_COMPLETED,
        ]
    }

    fn priority(&self) -> i32 {
        1
    }

    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            match event.domain_event()? {
                DomainEvent::PaymentCompleted(p) => {
                    settled_is_ok(self.service.confirm(p.order_id, p.correlation_id).await)
                }
                DomainEvent::PaymentFailed(p) => settled_is_ok(self.service.fail(p.order_id).await),
                DomainEvent::InventoryInsufficient(p) => settled_is_ok(
                    self.service
                        .cancel(
                            p.order_id,
                            &format!("insufficient stock for product {}", p.product_id),
                            p.correlation_id,
                        )
                        .await,
                ),
                DomainEvent::DeliveryCompleted(p) => {
                    settled_is_ok(self.service.complete(p.order_id, p.correlation_id).await)
                }
                other => {
                    tracing::debug!(event_type = other.event_type(), "order handler ignoring event");
                    Ok(())
                }
            }
        })
    }
}
