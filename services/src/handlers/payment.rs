//! Payment handler: accepts orders for payment.

use crate::handlers::settled_is_ok;
use crate::order::OrderService;
use std::sync::Arc;
use storefront_core::clock::Clock;
use storefront_core::event::{DomainEvent, event_types};
use storefront_core::handler::{EventHandler, HandlerFuture};
use storefront_core::outbox::OutboxEvent;
use storefront_core::store::{CouponStore, OrderStore};

/// Consumes `OrderCreated` and moves the order `PENDING_PAYMENT ->
/// PENDING` ("payment accepted"). The saga performs the same transition
/// inline when the payment request arrives first; whichever runs second
/// sees a replay.
pub struct PaymentEventHandler<S, C> {
    service: Arc<OrderService<S, C>>,
}

impl<S, C> PaymentEventHandler<S, C> {
    /// Create the handler.
    pub const fn new(service: Arc<OrderService<S, C>>) -> Self {
        Self { service }
    }
}

impl<S, C> EventHandler for PaymentEventHandler<S, C>
where
    S: OrderStore + CouponStore + 'static,
    C: Clock + 'static,
{
    fn name(&self) -> &'static str {
        "payment"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[event_types::ORDER_CREATED]
    }

    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            match event.domain_event()? {
                DomainEvent::OrderCreated(p) => {
                    settled_is_ok(self.service.accept_payment(p.order_id).await)
                }
                other => {
                    tracing::debug!(
                        event_type = other.event_type(),
                        "payment handler ignoring event"
                    );
                    Ok(())
                }
            }
        })
    }
}
