//! Point handler: refunds the point portion of a cancelled order.

use crate::point::PointService;
use std::sync::Arc;
use storefront_core::clock::Clock;
use storefront_core::event::{DomainEvent, event_types};
use storefront_core::handler::{EventHandler, HandlerFuture};
use storefront_core::lock::LockManager;
use storefront_core::outbox::OutboxEvent;
use storefront_core::payment::PaymentStatus;
use storefront_core::store::{BalanceStore, PaymentStore};

/// Consumes `OrderCancelled` and refunds the payment's point portion.
/// Idempotency: the refund is keyed on `(user, order)` — a second refund
/// for the same pair is a no-op inside the service.
pub struct PointEventHandler<S, L, C> {
    points: Arc<PointService<S, L, C>>,
    stores: S,
}

impl<S, L, C> PointEventHandler<S, L, C> {
    /// Create the handler.
    pub const fn new(points: Arc<PointService<S, L, C>>, stores: S) -> Self {
        Self { points, stores }
    }
}

impl<S, L, C> EventHandler for PointEventHandler<S, L, C>
where
    S: BalanceStore + PaymentStore + 'static,
    L: LockManager + Clone + Send + Sync + 'static,
    C: Clock + 'static,
{
    fn name(&self) -> &'static str {
        "point"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[event_types::ORDER_CANCELLED]
    }

    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            match event.domain_event()? {
                DomainEvent::OrderCancelled(p) => {
                    let Some(payment) = self.stores.get_payment_by_order(p.order_id).await? else {
                        // Cancelled before any payment; nothing to refund.
                        return Ok(());
                    };
                    if payment.status != PaymentStatus::Completed || payment.point_amount == 0 {
                        return Ok(());
                    }
                    self.points
                        .refund(p.user_id, payment.point_amount, p.order_id)
                        .await?;
                    Ok(())
                }
                other => {
                    tracing::debug!(
                        event_type = other.event_type(),
                        "point handler ignoring event"
                    );
                    Ok(())
                }
            }
        })
    }
}
