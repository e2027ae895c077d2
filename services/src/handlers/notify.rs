//! Notification handler: forwards completion events to live subscribers.

use crate::notifier::NotifierRegistry;
use std::sync::Arc;
use storefront_core::event::{DomainEvent, event_types};
use storefront_core::handler::{EventHandler, HandlerFuture};
use storefront_core::notify::{Notification, NotificationBus};
use storefront_core::outbox::OutboxEvent;

/// Consumes `PaymentCompleted`, `OrderCompleted` and `CouponIssued` and
/// pushes best-effort notifications: locally through the registry, and to
/// other instances through the bus. Delivery is inherently idempotent for
/// the client (a duplicate toast, at worst), so no dedup is kept.
pub struct NotificationHandler<B> {
    registry: Arc<NotifierRegistry>,
    bus: B,
}

impl<B> NotificationHandler<B> {
    /// Create the handler.
    pub const fn new(registry: Arc<NotifierRegistry>, bus: B) -> Self {
        Self { registry, bus }
    }
}

impl<B> EventHandler for NotificationHandler<B>
where
    B: NotificationBus + 'static,
{
    fn name(&self) -> &'static str {
        "notify"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            event_types::PAYMENT_COMPLETED,
            event_types::ORDER_COMPLETED,
            event_types::COUPON_ISSUED,
        ]
    }

    // Runs after every state-changing handler.
    fn priority(&self) -> i32 {
        200
    }

    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            let notification = match event.domain_event()? {
                DomainEvent::PaymentCompleted(p) => Notification::PaymentCompleted {
                    user_id: p.user_id,
                    order_id: p.order_id,
                    amount: p.amount,
                },
                DomainEvent::OrderCompleted(p) => Notification::OrderCompleted {
                    user_id: p.user_id,
                    order_id: p.order_id,
                },
                DomainEvent::CouponIssued(p) => Notification::CouponIssued {
                    user_id: p.user_id,
                    coupon_id: p.coupon_id,
                },
                other => {
                    tracing::debug!(
                        event_type = other.event_type(),
                        "notification handler ignoring event"
                    );
                    return Ok(());
                }
            };

            self.registry.notify(&notification).await;
            if let Err(e) = self.bus.publish(&notification).await {
                // Cross-instance fan-out is best-effort.
                tracing::warn!(error = %e, "notification bus publish failed");
            }
            Ok(())
        })
    }
}
