//! Inventory handler: stock deduction on payment, restore on cancel.

use crate::inventory::InventoryService;
use crate::order::OrderService;
use std::sync::Arc;
use storefront_core::clock::Clock;
use storefront_core::event::{DomainEvent, event_types};
use storefront_core::handler::{EventHandler, HandlerFuture};
use storefront_core::outbox::OutboxEvent;
use storefront_core::store::{CouponStore, InventoryStore, OrderStore, OutboxStore};

/// Consumes `PaymentCompleted` (deduct) and `OrderCancelled` (restore).
/// Idempotency is natural uniqueness on the stock movement rows; a
/// shortage publishes `InventoryInsufficient` and still counts as handler
/// success — the order handler turns it into a cancellation.
pub struct InventoryEventHandler<S, C> {
    inventory: Arc<InventoryService<S>>,
    orders: Arc<OrderService<S, C>>,
}

impl<S, C> InventoryEventHandler<S, C> {
    /// Create the handler.
    pub const fn new(inventory: Arc<InventoryService<S>>, orders: Arc<OrderService<S, C>>) -> Self {
        Self { inventory, orders }
    }
}

impl<S, C> EventHandler for InventoryEventHandler<S, C>
where
    S: InventoryStore + OutboxStore + OrderStore + CouponStore + 'static,
    C: Clock + 'static,
{
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[event_types::PAYMENT_COMPLETED, event_types::ORDER_CANCELLED]
    }

    fn handle<'a>(&'a self, event: &'a OutboxEvent) -> HandlerFuture<'a> {
        Box::pin(async move {
            match event.domain_event()? {
                DomainEvent::PaymentCompleted(p) => {
                    let order = self.orders.get(p.order_id).await?;
                    self.inventory
                        .deduct_for_order(&order, p.correlation_id)
                        .await?;
                    Ok(())
                }
                DomainEvent::OrderCancelled(p) => {
                    let order = self.orders.get(p.order_id).await?;
                    self.inventory.restore_for_order(&order).await?;
                    Ok(())
                }
                other => {
                    tracing::debug!(
                        event_type = other.event_type(),
                        "inventory handler ignoring event"
                    );
                    Ok(())
                }
            }
        })
    }
}
