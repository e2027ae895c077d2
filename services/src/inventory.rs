//! Inventory service: order-scoped stock deduction with compensation.
//!
//! Shortages are domain outcomes, not handler failures: the service
//! publishes `InventoryInsufficient` (a standalone outbox append — nothing
//! changed in the stock tables) and reports the shortage to the caller,
//! which lets the order handler cancel the order instead of burning the
//! dispatcher's retry budget.

use storefront_core::error::{CommerceError, Result};
use storefront_core::event::{
    DomainEvent, InventoryInsufficientPayload, StockDeductedPayload,
};
use storefront_core::ids::ProductId;
use storefront_core::inventory::{DeductionOutcome, Inventory, RestoreOutcome};
use storefront_core::order::Order;
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::store::{InventoryStore, OutboxStore};
use uuid::Uuid;

/// What a deduction attempt concluded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderStockOutcome {
    /// Every line was covered (now, or by an earlier delivery of the same
    /// event).
    Deducted,
    /// A line was short; `InventoryInsufficient` has been published.
    Insufficient {
        /// The product that ran short.
        product_id: ProductId,
    },
}

/// Owns the inventory aggregate.
pub struct InventoryService<S> {
    stores: S,
}

impl<S> InventoryService<S>
where
    S: InventoryStore + OutboxStore,
{
    /// Create the service.
    pub const fn new(stores: S) -> Self {
        Self { stores }
    }

    /// Stock row for a product.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn get(&self, product_id: ProductId) -> Result<Option<Inventory>> {
        self.stores.get_inventory(product_id).await
    }

    /// Create or reset a stock row.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn set_stock(&self, product_id: ProductId, quantity: i64) -> Result<Inventory> {
        self.stores.upsert_inventory(product_id, quantity).await
    }

    /// Deduct stock for a paid order, all-or-nothing and idempotent via
    /// the movement rows. Publishes one `StockDeducted` per line inside the
    /// deducting transaction, or `InventoryInsufficient` on a shortage.
    ///
    /// # Errors
    ///
    /// Store errors; shortages come back as
    /// [`OrderStockOutcome::Insufficient`], not as errors.
    pub async fn deduct_for_order(
        &self,
        order: &Order,
        correlation_id: Uuid,
    ) -> Result<OrderStockOutcome> {
        let lines: Vec<(ProductId, i64)> = order
            .items
            .iter()
            .map(|item| (item.product_id, i64::from(item.quantity)))
            .collect();

        let mut events = Vec::with_capacity(lines.len());
        for (product_id, quantity) in &lines {
            events.push(NewOutboxEvent::from_domain(&DomainEvent::StockDeducted(
                StockDeductedPayload {
                    order_id: order.id,
                    product_id: *product_id,
                    quantity: *quantity,
                    correlation_id,
                },
            ))?);
        }

        match self.stores.deduct_for_order(order.id, &lines, events).await {
            Ok(DeductionOutcome::Deducted) => {
                tracing::info!(order_id = %order.id, lines = lines.len(), "stock deducted");
                Ok(OrderStockOutcome::Deducted)
            }
            Ok(DeductionOutcome::AlreadyDeducted) => Ok(OrderStockOutcome::Deducted),
            Err(CommerceError::InsufficientStock {
                product_id,
                requested,
                available,
            }) => {
                tracing::warn!(
                    order_id = %order.id,
                    product_id = %product_id,
                    requested,
                    available,
                    "insufficient stock"
                );
                let event = DomainEvent::InventoryInsufficient(InventoryInsufficientPayload {
                    order_id: order.id,
                    product_id,
                    requested,
                    available,
                    correlation_id,
                });
                self.stores
                    .append(NewOutboxEvent::from_domain(&event)?)
                    .await?;
                Ok(OrderStockOutcome::Insufficient { product_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Compensation for a cancelled order: put back exactly what was
    /// deducted. Idempotent; cancelling an order whose stock was never
    /// deducted is a no-op.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn restore_for_order(&self, order: &Order) -> Result<RestoreOutcome> {
        let outcome = self
            .stores
            .restore_for_order(order.id, Vec::new())
            .await?;
        if outcome == RestoreOutcome::Restored {
            tracing::info!(order_id = %order.id, "stock restored");
        }
        Ok(outcome)
    }
}
