//! Delivery creation and cart cleanup — the fulfilment side effects of a
//! completed payment.

use storefront_core::delivery::{Delivery, DeliveryStatus, NewDelivery};
use storefront_core::error::Result;
use storefront_core::event::{DeliveryCompletedPayload, DomainEvent};
use storefront_core::ids::{OrderId, ProductId, UserId};
use storefront_core::order::Order;
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::store::{CartStore, DeliveryStore};
use uuid::Uuid;

/// Owns the delivery aggregate.
pub struct DeliveryService<S> {
    stores: S,
}

impl<S> DeliveryService<S>
where
    S: DeliveryStore,
{
    /// Create the service.
    pub const fn new(stores: S) -> Self {
        Self { stores }
    }

    /// Create the delivery for a paid order. Idempotent on `order_id`
    /// (natural uniqueness), so event redelivery cannot create a second
    /// shipment.
    ///
    /// Address-book lookups are an external collaborator; the recipient
    /// defaults to the account's registered address.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn create_for_order(&self, order: &Order) -> Result<Delivery> {
        let delivery = self
            .stores
            .create_delivery(NewDelivery {
                order_id: order.id,
                user_id: order.user_id,
                recipient: format!("user-{}", order.user_id),
                address: "registered address".to_string(),
            })
            .await?;
        tracing::info!(order_id = %order.id, delivery_id = delivery.id, "delivery created");
        Ok(delivery)
    }

    /// Advance the delivery and, on arrival, publish `DeliveryCompleted`
    /// (which the order handler turns into `CONFIRMED -> COMPLETED`).
    ///
    /// # Errors
    ///
    /// Store errors; `Validation` when the order has no delivery.
    pub async fn update_status(
        &self,
        order_id: OrderId,
        user_id: UserId,
        status: DeliveryStatus,
    ) -> Result<Delivery> {
        let events = if status == DeliveryStatus::Delivered {
            let event = DomainEvent::DeliveryCompleted(DeliveryCompletedPayload {
                order_id,
                user_id,
                correlation_id: Uuid::new_v4(),
            });
            vec![NewOutboxEvent::from_domain(&event)?]
        } else {
            Vec::new()
        };
        self.stores.update_delivery_status(order_id, status, events).await
    }
}

/// Owns the cart rows.
pub struct CartService<S> {
    stores: S,
}

impl<S> CartService<S>
where
    S: CartStore,
{
    /// Create the service.
    pub const fn new(stores: S) -> Self {
        Self { stores }
    }

    /// Remove the purchased products from the user's cart. Removal of
    /// absent rows is a no-op, so the operation is naturally idempotent.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn clear_purchased(&self, user_id: UserId, order: &Order) -> Result<u64> {
        let product_ids: Vec<ProductId> =
            order.items.iter().map(|item| item.product_id).collect();
        let removed = self.stores.remove_items(user_id, &product_ids).await?;
        if removed > 0 {
            tracing::info!(user_id = %user_id, removed, "cart items cleared after purchase");
        }
        Ok(removed)
    }
}
