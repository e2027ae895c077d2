//! Outbox event handlers — the saga spine.
//!
//! Routing (ordered; the order handler runs first so order-state
//! transitions precede side effects):
//!
//! | Event | Handlers |
//! |---|---|
//! | `OrderCreated` | payment |
//! | `PaymentCompleted` | order(1), inventory, coupon, delivery, cart, notify |
//! | `PaymentFailed` | order |
//! | `InventoryInsufficient` | order |
//! | `OrderCancelled` | inventory, point |
//! | `OrderConfirmed` | stats (batch) |
//! | `DeliveryCompleted` | order |
//! | `CouponRestored` | coupon |
//! | `CouponIssued` | notify |
//! | `OrderCompleted` | notify |
//!
//! Every handler is idempotent (state-compare, dedup rows or natural
//! uniqueness); delivery is at-least-once.

mod coupon;
mod fulfillment;
mod inventory;
mod notify;
mod order;
mod payment;
mod point;
mod stats;

pub use coupon::CouponEventHandler;
pub use fulfillment::{CartEventHandler, DeliveryEventHandler};
pub use inventory::InventoryEventHandler;
pub use notify::NotificationHandler;
pub use order::OrderEventHandler;
pub use payment::PaymentEventHandler;
pub use point::PointEventHandler;
pub use stats::StatsEventHandler;

use storefront_core::error::{CommerceError, Result};
use storefront_core::order::OrderStatus;

/// Map "the order has already moved past this transition" onto a no-op.
///
/// Events can arrive after a later transition already happened (a payment
/// retry succeeding while the earlier `PaymentFailed` is still queued);
/// the aggregate's current state is the truth, so such deliveries are
/// replays, not errors.
fn settled_is_ok<T>(result: Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(CommerceError::InvalidOrderStatus {
            order_id,
            current,
            requested,
        }) if current.is_terminal() || current == OrderStatus::Confirmed => {
            tracing::debug!(
                order_id = %order_id,
                current = %current,
                requested = %requested,
                "transition target already superseded; treating as replay"
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}
