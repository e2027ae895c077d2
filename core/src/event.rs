//! Domain events carried through the transactional outbox.
//!
//! Each event is a payload struct serialized to JSON with **stable camelCase
//! field names** — the payload column of the outbox row is part of the
//! external contract. The event type string is stored in its own column and
//! routes the payload back to the right deserializer.
//!
//! Every payload carries a `correlationId` linking all events of one order
//! flow; handlers use it together with the aggregate id for idempotency
//! lookups.

use crate::error::{CommerceError, Result};
use crate::ids::{CouponId, OrderId, ProductId, UserId};
use crate::outbox::AggregateType;
use crate::payment::PaymentMethod;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable event type strings.
pub mod event_types {
    /// An order was created and awaits payment.
    pub const ORDER_CREATED: &str = "OrderCreated";
    /// A payment fully settled.
    pub const PAYMENT_COMPLETED: &str = "PaymentCompleted";
    /// A payment was declined or timed out.
    pub const PAYMENT_FAILED: &str = "PaymentFailed";
    /// Stock could not cover a confirmed order.
    pub const INVENTORY_INSUFFICIENT: &str = "InventoryInsufficient";
    /// An order was cancelled; compensation follows.
    pub const ORDER_CANCELLED: &str = "OrderCancelled";
    /// An order was confirmed after payment.
    pub const ORDER_CONFIRMED: &str = "OrderConfirmed";
    /// An order finished fulfilment.
    pub const ORDER_COMPLETED: &str = "OrderCompleted";
    /// A delivery reached the recipient.
    pub const DELIVERY_COMPLETED: &str = "DeliveryCompleted";
    /// Stock was decremented for an order.
    pub const STOCK_DEDUCTED: &str = "StockDeducted";
    /// A coupon was consumed by an order.
    pub const COUPON_USED: &str = "CouponUsed";
    /// A consumed coupon was restored by compensation.
    pub const COUPON_RESTORED: &str = "CouponRestored";
    /// A coupon issue became durable.
    pub const COUPON_ISSUED: &str = "CouponIssued";
}

/// `OrderCreated` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedPayload {
    /// The new order.
    pub order_id: OrderId,
    /// Human-readable order number.
    pub order_number: String,
    /// Ordering user.
    pub user_id: UserId,
    /// Amount to be paid.
    pub final_amount: i64,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// `PaymentCompleted` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompletedPayload {
    /// The paid order.
    pub order_id: OrderId,
    /// Paying user.
    pub user_id: UserId,
    /// Total amount settled.
    pub amount: i64,
    /// Tender method.
    pub method: PaymentMethod,
    /// Gateway transaction id, when a gateway was involved.
    pub external_txn_id: Option<String>,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// `PaymentFailed` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailedPayload {
    /// The order whose payment failed.
    pub order_id: OrderId,
    /// Paying user.
    pub user_id: UserId,
    /// Failure reason (gateway code, timeout, conflict).
    pub reason: String,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// `InventoryInsufficient` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryInsufficientPayload {
    /// The affected order.
    pub order_id: OrderId,
    /// The product that ran short.
    pub product_id: ProductId,
    /// Requested quantity.
    pub requested: i64,
    /// Quantity actually available.
    pub available: i64,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// `OrderCancelled` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelledPayload {
    /// The cancelled order.
    pub order_id: OrderId,
    /// Ordering user.
    pub user_id: UserId,
    /// Why the order was cancelled.
    pub reason: String,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// A sold line inside `OrderConfirmed`, for analytics consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    /// The product sold.
    pub product_id: ProductId,
    /// Units sold.
    pub quantity: u32,
}

/// `OrderConfirmed` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmedPayload {
    /// The confirmed order.
    pub order_id: OrderId,
    /// Ordering user.
    pub user_id: UserId,
    /// Sold lines.
    pub items: Vec<SaleLine>,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// `OrderCompleted` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompletedPayload {
    /// The completed order.
    pub order_id: OrderId,
    /// Ordering user.
    pub user_id: UserId,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// `DeliveryCompleted` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCompletedPayload {
    /// The delivered order.
    pub order_id: OrderId,
    /// Receiving user.
    pub user_id: UserId,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// `StockDeducted` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDeductedPayload {
    /// The order the stock was deducted for.
    pub order_id: OrderId,
    /// The product.
    pub product_id: ProductId,
    /// Units deducted.
    pub quantity: i64,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// `CouponUsed` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponUsedPayload {
    /// The order that consumed the coupon.
    pub order_id: OrderId,
    /// The holder.
    pub user_id: UserId,
    /// The coupon.
    pub coupon_id: CouponId,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// `CouponRestored` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponRestoredPayload {
    /// The holder.
    pub user_id: UserId,
    /// The coupon.
    pub coupon_id: CouponId,
    /// The cancelled order that had consumed it.
    pub order_id: OrderId,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// `CouponIssued` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponIssuedPayload {
    /// The new holder.
    pub user_id: UserId,
    /// The coupon.
    pub coupon_id: CouponId,
    /// Flow correlation id.
    pub correlation_id: Uuid,
}

/// All domain events the outbox can carry.
#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
    /// An order was created and awaits payment.
    OrderCreated(OrderCreatedPayload),
    /// A payment fully settled.
    PaymentCompleted(PaymentCompletedPayload),
    /// A payment was declined or timed out.
    PaymentFailed(PaymentFailedPayload),
    /// Stock could not cover a confirmed order.
    InventoryInsufficient(InventoryInsufficientPayload),
    /// An order was cancelled.
    OrderCancelled(OrderCancelledPayload),
    /// An order was confirmed after payment.
    OrderConfirmed(OrderConfirmedPayload),
    /// An order finished fulfilment.
    OrderCompleted(OrderCompletedPayload),
    /// A delivery reached the recipient.
    DeliveryCompleted(DeliveryCompletedPayload),
    /// Stock was decremented for an order.
    StockDeducted(StockDeductedPayload),
    /// A coupon was consumed by an order.
    CouponUsed(CouponUsedPayload),
    /// A consumed coupon was restored by compensation.
    CouponRestored(CouponRestoredPayload),
    /// A coupon issue became durable.
    CouponIssued(CouponIssuedPayload),
}

impl DomainEvent {
    /// The stable event type string stored in the outbox row.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::OrderCreated(_) => event_types::ORDER_CREATED,
            Self::PaymentCompleted(_) => event_types::PAYMENT_COMPLETED,
            Self::PaymentFailed(_) => event_types::PAYMENT_FAILED,
            Self::InventoryInsufficient(_) => event_types::INVENTORY_INSUFFICIENT,
            Self::OrderCancelled(_) => event_types::ORDER_CANCELLED,
            Self::OrderConfirmed(_) => event_types::ORDER_CONFIRMED,
            Self::OrderCompleted(_) => event_types::ORDER_COMPLETED,
            Self::DeliveryCompleted(_) => event_types::DELIVERY_COMPLETED,
            Self::StockDeducted(_) => event_types::STOCK_DEDUCTED,
            Self::CouponUsed(_) => event_types::COUPON_USED,
            Self::CouponRestored(_) => event_types::COUPON_RESTORED,
            Self::CouponIssued(_) => event_types::COUPON_ISSUED,
        }
    }

    /// The aggregate that published this event.
    #[must_use]
    pub const fn aggregate_type(&self) -> AggregateType {
        match self {
            Self::OrderCreated(_)
            | Self::OrderCancelled(_)
            | Self::OrderConfirmed(_)
            | Self::OrderCompleted(_) => AggregateType::Order,
            Self::PaymentCompleted(_) | Self::PaymentFailed(_) => AggregateType::Payment,
            Self::InventoryInsufficient(_) | Self::StockDeducted(_) => AggregateType::Inventory,
            Self::CouponUsed(_) | Self::CouponRestored(_) | Self::CouponIssued(_) => {
                AggregateType::Coupon
            }
            Self::DeliveryCompleted(_) => AggregateType::Delivery,
        }
    }

    /// The aggregate id this event belongs to.
    ///
    /// Per-aggregate FIFO of the outbox is defined over this value.
    #[must_use]
    pub fn aggregate_id(&self) -> String {
        match self {
            Self::OrderCreated(p) => p.order_id.to_string(),
            Self::PaymentCompleted(p) => p.order_id.to_string(),
            Self::PaymentFailed(p) => p.order_id.to_string(),
            Self::InventoryInsufficient(p) => p.product_id.to_string(),
            Self::OrderCancelled(p) => p.order_id.to_string(),
            Self::OrderConfirmed(p) => p.order_id.to_string(),
            Self::OrderCompleted(p) => p.order_id.to_string(),
            Self::DeliveryCompleted(p) => p.order_id.to_string(),
            Self::StockDeducted(p) => p.product_id.to_string(),
            Self::CouponUsed(p) => p.coupon_id.to_string(),
            Self::CouponRestored(p) => p.coupon_id.to_string(),
            Self::CouponIssued(p) => p.coupon_id.to_string(),
        }
    }

    /// The correlation id linking all events of one flow.
    #[must_use]
    pub const fn correlation_id(&self) -> Uuid {
        match self {
            Self::OrderCreated(p) => p.correlation_id,
            Self::PaymentCompleted(p) => p.correlation_id,
            Self::PaymentFailed(p) => p.correlation_id,
            Self::InventoryInsufficient(p) => p.correlation_id,
            Self::OrderCancelled(p) => p.correlation_id,
            Self::OrderConfirmed(p) => p.correlation_id,
            Self::OrderCompleted(p) => p.correlation_id,
            Self::DeliveryCompleted(p) => p.correlation_id,
            Self::StockDeducted(p) => p.correlation_id,
            Self::CouponUsed(p) => p.correlation_id,
            Self::CouponRestored(p) => p.correlation_id,
            Self::CouponIssued(p) => p.correlation_id,
        }
    }

    /// Serialize the payload to its JSON wire shape.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Serialization`] if serde fails (practically
    /// unreachable for these payloads).
    pub fn to_payload_json(&self) -> Result<serde_json::Value> {
        let result = match self {
            Self::OrderCreated(p) => serde_json::to_value(p),
            Self::PaymentCompleted(p) => serde_json::to_value(p),
            Self::PaymentFailed(p) => serde_json::to_value(p),
            Self::InventoryInsufficient(p) => serde_json::to_value(p),
            Self::OrderCancelled(p) => serde_json::to_value(p),
            Self::OrderConfirmed(p) => serde_json::to_value(p),
            Self::OrderCompleted(p) => serde_json::to_value(p),
            Self::DeliveryCompleted(p) => serde_json::to_value(p),
            Self::StockDeducted(p) => serde_json::to_value(p),
            Self::CouponUsed(p) => serde_json::to_value(p),
            Self::CouponRestored(p) => serde_json::to_value(p),
            Self::CouponIssued(p) => serde_json::to_value(p),
        };
        result.map_err(|e| CommerceError::Serialization(e.to_string()))
    }

    /// Reconstruct an event from a stored `(event_type, payload)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Serialization`] for an unknown event type or
    /// a payload that does not match the type's shape.
    pub fn from_stored(event_type: &str, payload: &serde_json::Value) -> Result<Self> {
        fn parse<T: serde::de::DeserializeOwned>(payload: &serde_json::Value) -> Result<T> {
            serde_json::from_value(payload.clone())
                .map_err(|e| CommerceError::Serialization(e.to_string()))
        }

        match event_type {
            event_types::ORDER_CREATED => Ok(Self::OrderCreated(parse(payload)?)),
            event_types::PAYMENT_COMPLETED => Ok(Self::PaymentCompleted(parse(payload)?)),
            event_types::PAYMENT_FAILED => Ok(Self::PaymentFailed(parse(payload)?)),
            event_types::INVENTORY_INSUFFICIENT => {
                Ok(Self::InventoryInsufficient(parse(payload)?))
            }
            event_types::ORDER_CANCELLED => Ok(Self::OrderCancelled(parse(payload)?)),
            event_types::ORDER_CONFIRMED => Ok(Self::OrderConfirmed(parse(payload)?)),
            event_types::ORDER_COMPLETED => Ok(Self::OrderCompleted(parse(payload)?)),
            event_types::DELIVERY_COMPLETED => Ok(Self::DeliveryCompleted(parse(payload)?)),
            event_types::STOCK_DEDUCTED => Ok(Self::StockDeducted(parse(payload)?)),
            event_types::COUPON_USED => Ok(Self::CouponUsed(parse(payload)?)),
            event_types::COUPON_RESTORED => Ok(Self::CouponRestored(parse(payload)?)),
            event_types::COUPON_ISSUED => Ok(Self::CouponIssued(parse(payload)?)),
            other => Err(CommerceError::Serialization(format!(
                "unknown event type: {other}"
            ))),
        }
    }
}
