//! Order aggregate: items, amounts and the lifecycle state machine.
//!
//! Orders progress through a restricted DAG:
//!
//! ```text
//! PENDING_PAYMENT --(payment accepted)--> PENDING
//! PENDING         --(payment completed)--> CONFIRMED
//! CONFIRMED       --(fulfilment complete)--> COMPLETED
//! PENDING         --(payment failed)--> FAILED
//! PENDING|CONFIRMED --(cancelled)--> CANCELLED
//! PENDING_PAYMENT --(timeout)--> EXPIRED
//! ```
//!
//! Any other transition fails with
//! [`CommerceError::InvalidOrderStatus`](crate::error::CommerceError).

use crate::error::{CommerceError, Result};
use crate::ids::{CouponId, OrderId, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an order in its lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, awaiting a payment request.
    PendingPayment,
    /// Payment accepted and in flight.
    Pending,
    /// Payment completed; fulfilment in progress.
    Confirmed,
    /// Fulfilment complete. Terminal.
    Completed,
    /// Cancelled by the user or by compensation. Terminal.
    Cancelled,
    /// Payment failed. Terminal.
    Failed,
    /// Payment was never requested in time. Terminal.
    Expired,
}

impl OrderStatus {
    /// Database / wire string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parse from the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] for an unknown status string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING_PAYMENT" => Ok(Self::PendingPayment),
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            "FAILED" => Ok(Self::Failed),
            "EXPIRED" => Ok(Self::Expired),
            _ => Err(CommerceError::Validation {
                message: format!("unknown order status: {s}"),
            }),
        }
    }

    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Failed | Self::Expired
        )
    }

    /// Whether the lifecycle DAG allows `self -> target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::PendingPayment, Self::Pending)
                | (Self::PendingPayment, Self::Expired)
                | (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Confirmed, Self::Completed)
                | (Self::Confirmed, Self::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single line item in an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Product identifier.
    pub product_id: ProductId,
    /// Product name captured at order time.
    pub product_name: String,
    /// Price per unit in minor units.
    pub unit_price: i64,
    /// Quantity ordered.
    pub quantity: u32,
    /// Whether gift wrapping was requested.
    pub gift_wrap: bool,
    /// Gift wrap surcharge in minor units (0 when not wrapped).
    pub gift_wrap_price: i64,
}

impl OrderItem {
    /// Total price for this line: `quantity * unit_price + gift_wrap_price`.
    #[must_use]
    pub const fn total_price(&self) -> i64 {
        self.quantity as i64 * self.unit_price + self.gift_wrap_price
    }
}

/// The order aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Database id.
    pub id: OrderId,
    /// Human-readable order number (e.g. `ORD-20250101-4821`).
    pub order_number: String,
    /// Ordering user.
    pub user_id: UserId,
    /// Sum of item totals.
    pub total_amount: i64,
    /// Coupon discount applied.
    pub discount_amount: i64,
    /// `total_amount - discount_amount`.
    pub final_amount: i64,
    /// Coupons consumed by this order (set semantics, 0..N).
    pub used_coupon_ids: Vec<CouponId>,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Line items.
    pub items: Vec<OrderItem>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validate that `target` is reachable from the current status.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::InvalidOrderStatus`] when the DAG does not
    /// allow the transition.
    pub fn ensure_can_transition_to(&self, target: OrderStatus) -> Result<()> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(CommerceError::InvalidOrderStatus {
                order_id: self.id,
                current: self.status,
                requested: target,
            })
        }
    }
}

/// A validated draft order, ready to be persisted.
///
/// Construct through [`NewOrder::validated`] so the amount invariants hold
/// before any row is written.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    /// Human-readable order number.
    pub order_number: String,
    /// Ordering user.
    pub user_id: UserId,
    /// Sum of item totals.
    pub total_amount: i64,
    /// Coupon discount applied.
    pub discount_amount: i64,
    /// `total_amount - discount_amount`.
    pub final_amount: i64,
    /// Coupons consumed by this order.
    pub used_coupon_ids: Vec<CouponId>,
    /// Line items.
    pub items: Vec<OrderItem>,
}

impl NewOrder {
    /// Build a draft order, enforcing the amount invariants.
    ///
    /// - at least one item, each with positive quantity and non-negative
    ///   prices;
    /// - `total = Σ item.total_price()`;
    /// - `0 ≤ discount ≤ total`;
    /// - `final = total - discount`;
    /// - `used_coupon_ids` behaves as a set (duplicates rejected).
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] when any invariant is violated.
    pub fn validated(
        order_number: String,
        user_id: UserId,
        items: Vec<OrderItem>,
        discount_amount: i64,
        used_coupon_ids: Vec<CouponId>,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(CommerceError::Validation {
                message: "order must contain at least one item".to_string(),
            });
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(CommerceError::Validation {
                    message: format!("item {} has zero quantity", item.product_id),
                });
            }
            if item.unit_price < 0 || item.gift_wrap_price < 0 {
                return Err(CommerceError::Validation {
                    message: format!("item {} has a negative price", item.product_id),
                });
            }
            if !item.gift_wrap && item.gift_wrap_price != 0 {
                return Err(CommerceError::Validation {
                    message: format!(
                        "item {} has a gift wrap price without gift wrap",
                        item.product_id
                    ),
                });
            }
        }

        let total_amount: i64 = items.iter().map(OrderItem::total_price).sum();
        if discount_amount < 0 || discount_amount > total_amount {
            return Err(CommerceError::Validation {
                message: format!(
                    "discount {discount_amount} out of range for total {total_amount}"
                ),
            });
        }

        let mut unique = used_coupon_ids.clone();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() != used_coupon_ids.len() {
            return Err(CommerceError::Validation {
                message: "duplicate coupon in order".to_string(),
            });
        }

        Ok(Self {
            order_number,
            user_id,
            total_amount,
            discount_amount,
            final_amount: total_amount - discount_amount,
            used_coupon_ids,
            items,
        })
    }
}
