//! Coupon aggregate: limited-quantity discount coupons and per-user issues.

use crate::error::{CommerceError, Result};
use crate::ids::{CouponId, OrderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a coupon discounts an order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// Fixed amount off, in minor units.
    Fixed,
    /// Percentage off the order total.
    Percentage,
}

impl DiscountType {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "FIXED",
            Self::Percentage => "PERCENTAGE",
        }
    }

    /// Parse from the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] for an unknown type string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "FIXED" => Ok(Self::Fixed),
            "PERCENTAGE" => Ok(Self::Percentage),
            _ => Err(CommerceError::Validation {
                message: format!("unknown discount type: {s}"),
            }),
        }
    }
}

/// A limited-quantity coupon definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    /// Database id.
    pub id: CouponId,
    /// Unique human-facing code.
    pub code: String,
    /// Discount mode.
    pub discount_type: DiscountType,
    /// Fixed amount (minor units) or percentage, per `discount_type`.
    pub discount_value: i64,
    /// Minimum order total required to use this coupon.
    pub min_order_amount: i64,
    /// Total quantity available for issue.
    pub total_quantity: i64,
    /// Quantity issued so far; `0 ..= total_quantity`.
    pub issued_quantity: i64,
    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,
    /// End of the validity window.
    pub valid_to: DateTime<Utc>,
    /// Optimistic version.
    pub version: i64,
}

impl Coupon {
    /// Whether the coupon can currently be issued or used.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_to
    }

    /// Remaining issuable quantity.
    #[must_use]
    pub const fn remaining(&self) -> i64 {
        self.total_quantity - self.issued_quantity
    }

    /// Discount this coupon grants on an order of `order_total`.
    ///
    /// Percentage discounts round down; the discount never exceeds the
    /// order total.
    #[must_use]
    pub fn discount_for(&self, order_total: i64) -> i64 {
        let raw = match self.discount_type {
            DiscountType::Fixed => self.discount_value,
            DiscountType::Percentage => order_total * self.discount_value / 100,
        };
        raw.min(order_total)
    }

    /// Check that this coupon may be applied to an order of `order_total`
    /// at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::CouponNotUsable`] outside the validity
    /// window or below the minimum order amount.
    pub fn ensure_usable(&self, order_total: i64, now: DateTime<Utc>) -> Result<()> {
        if !self.is_active_at(now) {
            return Err(CommerceError::CouponNotUsable {
                coupon_id: self.id,
                reason: "outside validity window".to_string(),
            });
        }
        if order_total < self.min_order_amount {
            return Err(CommerceError::CouponNotUsable {
                coupon_id: self.id,
                reason: format!(
                    "order total {order_total} below minimum {}",
                    self.min_order_amount
                ),
            });
        }
        Ok(())
    }
}

/// Status of a coupon held by a user.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserCouponStatus {
    /// Issued and available.
    Issued,
    /// Consumed by an order.
    Used,
    /// Expired unused.
    Expired,
}

impl UserCouponStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Issued => "ISSUED",
            Self::Used => "USED",
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
            "ISSUED" => Ok(Self::Issued),
            "USED" => Ok(Self::Used),
            "EXPIRED" => Ok(Self::Expired),
            _ => Err(CommerceError::Validation {
                message: format!("unknown user coupon status: {s}"),
            }),
        }
    }
}

impl fmt::Display for UserCouponStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A coupon held by a user. At most one active (ISSUED) row exists per
/// `(user_id, coupon_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserCoupon {
    /// Database id.
    pub id: i64,
    /// Holder.
    pub user_id: UserId,
    /// Coupon definition.
    pub coupon_id: CouponId,
    /// Current status.
    pub status: UserCouponStatus,
    /// The order that consumed this coupon, when USED.
    pub used_order_id: Option<OrderId>,
    /// When the coupon was issued to the user.
    pub issued_at: DateTime<Utc>,
    /// When the coupon was used, if ever.
    pub used_at: Option<DateTime<Utc>>,
}

/// Outcome of a coupon issuance admission attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionOutcome {
    /// Admitted; durable issue will follow asynchronously.
    Accepted {
        /// 1-based admission position (the counter value observed).
        position: i64,
    },
    /// The user already holds (or was already admitted for) this coupon.
    AlreadyIssued,
    /// All coupons were admitted before this request.
    SoldOut,
}

/// An admitted user waiting in the issue queue for the durable write.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedIssue {
    /// The admitted user.
    pub user_id: UserId,
    /// Queue score: acceptance timestamp in epoch milliseconds. Preserved
    /// across re-queues so FIFO order survives drain failures.
    pub score: f64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn coupon(discount_type: DiscountType, value: i64) -> Coupon {
        Coupon {
            id: CouponId::new(7),
            code: "WELCOME".to_string(),
            discount_type,
            discount_value: value,
            min_order_amount: 10_000,
            total_quantity: 100,
            issued_quantity: 0,
            valid_from: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            valid_to: Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap(),
            version: 0,
        }
    }

    #[test]
    fn fixed_discount_is_capped_at_total() {
        let c = coupon(DiscountType::Fixed, 5_000);
        assert_eq!(c.discount_for(20_000), 5_000);
        assert_eq!(c.discount_for(3_000), 3_000);
    }

    #[test]
    fn percentage_discount_rounds_down() {
        let c = coupon(DiscountType::Percentage, 10);
        assert_eq!(c.discount_for(10_050), 1_005);
        assert_eq!(c.discount_for(999), 99);
    }

    #[test]
    fn usability_checks_window_and_minimum() {
        let c = coupon(DiscountType::Fixed, 5_000);
        let inside = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        assert!(c.ensure_usable(10_000, inside).is_ok());
        assert_eq!(
            c.ensure_usable(10_000, outside).unwrap_err().code(),
            "COUPON004"
        );
        assert_eq!(
            c.ensure_usable(5_000, inside).unwrap_err().code(),
            "COUPON004"
        );
    }

    #[test]
    fn admission_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(AdmissionOutcome::Accepted { position: 3 }).unwrap();
        assert_eq!(json["status"], "ACCEPTED");
        assert_eq!(json["position"], 3);
        let json = serde_json::to_value(AdmissionOutcome::SoldOut).unwrap();
        assert_eq!(json["status"], "SOLD_OUT");
    }
}
