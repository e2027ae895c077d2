//! Payment aggregate and the atomic completion bundle for the payment saga.

use crate::error::{CommerceError, Result};
use crate::ids::{OrderId, UserId};
use crate::order::OrderStatus;
use crate::outbox::NewOutboxEvent;
use crate::point::NewBalanceHistory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tender method of a payment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// External gateway, card.
    Card,
    /// External gateway, bank transfer.
    BankTransfer,
    /// Stored point balance only.
    Balance,
    /// Stored balance plus external gateway.
    Mixed,
}

impl PaymentMethod {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "CARD",
            Self::BankTransfer => "BANK_TRANSFER",
            Self::Balance => "BALANCE",
            Self::Mixed => "MIXED",
        }
    }

    /// Parse from the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] for an unknown method string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "CARD" => Ok(Self::Card),
            "BANK_TRANSFER" => Ok(Self::BankTransfer),
            "BALANCE" => Ok(Self::Balance),
            "MIXED" => Ok(Self::Mixed),
            _ => Err(CommerceError::Validation {
                message: format!("unknown payment method: {s}"),
            }),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a payment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Created, not yet settled.
    Pending,
    /// Gateway call in flight.
    Processing,
    /// Fully settled.
    Completed,
    /// Declined or timed out.
    Failed,
    /// Reversed by compensation.
    Cancelled,
}

impl PaymentStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parse from the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] for an unknown status string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(CommerceError::Validation {
                message: format!("unknown payment status: {s}"),
            }),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment row. One per order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Database id.
    pub id: i64,
    /// The paid order.
    pub order_id: OrderId,
    /// Paying user.
    pub user_id: UserId,
    /// Tender method.
    pub method: PaymentMethod,
    /// Current status.
    pub status: PaymentStatus,
    /// Gateway transaction id, present once the gateway approved.
    pub external_txn_id: Option<String>,
    /// Total amount settled (minor units).
    pub amount: i64,
    /// Portion settled from the point balance.
    pub point_amount: i64,
    /// Portion settled through the external gateway.
    pub gateway_amount: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Settlement time, when COMPLETED.
    pub paid_at: Option<DateTime<Utc>>,
}

/// A payment row to insert.
#[derive(Clone, Debug, PartialEq)]
pub struct NewPayment {
    /// The paid order.
    pub order_id: OrderId,
    /// Paying user.
    pub user_id: UserId,
    /// Tender method.
    pub method: PaymentMethod,
    /// Status to insert with.
    pub status: PaymentStatus,
    /// Gateway transaction id, when already approved.
    pub external_txn_id: Option<String>,
    /// Total amount.
    pub amount: i64,
    /// Point portion.
    pub point_amount: i64,
    /// Gateway portion.
    pub gateway_amount: i64,
}

impl NewPayment {
    /// Validate the tender split: both portions non-negative and summing to
    /// the total.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] when the split is inconsistent.
    pub fn validated(self) -> Result<Self> {
        if self.point_amount < 0 || self.gateway_amount < 0 {
            return Err(CommerceError::Validation {
                message: "tender amounts must be non-negative".to_string(),
            });
        }
        if self.point_amount + self.gateway_amount != self.amount {
            return Err(CommerceError::Validation {
                message: format!(
                    "tender split {} + {} does not equal total {}",
                    self.point_amount, self.gateway_amount, self.amount
                ),
            });
        }
        Ok(self)
    }
}

/// Guarded balance debit inside a payment completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceDebit {
    /// The user whose balance is debited.
    pub user_id: UserId,
    /// Debit amount (positive, minor units).
    pub amount: i64,
    /// Version observed before the gateway call; the debit only applies if
    /// the row is still at this version.
    pub expected_version: i64,
}

/// Everything the payment saga commits atomically after a successful
/// gateway call: the balance debit, its history row, the COMPLETED payment
/// row, the order transition and the outbox events, in one transaction.
///
/// Stores implementing
/// [`PaymentStore::complete_payment`](crate::store::PaymentStore::complete_payment) must
/// apply all parts or none, and must fail with
/// [`CommerceError::ConcurrencyConflict`] when the balance version guard
/// misses.
#[derive(Clone, Debug)]
pub struct PaymentCompletion {
    /// The COMPLETED payment row to insert.
    pub payment: NewPayment,
    /// Balance debit with optimistic guard; `None` for gateway-only tenders.
    pub debit: Option<BalanceDebit>,
    /// USE history row matching the debit; `None` iff `debit` is `None`.
    pub history: Option<NewBalanceHistory>,
    /// The order to transition.
    pub order_id: OrderId,
    /// Expected current order status (guard).
    pub order_from: OrderStatus,
    /// Target order status.
    pub order_to: OrderStatus,
    /// Outbox events to co-write (`PaymentCompleted`, `OrderConfirmed`).
    pub events: Vec<NewOutboxEvent>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tender_split_must_sum_to_total() {
        let payment = NewPayment {
            order_id: OrderId::new(1),
            user_id: UserId::new(1),
            method: PaymentMethod::Mixed,
            status: PaymentStatus::Completed,
            external_txn_id: Some("toss_1".to_string()),
            amount: 35_000,
            point_amount: 20_000,
            gateway_amount: 15_000,
        };
        assert!(payment.clone().validated().is_ok());

        let bad = NewPayment {
            gateway_amount: 10_000,
            ..payment
        };
        assert!(bad.validated().is_err());
    }

    #[test]
    fn status_roundtrip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn method_roundtrip() {
        for method in [
            PaymentMethod::Card,
            PaymentMethod::BankTransfer,
            PaymentMethod::Balance,
            PaymentMethod::Mixed,
        ] {
            assert_eq!(PaymentMethod::parse(method.as_str()).unwrap(), method);
        }
    }
}
