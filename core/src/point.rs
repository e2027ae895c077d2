//! Point balance aggregate: per-user balance with an immutable audit trail.
//!
//! The balance only ever changes together with a matching
//! [`BalanceHistory`] row and a version increment; the repository contract
//! ([`crate::store::BalanceStore::apply_balance_change`]) makes that atomicity explicit.

use crate::error::{CommerceError, Result};
use crate::ids::{OrderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum single charge amount (minor units).
pub const MIN_CHARGE_AMOUNT: i64 = 1_000;
/// Maximum single charge amount (minor units).
pub const MAX_CHARGE_AMOUNT: i64 = 1_000_000;
/// Charges and uses must be multiples of this unit.
pub const AMOUNT_UNIT: i64 = 100;
/// Minimum single use amount (minor units).
pub const MIN_USE_AMOUNT: i64 = 100;
/// Ceiling for any user balance.
pub const MAX_BALANCE: i64 = 10_000_000;
/// Maximum total USE amount per user per UTC day.
pub const DAILY_USE_LIMIT: i64 = 1_000_000;

/// Per-user point balance singleton.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    /// Owning user.
    pub user_id: UserId,
    /// Current balance in minor units, `0 ..= MAX_BALANCE`.
    pub balance: i64,
    /// Monotonic version, incremented on every change.
    pub version: i64,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Classification of a balance change.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceHistoryType {
    /// Balance increased by a charge.
    Earn,
    /// Balance decreased by a use (payment or deduct).
    Use,
    /// Balance decreased by expiry.
    Expire,
    /// Balance increased by a refund.
    Refund,
}

impl BalanceHistoryType {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Earn => "EARN",
            Self::Use => "USE",
            Self::Expire => "EXPIRE",
            Self::Refund => "REFUND",
        }
    }

    /// Parse from the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] for an unknown type string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "EARN" => Ok(Self::Earn),
            "USE" => Ok(Self::Use),
            "EXPIRE" => Ok(Self::Expire),
            "REFUND" => Ok(Self::Refund),
            _ => Err(CommerceError::Validation {
                message: format!("unknown balance history type: {s}"),
            }),
        }
    }
}

impl fmt::Display for BalanceHistoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable audit row for a balance change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceHistory {
    /// Database id.
    pub id: i64,
    /// Owning user.
    pub user_id: UserId,
    /// Signed amount: positive for EARN/REFUND, negative for USE/EXPIRE.
    pub amount: i64,
    /// Change classification.
    pub history_type: BalanceHistoryType,
    /// Balance before the change.
    pub balance_before: i64,
    /// Balance after the change; `balance_after = balance_before + amount`.
    pub balance_after: i64,
    /// Related order, when the change was payment-driven.
    pub order_id: Option<OrderId>,
    /// Human-readable description.
    pub description: String,
    /// When the change happened.
    pub created_at: DateTime<Utc>,
}

/// A validated balance change, ready to be applied atomically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBalanceHistory {
    /// Owning user.
    pub user_id: UserId,
    /// Signed amount.
    pub amount: i64,
    /// Change classification.
    pub history_type: BalanceHistoryType,
    /// Balance before the change.
    pub balance_before: i64,
    /// Balance after the change.
    pub balance_after: i64,
    /// Related order, when payment-driven.
    pub order_id: Option<OrderId>,
    /// Human-readable description.
    pub description: String,
}

impl NewBalanceHistory {
    /// Build a history row, enforcing the conservation invariant
    /// `balance_after == balance_before + amount` and non-negativity of the
    /// resulting balance.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] when the arithmetic does not
    /// hold, or when the sign of `amount` contradicts `history_type`.
    pub fn validated(
        user_id: UserId,
        amount: i64,
        history_type: BalanceHistoryType,
        balance_before: i64,
        order_id: Option<OrderId>,
        description: String,
    ) -> Result<Self> {
        let balance_after = balance_before + amount;
        if balance_after < 0 {
            return Err(CommerceError::Validation {
                message: format!("balance would go negative: {balance_before} + {amount}"),
            });
        }
        let sign_ok = match history_type {
            BalanceHistoryType::Earn | BalanceHistoryType::Refund => amount > 0,
            BalanceHistoryType::Use | BalanceHistoryType::Expire => amount < 0,
        };
        if !sign_ok {
            return Err(CommerceError::Validation {
                message: format!("amount {amount} has the wrong sign for {history_type}"),
            });
        }
        Ok(Self {
            user_id,
            amount,
            history_type,
            balance_before,
            balance_after,
            order_id,
            description,
        })
    }
}

/// Validate a charge amount against the amount rules.
///
/// # Errors
///
/// Returns [`CommerceError::InvalidPointAmount`] when the amount is out of
/// `[MIN_CHARGE_AMOUNT, MAX_CHARGE_AMOUNT]` or not a multiple of
/// [`AMOUNT_UNIT`].
pub const fn validate_charge_amount(amount: i64) -> Result<()> {
    if amount < MIN_CHARGE_AMOUNT || amount > MAX_CHARGE_AMOUNT || amount % AMOUNT_UNIT != 0 {
        return Err(CommerceError::InvalidPointAmount { amount });
    }
    Ok(())
}

/// Validate a use amount against the amount rules.
///
/// # Errors
///
/// Returns [`CommerceError::MinimumUseAmount`] below the minimum and
/// [`CommerceError::InvalidPointAmount`] off the unit grid.
pub const fn validate_use_amount(amount: i64) -> Result<()> {
    if amount < MIN_USE_AMOUNT {
        return Err(CommerceError::MinimumUseAmount {
            amount,
            minimum: MIN_USE_AMOUNT,
        });
    }
    if amount % AMOUNT_UNIT != 0 {
        return Err(CommerceError::InvalidPointAmount { amount });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn history_enforces_conservation() {
        let h = NewBalanceHistory::validated(
            UserId::new(1),
            -20_000,
            BalanceHistoryType::Use,
            50_000,
            Some(OrderId::new(1)),
            "payment".to_string(),
        )
        .unwrap();
        assert_eq!(h.balance_after, 30_000);
    }

    #[test]
    fn history_rejects_negative_result() {
        let err = NewBalanceHistory::validated(
            UserId::new(1),
            -60_000,
            BalanceHistoryType::Use,
            50_000,
            None,
            "payment".to_string(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION001");
    }

    #[test]
    fn history_rejects_wrong_sign() {
        assert!(
            NewBalanceHistory::validated(
                UserId::new(1),
                1_000,
                BalanceHistoryType::Use,
                0,
                None,
                String::new(),
            )
            .is_err()
        );
        assert!(
            NewBalanceHistory::validated(
                UserId::new(1),
                -1_000,
                BalanceHistoryType::Earn,
                5_000,
                None,
                String::new(),
            )
            .is_err()
        );
    }

    #[test]
    fn charge_amount_rules() {
        assert!(validate_charge_amount(1_000).is_ok());
        assert!(validate_charge_amount(1_000_000).is_ok());
        assert!(validate_charge_amount(999).is_err());
        assert!(validate_charge_amount(1_000_100 - 50).is_err());
        assert!(validate_charge_amount(1_000_001).is_err());
    }

    #[test]
    fn use_amount_rules() {
        assert!(validate_use_amount(100).is_ok());
        assert!(validate_use_amount(20_000).is_ok());
        let err = validate_use_amount(50).unwrap_err();
        assert_eq!(err.code(), "POINT005");
        let err = validate_use_amount(150).unwrap_err();
        assert_eq!(err.code(), "POINT003");
    }
}
