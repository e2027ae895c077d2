//! Error taxonomy for the Storefront backend.
//!
//! Every failure in the system maps to one variant of [`CommerceError`].
//! Each variant carries a **stable machine code** (`code()`) and a
//! machine-readable data map (`data()`); the HTTP layer translates those into
//! `{success:false, error:{code, message, data}}` bodies. The codes are the
//! contract — message text is free to change.
//!
//! # Kinds
//!
//! - **Validation** — caller input violates a domain invariant. Never retried.
//! - **Concurrency conflict** — optimistic version miss or lock timeout.
//!   Locally retryable with jittered backoff.
//! - **External dependency failure** — payment gateway non-success or
//!   timeout. Triggers saga compensation, not retried within the request.
//! - **Infrastructure** — durable/memory store unavailable. Bubbles up; the
//!   outbox dispatcher keeps retrying until the event lands in the DLQ.

use crate::ids::{CouponId, OrderId, ProductId, UserId};
use crate::order::OrderStatus;
use serde_json::json;
use thiserror::Error;

/// Result type alias for Storefront operations.
pub type Result<T> = std::result::Result<T, CommerceError>;

/// Comprehensive error taxonomy for the Storefront backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommerceError {
    // ═══════════════════════════════════════════════════════════
    // Point errors
    // ═══════════════════════════════════════════════════════════
    /// Point balance is lower than the requested use amount.
    #[error("insufficient point balance: have {balance}, need {requested}")]
    InsufficientBalance {
        /// Current balance in minor units.
        balance: i64,
        /// Requested use amount in minor units.
        requested: i64,
    },

    /// Charging would push the balance above the maximum.
    #[error("maximum balance exceeded: {balance} + {requested} > {max}")]
    MaxBalanceExceeded {
        /// Current balance.
        balance: i64,
        /// Requested charge amount.
        requested: i64,
        /// Maximum balance allowed.
        max: i64,
    },

    /// Charge or use amount violates the amount rules (range or unit).
    #[error("invalid point amount: {amount}")]
    InvalidPointAmount {
        /// The offending amount.
        amount: i64,
    },

    /// No point balance row exists for the user.
    #[error("point balance not found for user {user_id}")]
    UserPointNotFound {
        /// The user in question.
        user_id: UserId,
    },

    /// Use amount is below the minimum.
    #[error("use amount {amount} is below the minimum {minimum}")]
    MinimumUseAmount {
        /// The offending amount.
        amount: i64,
        /// The minimum use amount.
        minimum: i64,
    },

    /// The user's daily point-use limit would be exceeded.
    #[error("daily point use limit exceeded: {used_today} + {requested} > {limit}")]
    DailyLimitExceeded {
        /// Amount already used today.
        used_today: i64,
        /// Requested use amount.
        requested: i64,
        /// The daily limit.
        limit: i64,
    },

    // ═══════════════════════════════════════════════════════════
    // Payment errors
    // ═══════════════════════════════════════════════════════════
    /// Point amount plus gateway amount does not equal the order total.
    #[error("payment amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch {
        /// The order's final amount.
        expected: i64,
        /// Sum of the tendered amounts.
        actual: i64,
    },

    /// Balance is insufficient for the point portion of a payment.
    #[error("insufficient balance for payment: have {balance}, need {requested}")]
    PaymentBalanceInsufficient {
        /// Current balance.
        balance: i64,
        /// Point portion requested.
        requested: i64,
    },

    /// The external payment gateway declined or timed out.
    #[error("payment gateway failed: {reason}")]
    GatewayFailed {
        /// Gateway error code or timeout description.
        reason: String,
    },

    /// A completed payment already exists for this order.
    #[error("order {order_id} is already paid")]
    AlreadyPaidOrder {
        /// The order in question.
        order_id: OrderId,
    },

    // ═══════════════════════════════════════════════════════════
    // User / order errors
    // ═══════════════════════════════════════════════════════════
    /// User does not exist.
    #[error("user {user_id} not found")]
    UserNotFound {
        /// The user in question.
        user_id: UserId,
    },

    /// Order does not exist.
    #[error("order {order_id} not found")]
    OrderNotFound {
        /// The order in question.
        order_id: OrderId,
    },

    /// The requested status transition is not in the order lifecycle DAG.
    #[error("invalid order status transition for order {order_id}: {current} -> {requested}")]
    InvalidOrderStatus {
        /// The order in question.
        order_id: OrderId,
        /// Current order status.
        current: OrderStatus,
        /// The transition target.
        requested: OrderStatus,
    },

    // ═══════════════════════════════════════════════════════════
    // Coupon errors
    // ═══════════════════════════════════════════════════════════
    /// Coupon does not exist.
    #[error("coupon {coupon_id} not found")]
    CouponNotFound {
        /// The coupon in question.
        coupon_id: CouponId,
    },

    /// All coupons of this code have been issued.
    #[error("coupon {coupon_id} is sold out")]
    CouponSoldOut {
        /// The coupon in question.
        coupon_id: CouponId,
    },

    /// The user already holds this coupon.
    #[error("coupon {coupon_id} already issued to user {user_id}")]
    CouponAlreadyIssued {
        /// The coupon in question.
        coupon_id: CouponId,
        /// The holder.
        user_id: UserId,
    },

    /// Coupon exists but cannot be used (expired, wrong state, below minimum).
    #[error("coupon {coupon_id} not usable: {reason}")]
    CouponNotUsable {
        /// The coupon in question.
        coupon_id: CouponId,
        /// Why it cannot be used.
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Inventory errors
    // ═══════════════════════════════════════════════════════════
    /// Not enough stock to satisfy the requested quantity.
    #[error("insufficient stock for product {product_id}: need {requested}, have {available}")]
    InsufficientStock {
        /// The product in question.
        product_id: ProductId,
        /// Requested quantity.
        requested: i64,
        /// Available quantity.
        available: i64,
    },

    // ═══════════════════════════════════════════════════════════
    // Concurrency and outbox errors
    // ═══════════════════════════════════════════════════════════
    /// Optimistic version check affected zero rows.
    #[error("concurrent modification detected on {resource}")]
    ConcurrencyConflict {
        /// Which resource conflicted (for logs and error data).
        resource: String,
    },

    /// Distributed lock could not be acquired within the wait timeout.
    #[error("lock acquisition timed out for key {key}")]
    LockTimeout {
        /// The lock key.
        key: String,
    },

    /// The outbox event was already marked processed.
    #[error("outbox event {event_id} already processed")]
    AlreadyProcessed {
        /// The outbox row id.
        event_id: i64,
    },

    /// Generic caller-input validation failure.
    #[error("validation failed: {message}")]
    Validation {
        /// Human-readable description.
        message: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Infrastructure errors
    // ═══════════════════════════════════════════════════════════
    /// Durable store (database) failure.
    #[error("store error: {0}")]
    Store(String),

    /// Memory store (key/value) failure.
    #[error("memory store error: {0}")]
    MemoryStore(String),

    /// Serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CommerceError {
    /// Stable machine code for this error.
    ///
    /// These codes are part of the external contract and must not change.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InsufficientBalance { .. } => "POINT001",
            Self::MaxBalanceExceeded { .. } => "POINT002",
            Self::InvalidPointAmount { .. } => "POINT003",
            Self::UserPointNotFound { .. } => "POINT004",
            Self::MinimumUseAmount { .. } => "POINT005",
            Self::AmountMismatch { .. } => "PAYMENT001",
            Self::PaymentBalanceInsufficient { .. } => "PAYMENT002",
            Self::GatewayFailed { .. } => "PAYMENT003",
            Self::AlreadyPaidOrder { .. } => "PAYMENT004",
            Self::DailyLimitExceeded { .. } => "PAYMENT005",
            Self::UserNotFound { .. } => "USER001",
            Self::OrderNotFound { .. } => "ORDER001",
            Self::InvalidOrderStatus { .. } => "ORDER002",
            Self::CouponNotFound { .. } => "COUPON001",
            Self::CouponSoldOut { .. } => "COUPON002",
            Self::CouponAlreadyIssued { .. } => "COUPON003",
            Self::CouponNotUsable { .. } => "COUPON004",
            Self::InsufficientStock { .. } => "INVENTORY001",
            Self::ConcurrencyConflict { .. } => "CONFLICT001",
            Self::LockTimeout { .. } => "LOCK001",
            Self::AlreadyProcessed { .. } => "OUTBOX001",
            Self::Validation { .. } => "VALIDATION001",
            Self::Store(_) => "STORE001",
            Self::MemoryStore(_) => "MEMSTORE001",
            Self::Serialization(_) => "SERDE001",
        }
    }

    /// Machine-readable data map attached to the error.
    ///
    /// Keys are camelCase to match the wire format of the API error body.
    #[must_use]
    pub fn data(&self) -> serde_json::Value {
        match self {
            Self::InsufficientBalance { balance, requested }
            | Self::PaymentBalanceInsufficient { balance, requested } => json!({
                "currentBalance": balance,
                "useAmount": requested,
            }),
            Self::MaxBalanceExceeded {
                balance,
                requested,
                max,
            } => json!({
                "currentBalance": balance,
                "chargeAmount": requested,
                "maxBalance": max,
            }),
            Self::InvalidPointAmount { amount } => json!({ "amount": amount }),
            Self::UserPointNotFound { user_id } => json!({ "userId": user_id }),
            Self::MinimumUseAmount { amount, minimum } => json!({
                "amount": amount,
                "minimum": minimum,
            }),
            Self::DailyLimitExceeded {
                used_today,
                requested,
                limit,
            } => json!({
                "usedToday": used_today,
                "useAmount": requested,
                "dailyLimit": limit,
            }),
            Self::AmountMismatch { expected, actual } => json!({
                "expectedAmount": expected,
                "actualAmount": actual,
            }),
            Self::GatewayFailed { reason } => json!({ "reason": reason }),
            Self::AlreadyPaidOrder { order_id } | Self::OrderNotFound { order_id } => {
                json!({ "orderId": order_id })
            }
            Self::UserNotFound { user_id } => json!({ "userId": user_id }),
            Self::InvalidOrderStatus {
                order_id,
                current,
                requested,
            } => json!({
                "orderId": order_id,
                "currentStatus": current.as_str(),
                "requestedStatus": requested.as_str(),
            }),
            Self::CouponNotFound { coupon_id } | Self::CouponSoldOut { coupon_id } => {
                json!({ "couponId": coupon_id })
            }
            Self::CouponAlreadyIssued { coupon_id, user_id } => json!({
                "couponId": coupon_id,
                "userId": user_id,
            }),
            Self::CouponNotUsable { coupon_id, reason } => json!({
                "couponId": coupon_id,
                "reason": reason,
            }),
            Self::InsufficientStock {
                product_id,
                requested,
                available,
            } => json!({
                "productId": product_id,
                "requested": requested,
                "available": available,
            }),
            Self::ConcurrencyConflict { resource } => json!({ "resource": resource }),
            Self::LockTimeout { key } => json!({ "key": key }),
            Self::AlreadyProcessed { event_id } => json!({ "eventId": event_id }),
            Self::Validation { .. }
            | Self::Store(_)
            | Self::MemoryStore(_)
            | Self::Serialization(_) => json!({}),
        }
    }

    /// Whether a local retry with backoff may resolve this error.
    #[must_use]
    pub const fn is_retryable_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = CommerceError::InsufficientBalance {
            balance: 10_000,
            requested: 20_000,
        };
        assert_eq!(err.code(), "POINT001");

        let err = CommerceError::GatewayFailed {
            reason: "DECLINED".to_string(),
        };
        assert_eq!(err.code(), "PAYMENT003");

        let err = CommerceError::DailyLimitExceeded {
            used_today: 900_000,
            requested: 200_000,
            limit: 1_000_000,
        };
        assert_eq!(err.code(), "PAYMENT005");
    }

    #[test]
    fn data_map_uses_camel_case_keys() {
        let err = CommerceError::InsufficientBalance {
            balance: 10_000,
            requested: 20_000,
        };
        let data = err.data();
        assert_eq!(data["currentBalance"], 10_000);
        assert_eq!(data["useAmount"], 20_000);
    }

    #[test]
    fn only_version_conflicts_are_retryable() {
        assert!(
            CommerceError::ConcurrencyConflict {
                resource: "balance:1".to_string()
            }
            .is_retryable_conflict()
        );
        assert!(
            !CommerceError::Validation {
                message: "bad".to_string()
            }
            .is_retryable_conflict()
        );
    }
}
