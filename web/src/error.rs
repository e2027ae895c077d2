//! Error-to-HTTP translation.
//!
//! Domain errors carry stable machine codes; this module maps them onto
//! status codes and the `{"success": false, "error": {...}}` body shape.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use storefront_core::CommerceError;

/// Wrapper turning [`CommerceError`] into an HTTP response.
#[derive(Debug)]
pub struct AppError(pub CommerceError);

impl From<CommerceError> for AppError {
    fn from(e: CommerceError) -> Self {
        Self(e)
    }
}

/// Status mapping for the stable error codes.
#[must_use]
pub fn status_for(error: &CommerceError) -> StatusCode {
    match error {
        CommerceError::InsufficientBalance { .. }
        | CommerceError::PaymentBalanceInsufficient { .. }
        | CommerceError::AlreadyPaidOrder { .. }
        | CommerceError::InvalidOrderStatus { .. }
        | CommerceError::CouponSoldOut { .. }
        | CommerceError::CouponAlreadyIssued { .. }
        | CommerceError::InsufficientStock { .. }
        | CommerceError::ConcurrencyConflict { .. }
        | CommerceError::LockTimeout { .. } => StatusCode::CONFLICT,

        CommerceError::MaxBalanceExceeded { .. }
        | CommerceError::InvalidPointAmount { .. }
        | CommerceError::MinimumUseAmount { .. }
        | CommerceError::AmountMismatch { .. }
        | CommerceError::CouponNotUsable { .. }
        | CommerceError::Validation { .. } => StatusCode::BAD_REQUEST,

        CommerceError::UserPointNotFound { .. }
        | CommerceError::UserNotFound { .. }
        | CommerceError::OrderNotFound { .. }
        | CommerceError::CouponNotFound { .. } => StatusCode::NOT_FOUND,

        CommerceError::GatewayFailed { .. } => StatusCode::PAYMENT_REQUIRED,

        CommerceError::DailyLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,

        CommerceError::AlreadyProcessed { .. }
        | CommerceError::Store(_)
        | CommerceError::MemoryStore(_)
        | CommerceError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        } else {
            tracing::debug!(code = self.0.code(), error = %self.0, "request rejected");
        }

        let body = json!({
            "success": false,
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
                "data": self.0.data(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use storefront_core::ids::{OrderId, UserId};

    #[test]
    fn status_mapping_follows_the_contract() {
        assert_eq!(
            status_for(&CommerceError::InsufficientBalance {
                balance: 10_000,
                requested: 20_000
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&CommerceError::GatewayFailed {
                reason: "DECLINED".to_string()
            }),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_for(&CommerceError::DailyLimitExceeded {
                used_today: 1_000_000,
                requested: 100,
                limit: 1_000_000
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&CommerceError::OrderNotFound {
                order_id: OrderId::new(1)
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&CommerceError::UserPointNotFound {
                user_id: UserId::new(1)
            }),
            StatusCode::NOT_FOUND
        );
    }
}
