//! HTTP handlers.

pub mod coupons;
pub mod health;
pub mod orders;
pub mod payments;
pub mod points;
pub mod products;
pub mod sse;

use crate::error::AppError;
use axum::http::HeaderMap;
use storefront_core::CommerceError;
use storefront_core::ids::UserId;

/// Extract the authenticated user from the `X-User-Id` header.
///
/// Authentication itself is an external collaborator; by the time requests
/// reach this service the gateway has verified the identity.
pub(crate) fn current_user(headers: &HeaderMap) -> Result<UserId, AppError> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
        .map(UserId::new)
        .ok_or_else(|| {
            AppError(CommerceError::Validation {
                message: "missing or invalid X-User-Id header".to_string(),
            })
        })
}
