//! # Storefront Web
//!
//! Axum HTTP surface over the [`storefront_services::CommerceApi`] facade.
//!
//! # Routes
//!
//! - `GET  /health`
//! - `GET  /api/v1/users/me/balance` (user from `X-User-Id`)
//! - `POST /api/v1/orders`
//! - `GET  /api/v1/orders/{id}`
//! - `POST /api/v1/payments`
//! - `GET  /api/v1/points/{userId}`
//! - `POST /api/v1/points/{userId}/charge`
//! - `POST /api/v1/points/{userId}/deduct`
//! - `GET  /api/v1/points/{userId}/histories`
//! - `POST /api/v1/coupons/{id}/issue`
//! - `GET  /api/v1/products/popular?limit=N`
//! - `POST /api/v1/products/{id}/view`
//! - `GET  /api/sse/subscribe/{userId}` (SSE: `connected`, `coupon-issued`,
//!   `order-completed`, `payment-completed`)
//!
//! Errors come back as `{"success": false, "error": {code, message, data}}`
//! with the stable machine codes from `storefront-core`.
//!
//! Authentication is an external collaborator; the user identity arrives
//! in the `X-User-Id` header.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::AppError;
pub use router::router;
pub use state::AppState;
