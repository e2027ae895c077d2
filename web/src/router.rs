//! Route table.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Build the full application router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/users/me/balance", get(handlers::points::my_balance))
        .route("/api/v1/orders", post(handlers::orders::create))
        .route("/api/v1/orders/:id", get(handlers::orders::get))
        .route("/api/v1/payments", post(handlers::payments::process))
        .route("/api/v1/points/:user_id", get(handlers::points::balance))
        .route(
            "/api/v1/points/:user_id/charge",
            post(handlers::points::charge),
        )
        .route(
            "/api/v1/points/:user_id/deduct",
            post(handlers::points::deduct),
        )
        .route(
            "/api/v1/points/:user_id/histories",
            get(handlers::points::histories),
        )
        .route("/api/v1/coupons/:id/issue", post(handlers::coupons::issue))
        .route(
            "/api/v1/products/popular",
            get(handlers::products::popular),
        )
        .route(
            "/api/v1/products/:id/view",
            post(handlers::products::record_view),
        )
        .route("/api/sse/subscribe/:user_id", get(handlers::sse::subscribe))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
