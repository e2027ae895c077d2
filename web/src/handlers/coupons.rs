//! Limited-coupon issuance endpoint.

use crate::dto::IssueResponse;
use crate::error::AppError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use storefront_core::ids::CouponId;

/// `POST /api/v1/coupons/{id}/issue` — the fast admission path; the
/// durable issue follows asynchronously through the drain worker.
pub async fn issue(
    State(state): State<AppState>,
    Path(coupon_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<IssueResponse>, AppError> {
    let user_id = super::current_user(&headers)?;
    let outcome = state
        .api
        .issue_coupon(CouponId::new(coupon_id), user_id)
        .await?;
    Ok(Json(outcome.into()))
}
