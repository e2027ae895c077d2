//! Payment endpoint: drives the saga synchronously and returns the
//! receipt.

use crate::dto::{PaymentApiRequest, PaymentResponse};
use crate::error::AppError;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

/// `POST /api/v1/payments`.
pub async fn process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PaymentApiRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    let user_id = super::current_user(&headers)?;
    let domain = request.into_domain(user_id)?;
    let receipt = state.api.process_payment(domain).await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}
