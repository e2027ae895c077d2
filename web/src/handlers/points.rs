//! Point balance endpoints.

use crate::dto::{BalanceResponse, ChargeRequest, DeductRequest, HistoryResponse};
use crate::error::AppError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use storefront_core::ids::UserId;

/// `GET /api/v1/users/me/balance`.
pub async fn my_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BalanceResponse>, AppError> {
    let user_id = super::current_user(&headers)?;
    let balance = state.api.balance(user_id).await?;
    Ok(Json(balance.into()))
}

/// `GET /api/v1/points/{userId}`.
pub async fn balance(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.api.balance(UserId::new(user_id)).await?;
    Ok(Json(balance.into()))
}

/// `POST /api/v1/points/{userId}/charge`.
pub async fn charge(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<ChargeRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state
        .api
        .charge_points(
            UserId::new(user_id),
            request.amount,
            request.description.unwrap_or_else(|| "point charge".to_string()),
        )
        .await?;
    Ok(Json(balance.into()))
}

/// `POST /api/v1/points/{userId}/deduct`.
pub async fn deduct(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<DeductRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state
        .api
        .deduct_points(
            UserId::new(user_id),
            request.amount,
            request.order_id,
            request.description.unwrap_or_else(|| "point use".to_string()),
        )
        .await?;
    Ok(Json(balance.into()))
}

/// `GET /api/v1/points/{userId}/histories`.
pub async fn histories(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<HistoryResponse>>, AppError> {
    let rows = state.api.point_histories(UserId::new(user_id)).await?;
    Ok(Json(rows.into_iter().map(HistoryResponse::from).collect()))
}
