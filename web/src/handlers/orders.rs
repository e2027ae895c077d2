//! Order endpoints.

use crate::dto::{CreateOrderRequest, OrderResponse};
use crate::error::AppError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use storefront_core::ids::OrderId;
use storefront_core::order::OrderItem;

/// `POST /api/v1/orders`.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let user_id = super::current_user(&headers)?;
    let items: Vec<OrderItem> = request.items.into_iter().map(OrderItem::from).collect();
    let order = state
        .api
        .create_order(user_id, items, request.coupon_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// `GET /api/v1/orders/{id}`.
pub async fn get(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.api.get_order(OrderId::new(order_id)).await?;
    Ok(Json(order.into()))
}
