//! Product read paths: popularity ranking and the view-event ingest.

use crate::error::AppError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use storefront_core::ids::ProductId;
use storefront_core::stats::PopularProduct;

/// Query for `GET /products/popular`.
#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    /// How many products to return (default 10).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    10
}

/// `GET /api/v1/products/popular?limit=N`.
pub async fn popular(
    State(state): State<AppState>,
    Query(query): Query<PopularQuery>,
) -> Result<Json<Vec<PopularProduct>>, AppError> {
    let top = state.api.popular_products(query.limit.min(100)).await?;
    Ok(Json(top))
}

/// `POST /api/v1/products/{id}/view` — statistics ingest for a product
/// detail view.
pub async fn record_view(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.api.record_view(ProductId::new(product_id)).await?;
    Ok(StatusCode::ACCEPTED)
}
