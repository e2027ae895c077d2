//! Product statistics: realtime counters folded into durable rows and a
//! popularity ranking.

use crate::ids::ProductId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight of sales in the popularity score.
pub const SALES_WEIGHT: f64 = 0.4;
/// Weight of views in the popularity score.
pub const VIEW_WEIGHT: f64 = 0.3;
/// Weight of wishes in the popularity score.
pub const WISH_WEIGHT: f64 = 0.3;

/// Kind of a product statistic event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatKind {
    /// Product detail viewed.
    View,
    /// Product sold.
    Sale,
    /// Product wish-listed.
    Wish,
}

impl StatKind {
    /// Short key segment used in memory-store keys.
    #[must_use]
    pub const fn key_segment(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Sale => "sales",
            Self::Wish => "wish",
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_segment())
    }
}

/// One statistic event, appended to the per-hour log as a small JSON entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatEvent {
    /// The product.
    pub product_id: ProductId,
    /// What happened.
    pub kind: StatKind,
    /// How many (1 for views/wishes; units sold for sales).
    pub quantity: i64,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
}

impl StatEvent {
    /// The fold hour bucket (`unix_seconds / 3600`) this event belongs to.
    #[must_use]
    pub const fn hour_bucket(&self) -> i64 {
        self.occurred_at.timestamp() / 3600
    }
}

/// Durable per-product counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStatistics {
    /// The product.
    pub product_id: ProductId,
    /// Accumulated views.
    pub view_count: i64,
    /// Accumulated units sold.
    pub sales_count: i64,
    /// Accumulated wishes.
    pub wish_count: i64,
    /// Optimistic version.
    pub version: i64,
}

impl ProductStatistics {
    /// Popularity score: `0.4·sales + 0.3·views + 0.3·wishes`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // counters stay far below 2^52
    pub fn popularity_score(&self) -> f64 {
        SALES_WEIGHT * self.sales_count as f64
            + VIEW_WEIGHT * self.view_count as f64
            + WISH_WEIGHT * self.wish_count as f64
    }
}

/// Aggregated delta for one `(product, kind)` pair, produced by the fold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatDelta {
    /// The product.
    pub product_id: ProductId,
    /// The counter to bump.
    pub kind: StatKind,
    /// Amount to add.
    pub amount: i64,
}

/// One entry of the popularity ranking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularProduct {
    /// The product.
    pub product_id: ProductId,
    /// Popularity score at ranking time.
    pub score: f64,
}
