//! Shopping cart rows, cleaned up after a completed payment.

use crate::ids::{ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One product in a user's cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Cart owner.
    pub user_id: UserId,
    /// The product.
    pub product_id: ProductId,
    /// Units in the cart.
    pub quantity: u32,
    /// When the item was added or last updated.
    pub updated_at: DateTime<Utc>,
}
