//! Delivery aggregate, created as a downstream effect of a completed payment.

use crate::error::{CommerceError, Result};
use crate::ids::{OrderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a delivery.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Being packed.
    Preparing,
    /// Handed to the carrier.
    Shipped,
    /// Arrived at the recipient.
    Delivered,
}

impl DeliveryStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "PREPARING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
        }
    }

    /// Parse from the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] for an unknown status string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PREPARING" => Ok(Self::Preparing),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            _ => Err(CommerceError::Validation {
                message: format!("unknown delivery status: {s}"),
            }),
        }
    }
}

/// A delivery row. One per order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Database id.
    pub id: i64,
    /// The order being delivered.
    pub order_id: OrderId,
    /// Receiving user.
    pub user_id: UserId,
    /// Current status.
    pub status: DeliveryStatus,
    /// Recipient name.
    pub recipient: String,
    /// Delivery address.
    pub address: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A delivery row to insert.
#[derive(Clone, Debug, PartialEq)]
pub struct NewDelivery {
    /// The order being delivered.
    pub order_id: OrderId,
    /// Receiving user.
    pub user_id: UserId,
    /// Recipient name.
    pub recipient: String,
    /// Delivery address.
    pub address: String,
}
