//! Transactional outbox row types.
//!
//! Outbox rows are co-written with the aggregate change that produced them
//! and delivered at-least-once by the dispatcher. Ownership transfers at
//! commit: the writing service appends, the dispatcher transitions
//! `processed`/`retry_count`, nobody else touches the row.

use crate::error::{CommerceError, Result};
use crate::event::DomainEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Retry budget per outbox event before it moves to the DLQ.
pub const MAX_RETRY: i32 = 5;

/// Maximum events claimed per dispatcher cycle.
pub const DISPATCH_BATCH_SIZE: usize = 50;

/// The aggregate families that publish outbox events.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateType {
    /// Order aggregate.
    Order,
    /// Payment aggregate.
    Payment,
    /// Inventory aggregate.
    Inventory,
    /// Coupon aggregate.
    Coupon,
    /// Point balance aggregate.
    Point,
    /// Delivery aggregate.
    Delivery,
    /// Cart aggregate.
    Cart,
}

impl AggregateType {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Order => "ORDER",
            Self::Payment => "PAYMENT",
            Self::Inventory => "INVENTORY",
            Self::Coupon => "COUPON",
            Self::Point => "POINT",
            Self::Delivery => "DELIVERY",
            Self::Cart => "CART",
        }
    }

    /// Parse from the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] for an unknown aggregate string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ORDER" => Ok(Self::Order),
            "PAYMENT" => Ok(Self::Payment),
            "INVENTORY" => Ok(Self::Inventory),
            "COUPON" => Ok(Self::Coupon),
            "POINT" => Ok(Self::Point),
            "DELIVERY" => Ok(Self::Delivery),
            "CART" => Ok(Self::Cart),
            _ => Err(CommerceError::Validation {
                message: format!("unknown aggregate type: {s}"),
            }),
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted outbox row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Monotonic row id; per-aggregate FIFO is defined over it.
    pub id: i64,
    /// Stable event type string.
    pub event_type: String,
    /// Publishing aggregate family.
    pub aggregate_type: String,
    /// Publishing aggregate id.
    pub aggregate_id: String,
    /// JSON payload with stable field names.
    pub payload: serde_json::Value,
    /// Whether dispatch finished (successfully, or terminally via DLQ).
    pub processed: bool,
    /// When dispatch succeeded.
    pub processed_at: Option<DateTime<Utc>>,
    /// Failed dispatch attempts so far, `0 ..= MAX_RETRY`.
    pub retry_count: i32,
    /// Last dispatch error, when any attempt failed.
    pub error_message: Option<String>,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// Decode the payload back into its [`DomainEvent`].
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Serialization`] when the stored type/payload
    /// pair is inconsistent.
    pub fn domain_event(&self) -> Result<DomainEvent> {
        DomainEvent::from_stored(&self.event_type, &self.payload)
    }
}

/// An outbox row to append.
///
/// Build through [`NewOutboxEvent::from_domain`], which derives all routing
/// fields from the event itself.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOutboxEvent {
    /// Stable event type string.
    pub event_type: String,
    /// Publishing aggregate family.
    pub aggregate_type: String,
    /// Publishing aggregate id.
    pub aggregate_id: String,
    /// JSON payload.
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    /// Build an appendable row from a domain event.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Serialization`] if the payload cannot be
    /// serialized and [`CommerceError::Validation`] if any routing field
    /// comes out empty.
    pub fn from_domain(event: &DomainEvent) -> Result<Self> {
        let row = Self {
            event_type: event.event_type().to_string(),
            aggregate_type: event.aggregate_type().as_str().to_string(),
            aggregate_id: event.aggregate_id(),
            payload: event.to_payload_json()?,
        };
        row.validate()?;
        Ok(row)
    }

    /// Reject rows with empty routing fields.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Validation`] when a field is empty.
    pub fn validate(&self) -> Result<()> {
        if self.event_type.is_empty() {
            return Err(CommerceError::Validation {
                message: "outbox event type must not be empty".to_string(),
            });
        }
        if self.aggregate_type.is_empty() {
            return Err(CommerceError::Validation {
                message: "outbox aggregate type must not be empty".to_string(),
            });
        }
        if self.aggregate_id.is_empty() {
            return Err(CommerceError::Validation {
                message: "outbox aggregate id must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Snapshot of a terminally failed event in the dead-letter queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxEventDlq {
    /// DLQ row id.
    pub id: i64,
    /// The outbox row this snapshot was taken from.
    pub original_event_id: i64,
    /// Event type at failure time.
    pub event_type: String,
    /// Aggregate family at failure time.
    pub aggregate_type: String,
    /// Aggregate id at failure time.
    pub aggregate_id: String,
    /// Payload at failure time.
    pub payload: serde_json::Value,
    /// The error that exhausted the retry budget.
    pub error_message: String,
    /// Retry attempts consumed.
    pub retry_count: i32,
    /// When the event was moved here.
    pub failed_at: DateTime<Utc>,
    /// Whether a human closed this entry.
    pub resolved: bool,
    /// How it was resolved.
    pub resolution_note: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::event::{DomainEvent, OrderCreatedPayload};
    use crate::ids::{OrderId, UserId};
    use uuid::Uuid;

    #[test]
    fn from_domain_fills_routing_fields() {
        let event = DomainEvent::OrderCreated(OrderCreatedPayload {
            order_id: OrderId::new(1),
            order_number: "ORD-1".to_string(),
            user_id: UserId::new(1),
            final_amount: 35_000,
            correlation_id: Uuid::nil(),
        });
        let row = NewOutboxEvent::from_domain(&event).unwrap();
        assert_eq!(row.event_type, "OrderCreated");
        assert_eq!(row.aggregate_type, "ORDER");
        assert_eq!(row.aggregate_id, "1");
        assert_eq!(row.payload["orderNumber"], "ORD-1");
    }

    #[test]
    fn empty_fields_are_rejected() {
        let row = NewOutboxEvent {
            event_type: String::new(),
            aggregate_type: "ORDER".to_string(),
            aggregate_id: "1".to_string(),
            payload: serde_json::json!({}),
        };
        assert!(row.validate().is_err());
    }

    #[test]
    fn aggregate_type_roundtrip() {
        for agg in [
            AggregateType::Order,
            AggregateType::Payment,
            AggregateType::Inventory,
            AggregateType::Coupon,
            AggregateType::Point,
            AggregateType::Delivery,
            AggregateType::Cart,
        ] {
            assert_eq!(AggregateType::parse(agg.as_str()).unwrap(), agg);
        }
    }
}
