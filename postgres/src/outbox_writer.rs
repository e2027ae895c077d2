//! Transactional outbox writer.
//!
//! Appends domain events **inside the caller's transaction**: on commit
//! the row is durable and visible to the dispatcher, on rollback no event
//! leaks. The append is synchronous and deterministic — no artificial
//! latency, no deferred writes.

use crate::db_err;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Row, Transaction};
use storefront_core::error::Result;
use storefront_core::outbox::{NewOutboxEvent, OutboxEvent};

/// Writes outbox rows into an open transaction.
pub struct OutboxWriter;

impl OutboxWriter {
    /// Append one event. Validates the routing fields and inserts with
    /// `processed = false, retry_count = 0`; the monotonic id comes from
    /// the table's sequence.
    ///
    /// # Errors
    ///
    /// `Validation` for empty routing fields, `Store` for database errors.
    pub async fn append(
        tx: &mut Transaction<'_, Postgres>,
        event: NewOutboxEvent,
    ) -> Result<OutboxEvent> {
        event.validate()?;

        let row = sqlx::query(
            r"
            INSERT INTO outbox_events (event_type, aggregate_type, aggregate_id, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
            ",
        )
        .bind(&event.event_type)
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.payload)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_err)?;

        let id: i64 = row.get("id");
        let created_at: DateTime<Utc> = row.get("created_at");

        tracing::debug!(
            event_id = id,
            event_type = event.event_type.as_str(),
            aggregate_id = event.aggregate_id.as_str(),
            "outbox event appended"
        );

        Ok(OutboxEvent {
            id,
            event_type: event.event_type,
            aggregate_type: event.aggregate_type,
            aggregate_id: event.aggregate_id,
            payload: event.payload,
            processed: false,
            processed_at: None,
            retry_count: 0,
            error_message: None,
            created_at,
        })
    }

    /// Append a batch in order.
    ///
    /// # Errors
    ///
    /// As [`OutboxWriter::append`]; the first failure aborts (the caller's
    /// transaction rolls everything back).
    pub async fn append_all(
        tx: &mut Transaction<'_, Postgres>,
        events: Vec<NewOutboxEvent>,
    ) -> Result<()> {
        for event in events {
            Self::append(tx, event).await?;
        }
        Ok(())
    }
}
