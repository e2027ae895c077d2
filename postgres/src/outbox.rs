//! Outbox claim/record operations and the dead-letter queue.

use crate::{OutboxWriter, PgStores, db_err};
use sqlx::Row;
use sqlx::postgres::PgRow;
use storefront_core::error::{CommerceError, Result};
use storefront_core::outbox::{NewOutboxEvent, OutboxEvent, OutboxEventDlq};
use storefront_core::store::{HandledEventStore, OutboxStore};

const OUTBOX_COLUMNS: &str = r"
    id, event_type, aggregate_type, aggregate_id, payload,
    processed, processed_at, retry_count, error_message, created_at
";

fn row_to_event(row: &PgRow) -> OutboxEvent {
    OutboxEvent {
        id: row.get("id"),
        event_type: row.get("event_type"),
        aggregate_type: row.get("aggregate_type"),
        aggregate_id: row.get("aggregate_id"),
        payload: row.get("payload"),
        processed: row.get("processed"),
        processed_at: row.get("processed_at"),
        retry_count: row.get("retry_count"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
    }
}

fn row_to_dlq(row: &PgRow) -> OutboxEventDlq {
    OutboxEventDlq {
        id: row.get("id"),
        original_event_id: row.get("original_event_id"),
        event_type: row.get("event_type"),
        aggregate_type: row.get("aggregate_type"),
        aggregate_id: row.get("aggregate_id"),
        payload: row.get("payload"),
        error_message: row.get("error_message"),
        retry_count: row.get("retry_count"),
        failed_at: row.get("failed_at"),
        resolved: row.get("resolved"),
        resolution_note: row.get("resolution_note"),
    }
}

impl OutboxStore for PgStores {
    async fn append(&self, event: NewOutboxEvent) -> Result<OutboxEvent> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        let row = OutboxWriter::append(&mut tx, event).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(row)
    }

    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        #[allow(clippy::cast_possible_wrap)]
        let rows = sqlx::query(&format!(
            r"
            SELECT {OUTBOX_COLUMNS} FROM outbox_events
            WHERE processed = FALSE
            ORDER BY id
            LIMIT $1
            "
        ))
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn get_event(&self, id: i64) -> Result<OutboxEvent> {
        let row = sqlx::query(&format!(
            r"SELECT {OUTBOX_COLUMNS} FROM outbox_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| CommerceError::Store(format!("outbox event {id} not found")))?;
        Ok(row_to_event(&row))
    }

    async fn mark_processed(&self, id: i64) -> Result<()> {
        let updated = sqlx::query(
            r"
            UPDATE outbox_events
            SET processed = TRUE, processed_at = NOW(), error_message = NULL
            WHERE id = $1 AND processed = FALSE
            ",
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            let exists: Option<(bool,)> =
                sqlx::query_as(r"SELECT processed FROM outbox_events WHERE id = $1")
                    .bind(id)
                    .fetch_optional(self.pool())
                    .await
                    .map_err(db_err)?;
            return Err(match exists {
                Some((true,)) => CommerceError::AlreadyProcessed { event_id: id },
                _ => CommerceError::Store(format!("outbox event {id} not found")),
            });
        }
        Ok(())
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<i32> {
        let (retry_count,): (i32,) = sqlx::query_as(
            r"
            UPDATE outbox_events
            SET retry_count = retry_count + 1, error_message = $1
            WHERE id = $2
            RETURNING retry_count
            ",
        )
        .bind(error)
        .bind(id)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        Ok(retry_count)
    }

    async fn move_to_dlq(&self, event: &OutboxEvent, error: &str) -> Result<i64> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        let (dlq_id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO outbox_events_dlq (
                original_event_id, event_type, aggregate_type, aggregate_id,
                payload, error_message, retry_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            ",
        )
        .bind(event.id)
        .bind(&event.event_type)
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.payload)
        .bind(error)
        .bind(event.retry_count)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        // Close the original so it is never claimed again; keep the error.
        sqlx::query(
            r"
            UPDATE outbox_events
            SET processed = TRUE, error_message = $1
            WHERE id = $2
            ",
        )
        .bind(error)
        .bind(event.id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        tracing::warn!(
            dlq_id,
            event_id = event.id,
            event_type = event.event_type.as_str(),
            error,
            retry_count = event.retry_count,
            "event added to dead letter queue"
        );
        metrics::counter!("outbox.dlq.added", "event_type" => event.event_type.clone())
            .increment(1);

        Ok(dlq_id)
    }

    async fn count_unresolved_dlq(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r"SELECT COUNT(*) FROM outbox_events_dlq WHERE resolved = FALSE",
        )
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        Ok(count)
    }

    async fn list_unresolved_dlq(&self, limit: usize) -> Result<Vec<OutboxEventDlq>> {
        #[allow(clippy::cast_possible_wrap)]
        let rows = sqlx::query(
            r"
            SELECT id, original_event_id, event_type, aggregate_type, aggregate_id,
                   payload, error_message, retry_count, failed_at, resolved, resolution_note
            FROM outbox_events_dlq
            WHERE resolved = FALSE
            ORDER BY failed_at ASC, id ASC
            LIMIT $1
            ",
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(row_to_dlq).collect())
    }

    async fn resolve_dlq(&self, id: i64, note: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE outbox_events_dlq
            SET resolved = TRUE, resolution_note = $1
            WHERE id = $2
            ",
        )
        .bind(note)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        tracing::info!(dlq_id = id, "DLQ entry resolved");
        metrics::counter!("outbox.dlq.resolved").increment(1);
        Ok(())
    }
}

impl HandledEventStore for PgStores {
    async fn try_mark_handled(
        &self,
        handler: &str,
        event_type: &str,
        aggregate_id: &str,
        event_id: i64,
    ) -> Result<bool> {
        let inserted = sqlx::query(
            r"
            INSERT INTO handled_events (handler, event_type, aggregate_id, event_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(handler)
        .bind(event_type)
        .bind(aggregate_id)
        .bind(event_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(inserted.rows_affected() == 1)
    }
}
