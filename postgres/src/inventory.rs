//! Inventory repository: conditional stock updates with order-scoped
//! movement rows for idempotency.

use crate::{OutboxWriter, PgStores, db_err};
use sqlx::Row;
use storefront_core::error::{CommerceError, Result};
use storefront_core::ids::{OrderId, ProductId};
use storefront_core::inventory::{DeductionOutcome, Inventory, RestoreOutcome};
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::store::InventoryStore;

const DEDUCT: &str = "DEDUCT";
const RESTORE: &str = "RESTORE";

impl InventoryStore for PgStores {
    async fn get_inventory(&self, product_id: ProductId) -> Result<Option<Inventory>> {
        let row = sqlx::query(
            r"
            SELECT product_id, quantity, reserved_quantity, version
            FROM inventories WHERE product_id = $1
            ",
        )
        .bind(product_id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(|row| Inventory {
            product_id: ProductId::new(row.get("product_id")),
            quantity: row.get("quantity"),
            reserved_quantity: row.get("reserved_quantity"),
            version: row.get("version"),
        }))
    }

    async fn upsert_inventory(&self, product_id: ProductId, quantity: i64) -> Result<Inventory> {
        let row = sqlx::query(
            r"
            INSERT INTO inventories (product_id, quantity, reserved_quantity, version)
            VALUES ($1, $2, 0, 0)
            ON CONFLICT (product_id) DO UPDATE
                SET quantity = EXCLUDED.quantity, version = inventories.version + 1
            RETURNING product_id, quantity, reserved_quantity, version
            ",
        )
        .bind(product_id.value())
        .bind(quantity)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok(Inventory {
            product_id: ProductId::new(row.get("product_id")),
            quantity: row.get("quantity"),
            reserved_quantity: row.get("reserved_quantity"),
            version: row.get("version"),
        })
    }

    async fn deduct_for_order(
        &self,
        order_id: OrderId,
        lines: &[(ProductId, i64)],
        events: Vec<NewOutboxEvent>,
    ) -> Result<DeductionOutcome> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        let already: Option<(i64,)> = sqlx::query_as(
            r"SELECT id FROM stock_movements WHERE order_id = $1 AND kind = $2 LIMIT 1",
        )
        .bind(order_id.value())
        .bind(DEDUCT)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if already.is_some() {
            return Ok(DeductionOutcome::AlreadyDeducted);
        }

        for (product_id, quantity) in lines {
            let updated = sqlx::query(
                r"
                UPDATE inventories
                SET quantity = quantity - $1, version = version + 1
                WHERE product_id = $2 AND quantity - reserved_quantity >= $1
                ",
            )
            .bind(quantity)
            .bind(product_id.value())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            if updated.rows_affected() == 0 {
                // Dropping the transaction rolls back earlier lines.
                let available: Option<(i64,)> = sqlx::query_as(
                    r"
                    SELECT quantity - reserved_quantity FROM inventories
                    WHERE product_id = $1
                    ",
                )
                .bind(product_id.value())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
                return Err(CommerceError::InsufficientStock {
                    product_id: *product_id,
                    requested: *quantity,
                    available: available.map_or(0, |(a,)| a),
                });
            }

            sqlx::query(
                r"
                INSERT INTO stock_movements (order_id, product_id, quantity, kind)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(order_id.value())
            .bind(product_id.value())
            .bind(quantity)
            .bind(DEDUCT)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        OutboxWriter::append_all(&mut tx, events).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(DeductionOutcome::Deducted)
    }

    async fn restore_for_order(
        &self,
        order_id: OrderId,
        events: Vec<NewOutboxEvent>,
    ) -> Result<RestoreOutcome> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        let deducted: Vec<(i64, i64)> = sqlx::query_as(
            r"
            SELECT product_id, quantity FROM stock_movements
            WHERE order_id = $1 AND kind = $2
            ",
        )
        .bind(order_id.value())
        .bind(DEDUCT)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;
        if deducted.is_empty() {
            return Ok(RestoreOutcome::NothingDeducted);
        }

        let restored: Option<(i64,)> = sqlx::query_as(
            r"SELECT id FROM stock_movements WHERE order_id = $1 AND kind = $2 LIMIT 1",
        )
        .bind(order_id.value())
        .bind(RESTORE)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if restored.is_some() {
            return Ok(RestoreOutcome::AlreadyRestored);
        }

        for (product_id, quantity) in deducted {
            sqlx::query(
                r"
                UPDATE inventories
                SET quantity = quantity + $1, version = version + 1
                WHERE product_id = $2
                ",
            )
            .bind(quantity)
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            sqlx::query(
                r"
                INSERT INTO stock_movements (order_id, product_id, quantity, kind)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(order_id.value())
            .bind(product_id)
            .bind(quantity)
            .bind(RESTORE)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        OutboxWriter::append_all(&mut tx, events).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(RestoreOutcome::Restored)
    }
}
