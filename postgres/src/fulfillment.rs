//! Delivery and cart repositories.

use crate::{OutboxWriter, PgStores, db_err};
use sqlx::Row;
use sqlx::postgres::PgRow;
use storefront_core::cart::CartItem;
use storefront_core::delivery::{Delivery, DeliveryStatus, NewDelivery};
use storefront_core::error::{CommerceError, Result};
use storefront_core::ids::{OrderId, ProductId, UserId};
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::store::{CartStore, DeliveryStore};

const DELIVERY_COLUMNS: &str = r"
    id, order_id, user_id, status, recipient, address, created_at
";

fn row_to_delivery(row: &PgRow) -> Result<Delivery> {
    let status: String = row.get("status");
    Ok(Delivery {
        id: row.get("id"),
        order_id: OrderId::new(row.get("order_id")),
        user_id: UserId::new(row.get("user_id")),
        status: DeliveryStatus::parse(&status)?,
        recipient: row.get("recipient"),
        address: row.get("address"),
        created_at: row.get("created_at"),
    })
}

impl DeliveryStore for PgStores {
    async fn create_delivery(&self, delivery: NewDelivery) -> Result<Delivery> {
        // The unique key on order_id makes creation idempotent.
        let inserted = sqlx::query(&format!(
            r"
            INSERT INTO deliveries (order_id, user_id, status, recipient, address)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING {DELIVERY_COLUMNS}
            "
        ))
        .bind(delivery.order_id.value())
        .bind(delivery.user_id.value())
        .bind(DeliveryStatus::Preparing.as_str())
        .bind(&delivery.recipient)
        .bind(&delivery.address)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(row) = inserted {
            return row_to_delivery(&row);
        }
        self.get_delivery_by_order(delivery.order_id)
            .await?
            .ok_or_else(|| CommerceError::Store("delivery vanished after conflict".to_string()))
    }

    async fn get_delivery_by_order(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        let row = sqlx::query(&format!(
            r"SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE order_id = $1"
        ))
        .bind(order_id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_delivery).transpose()
    }

    async fn update_delivery_status(
        &self,
        order_id: OrderId,
        status: DeliveryStatus,
        events: Vec<NewOutboxEvent>,
    ) -> Result<Delivery> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        let row = sqlx::query(&format!(
            r"
            UPDATE deliveries SET status = $1 WHERE order_id = $2
            RETURNING {DELIVERY_COLUMNS}
            "
        ))
        .bind(status.as_str())
        .bind(order_id.value())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| CommerceError::Validation {
            message: format!("no delivery for order {order_id}"),
        })?;

        OutboxWriter::append_all(&mut tx, events).await?;
        tx.commit().await.map_err(db_err)?;
        row_to_delivery(&row)
    }
}

impl CartStore for PgStores {
    async fn put_item(&self, item: CartItem) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO cart_items (user_id, product_id, quantity, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, product_id) DO UPDATE
                SET quantity = EXCLUDED.quantity, updated_at = NOW()
            ",
        )
        .bind(item.user_id.value())
        .bind(item.product_id.value())
        .bind(i64::from(item.quantity))
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn items(&self, user_id: UserId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(
            r"
            SELECT user_id, product_id, quantity, updated_at
            FROM cart_items WHERE user_id = $1
            ORDER BY product_id
            ",
        )
        .bind(user_id.value())
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let quantity: i32 = row.get("quantity");
                Ok(CartItem {
                    user_id: UserId::new(row.get("user_id")),
                    product_id: ProductId::new(row.get("product_id")),
                    quantity: u32::try_from(quantity).unwrap_or(0),
                    updated_at: row.get("updated_at"),
                })
            })
            .collect()
    }

    async fn remove_items(&self, user_id: UserId, product_ids: &[ProductId]) -> Result<u64> {
        let ids: Vec<i64> = product_ids.iter().map(|p| p.value()).collect();
        let deleted = sqlx::query(
            r"DELETE FROM cart_items WHERE user_id = $1 AND product_id = ANY($2)",
        )
        .bind(user_id.value())
        .bind(&ids)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(deleted.rows_affected())
    }
}
