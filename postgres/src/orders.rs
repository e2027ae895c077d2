//! Order repository.

use crate::{OutboxWriter, PgStores, db_err};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use storefront_core::error::{CommerceError, Result};
use storefront_core::ids::{OrderId, UserId};
use storefront_core::order::{NewOrder, Order, OrderStatus};
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::store::OrderStore;

const ORDER_COLUMNS: &str = r"
    id, order_number, user_id, total_amount, discount_amount, final_amount,
    used_coupon_ids, status, items, created_at, updated_at
";

pub(crate) fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.get("status");
    let items: serde_json::Value = row.get("items");
    let used_coupon_ids: serde_json::Value = row.get("used_coupon_ids");
    Ok(Order {
        id: OrderId::new(row.get("id")),
        order_number: row.get("order_number"),
        user_id: UserId::new(row.get("user_id")),
        total_amount: row.get("total_amount"),
        discount_amount: row.get("discount_amount"),
        final_amount: row.get("final_amount"),
        used_coupon_ids: serde_json::from_value(used_coupon_ids)
            .map_err(|e| CommerceError::Serialization(e.to_string()))?,
        status: OrderStatus::parse(&status)?,
        items: serde_json::from_value(items)
            .map_err(|e| CommerceError::Serialization(e.to_string()))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl OrderStore for PgStores {
    async fn insert_order<F>(&self, order: NewOrder, events_for: F) -> Result<Order>
    where
        F: FnOnce(&Order) -> Result<Vec<NewOutboxEvent>> + Send,
    {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        let items = serde_json::to_value(&order.items)
            .map_err(|e| CommerceError::Serialization(e.to_string()))?;
        let used_coupon_ids = serde_json::to_value(&order.used_coupon_ids)
            .map_err(|e| CommerceError::Serialization(e.to_string()))?;

        let row = sqlx::query(&format!(
            r"
            INSERT INTO orders (
                order_number, user_id, total_amount, discount_amount,
                final_amount, used_coupon_ids, status, items
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order.order_number)
        .bind(order.user_id.value())
        .bind(order.total_amount)
        .bind(order.discount_amount)
        .bind(order.final_amount)
        .bind(used_coupon_ids)
        .bind(OrderStatus::PendingPayment.as_str())
        .bind(items)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let created = row_to_order(&row)?;
        OutboxWriter::append_all(&mut tx, events_for(&created)?).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }

    async fn get_order(&self, id: OrderId) -> Result<Order> {
        let row = sqlx::query(&format!(
            r"SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or(CommerceError::OrderNotFound { order_id: id })?;
        row_to_order(&row)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        events: Vec<NewOutboxEvent>,
    ) -> Result<Order> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        let row = sqlx::query(&format!(
            r"
            UPDATE orders
            SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = $3
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(to.as_str())
        .bind(id.value())
        .bind(from.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            // Distinguish "gone" from "moved".
            let exists: Option<(i64,)> = sqlx::query_as(r"SELECT id FROM orders WHERE id = $1")
                .bind(id.value())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            return Err(match exists {
                Some(_) => CommerceError::ConcurrencyConflict {
                    resource: format!("order:{id}"),
                },
                None => CommerceError::OrderNotFound { order_id: id },
            });
        };

        let updated = row_to_order(&row)?;
        OutboxWriter::append_all(&mut tx, events).await?;
        tx.commit().await.map_err(db_err)?;

        tracing::info!(
            order_id = %id,
            from = from.as_str(),
            to = to.as_str(),
            "order status updated"
        );
        Ok(updated)
    }

    async fn find_payment_overdue(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Order>> {
        #[allow(clippy::cast_possible_wrap)]
        let rows = sqlx::query(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE status = $1 AND created_at < $2
            ORDER BY id
            LIMIT $3
            "
        ))
        .bind(OrderStatus::PendingPayment.as_str())
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_order).collect()
    }
}
