//! Point balance repository: row-locked, version-guarded balance changes
//! with their audit trail.

use crate::{OutboxWriter, PgStores, db_err};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use storefront_core::error::{CommerceError, Result};
use storefront_core::ids::{OrderId, UserId};
use storefront_core::point::{BalanceHistory, BalanceHistoryType, NewBalanceHistory, UserBalance};
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::store::BalanceStore;

fn row_to_balance(row: &PgRow) -> UserBalance {
    UserBalance {
        user_id: UserId::new(row.get("user_id")),
        balance: row.get("balance"),
        version: row.get("version"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_history(row: &PgRow) -> Result<BalanceHistory> {
    let history_type: String = row.get("history_type");
    Ok(BalanceHistory {
        id: row.get("id"),
        user_id: UserId::new(row.get("user_id")),
        amount: row.get("amount"),
        history_type: BalanceHistoryType::parse(&history_type)?,
        balance_before: row.get("balance_before"),
        balance_after: row.get("balance_after"),
        order_id: row.get::<Option<i64>, _>("order_id").map(OrderId::new),
        description: row.get("description"),
        created_at: row.get("created_at"),
    })
}

impl BalanceStore for PgStores {
    async fn get_balance(&self, user_id: UserId) -> Result<Option<UserBalance>> {
        let row = sqlx::query(
            r"SELECT user_id, balance, version, updated_at FROM user_balances WHERE user_id = $1",
        )
        .bind(user_id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_balance))
    }

    async fn get_or_create_balance(&self, user_id: UserId) -> Result<UserBalance> {
        sqlx::query(
            r"
            INSERT INTO user_balances (user_id, balance, version)
            VALUES ($1, 0, 0)
            ON CONFLICT (user_id) DO NOTHING
            ",
        )
        .bind(user_id.value())
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        let row = sqlx::query(
            r"SELECT user_id, balance, version, updated_at FROM user_balances WHERE user_id = $1",
        )
        .bind(user_id.value())
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        Ok(row_to_balance(&row))
    }

    async fn apply_balance_change(
        &self,
        user_id: UserId,
        expected_version: i64,
        history: NewBalanceHistory,
        events: Vec<NewOutboxEvent>,
    ) -> Result<UserBalance> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        // Row lock first; the guarded UPDATE then re-checks the version so
        // a writer that raced us between read and lock is detected.
        let locked = sqlx::query(
            r"
            SELECT user_id, balance, version, updated_at
            FROM user_balances WHERE user_id = $1
            FOR UPDATE
            ",
        )
        .bind(user_id.value())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(CommerceError::UserPointNotFound { user_id })?;

        if row_to_balance(&locked).version != expected_version {
            return Err(CommerceError::ConcurrencyConflict {
                resource: format!("balance:{user_id}"),
            });
        }

        let updated = sqlx::query(
            r"
            UPDATE user_balances
            SET balance = balance + $1, version = version + 1, updated_at = NOW()
            WHERE user_id = $2 AND version = $3 AND balance + $1 >= 0
            RETURNING user_id, balance, version, updated_at
            ",
        )
        .bind(history.amount)
        .bind(user_id.value())
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| CommerceError::ConcurrencyConflict {
            resource: format!("balance:{user_id}"),
        })?;

        sqlx::query(
            r"
            INSERT INTO balance_histories (
                user_id, amount, history_type, balance_before, balance_after,
                order_id, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(user_id.value())
        .bind(history.amount)
        .bind(history.history_type.as_str())
        .bind(history.balance_before)
        .bind(history.balance_after)
        .bind(history.order_id.map(OrderId::value))
        .bind(&history.description)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        OutboxWriter::append_all(&mut tx, events).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(row_to_balance(&updated))
    }

    async fn histories(&self, user_id: UserId, limit: usize) -> Result<Vec<BalanceHistory>> {
        #[allow(clippy::cast_possible_wrap)]
        let rows = sqlx::query(
            r"
            SELECT id, user_id, amount, history_type, balance_before, balance_after,
                   order_id, description, created_at
            FROM balance_histories
            WHERE user_id = $1
            ORDER BY id DESC
            LIMIT $2
            ",
        )
        .bind(user_id.value())
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_history).collect()
    }

    async fn sum_used_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let (sum,): (i64,) = sqlx::query_as(
            r"
            SELECT COALESCE(SUM(ABS(amount)), 0)
            FROM balance_histories
            WHERE user_id = $1 AND history_type = 'USE'
              AND created_at >= $2 AND created_at < $3
            ",
        )
        .bind(user_id.value())
        .bind(from)
        .bind(to)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        Ok(sum)
    }

    async fn has_refund_for_order(&self, user_id: UserId, order_id: OrderId) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            r"
            SELECT id FROM balance_histories
            WHERE user_id = $1 AND order_id = $2 AND history_type = 'REFUND'
            LIMIT 1
            ",
        )
        .bind(user_id.value())
        .bind(order_id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;
        Ok(row.is_some())
    }
}
