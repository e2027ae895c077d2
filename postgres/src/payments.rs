//! Payment repository: the atomic completion operation of the saga.

use crate::orders::row_to_order;
use crate::{OutboxWriter, PgStores, db_err};
use sqlx::Row;
use sqlx::postgres::PgRow;
use storefront_core::error::{CommerceError, Result};
use storefront_core::ids::{OrderId, UserId};
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::payment::{Payment, PaymentCompletion, PaymentMethod, PaymentStatus};
use storefront_core::store::PaymentStore;

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    let method: String = row.get("method");
    let status: String = row.get("status");
    Ok(Payment {
        id: row.get("id"),
        order_id: OrderId::new(row.get("order_id")),
        user_id: UserId::new(row.get("user_id")),
        method: PaymentMethod::parse(&method)?,
        status: PaymentStatus::parse(&status)?,
        external_txn_id: row.get("external_txn_id"),
        amount: row.get("amount"),
        point_amount: row.get("point_amount"),
        gateway_amount: row.get("gateway_amount"),
        created_at: row.get("created_at"),
        paid_at: row.get("paid_at"),
    })
}

impl PaymentStore for PgStores {
    async fn complete_payment(&self, completion: PaymentCompletion) -> Result<Payment> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        // Double-pay guard under lock.
        let existing = sqlx::query(
            r"SELECT status FROM payments WHERE order_id = $1 FOR UPDATE",
        )
        .bind(completion.order_id.value())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if let Some(row) = existing {
            let status: String = row.get("status");
            if PaymentStatus::parse(&status)? == PaymentStatus::Completed {
                return Err(CommerceError::AlreadyPaidOrder {
                    order_id: completion.order_id,
                });
            }
        }

        // Version-guarded balance debit plus its history row.
        if let (Some(debit), Some(history)) = (&completion.debit, &completion.history) {
            let updated = sqlx::query(
                r"
                UPDATE user_balances
                SET balance = balance - $1, version = version + 1, updated_at = NOW()
                WHERE user_id = $2 AND version = $3 AND balance >= $1
                ",
            )
            .bind(debit.amount)
            .bind(debit.user_id.value())
            .bind(debit.expected_version)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            if updated.rows_affected() == 0 {
                return Err(CommerceError::ConcurrencyConflict {
                    resource: format!("balance:{}", debit.user_id),
                });
            }

            sqlx::query(
                r"
                INSERT INTO balance_histories (
                    user_id, amount, history_type, balance_before, balance_after,
                    order_id, description
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(history.user_id.value())
            .bind(history.amount)
            .bind(history.history_type.as_str())
            .bind(history.balance_before)
            .bind(history.balance_after)
            .bind(history.order_id.map(OrderId::value))
            .bind(&history.description)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        // Status-guarded order transition.
        let order = sqlx::query(
            r"
            UPDATE orders
            SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = $3
            RETURNING id, order_number, user_id, total_amount, discount_amount,
                      final_amount, used_coupon_ids, status, items, created_at, updated_at
            ",
        )
        .bind(completion.order_to.as_str())
        .bind(completion.order_id.value())
        .bind(completion.order_from.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| CommerceError::ConcurrencyConflict {
            resource: format!("order:{}", completion.order_id),
        })?;
        let _ = row_to_order(&order)?;

        let payment = completion.payment;
        let row = sqlx::query(
            r"
            INSERT INTO payments (
                order_id, user_id, method, status, external_txn_id,
                amount, point_amount, gateway_amount, paid_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (order_id) DO UPDATE SET
                status = EXCLUDED.status,
                external_txn_id = EXCLUDED.external_txn_id,
                point_amount = EXCLUDED.point_amount,
                gateway_amount = EXCLUDED.gateway_amount,
                paid_at = EXCLUDED.paid_at
            RETURNING id, order_id, user_id, method, status, external_txn_id,
                      amount, point_amount, gateway_amount, created_at, paid_at
            ",
        )
        .bind(payment.order_id.value())
        .bind(payment.user_id.value())
        .bind(payment.method.as_str())
        .bind(PaymentStatus::Completed.as_str())
        .bind(&payment.external_txn_id)
        .bind(payment.amount)
        .bind(payment.point_amount)
        .bind(payment.gateway_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        OutboxWriter::append_all(&mut tx, completion.events).await?;
        tx.commit().await.map_err(db_err)?;

        metrics::counter!("payments.completed").increment(1);
        row_to_payment(&row)
    }

    async fn mark_payment_failed(
        &self,
        order_id: OrderId,
        reason: &str,
        events: Vec<NewOutboxEvent>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        sqlx::query(
            r"UPDATE payments SET status = $1 WHERE order_id = $2",
        )
        .bind(PaymentStatus::Failed.as_str())
        .bind(order_id.value())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        OutboxWriter::append_all(&mut tx, events).await?;
        tx.commit().await.map_err(db_err)?;

        tracing::warn!(order_id = %order_id, reason, "payment marked failed");
        metrics::counter!("payments.failed").increment(1);
        Ok(())
    }

    async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r"
            SELECT id, order_id, user_id, method, status, external_txn_id,
                   amount, point_amount, gateway_amount, created_at, paid_at
            FROM payments WHERE order_id = $1
            ",
        )
        .bind(order_id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_payment).transpose()
    }
}
