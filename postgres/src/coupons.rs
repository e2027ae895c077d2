//! Coupon repository: definitions and per-user issues under optimistic
//! quantity control.

use crate::{OutboxWriter, PgStores, db_err, is_unique_violation};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use storefront_core::coupon::{Coupon, DiscountType, UserCoupon, UserCouponStatus};
use storefront_core::error::{CommerceError, Result};
use storefront_core::ids::{CouponId, OrderId, UserId};
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::store::CouponStore;

const COUPON_COLUMNS: &str = r"
    id, code, discount_type, discount_value, min_order_amount,
    total_quantity, issued_quantity, valid_from, valid_to, version
";

const USER_COUPON_COLUMNS: &str = r"
    id, user_id, coupon_id, status, used_order_id, issued_at, used_at
";

fn row_to_coupon(row: &PgRow) -> Result<Coupon> {
    let discount_type: String = row.get("discount_type");
    Ok(Coupon {
        id: CouponId::new(row.get("id")),
        code: row.get("code"),
        discount_type: DiscountType::parse(&discount_type)?,
        discount_value: row.get("discount_value"),
        min_order_amount: row.get("min_order_amount"),
        total_quantity: row.get("total_quantity"),
        issued_quantity: row.get("issued_quantity"),
        valid_from: row.get("valid_from"),
        valid_to: row.get("valid_to"),
        version: row.get("version"),
    })
}

fn row_to_user_coupon(row: &PgRow) -> Result<UserCoupon> {
    let status: String = row.get("status");
    Ok(UserCoupon {
        id: row.get("id"),
        user_id: UserId::new(row.get("user_id")),
        coupon_id: CouponId::new(row.get("coupon_id")),
        status: UserCouponStatus::parse(&status)?,
        used_order_id: row.get::<Option<i64>, _>("used_order_id").map(OrderId::new),
        issued_at: row.get("issued_at"),
        used_at: row.get("used_at"),
    })
}

impl CouponStore for PgStores {
    async fn get_coupon(&self, id: CouponId) -> Result<Coupon> {
        let row = sqlx::query(&format!(r"SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"))
            .bind(id.value())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?
            .ok_or(CommerceError::CouponNotFound { coupon_id: id })?;
        row_to_coupon(&row)
    }

    async fn list_active_coupons(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {COUPON_COLUMNS} FROM coupons
            WHERE valid_from <= $1 AND valid_to >= $1
            ORDER BY id
            "
        ))
        .bind(now)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_coupon).collect()
    }

    async fn insert_issued(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        issued_at: DateTime<Utc>,
        events: Vec<NewOutboxEvent>,
    ) -> Result<UserCoupon> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        // Bump quantity under the cap; zero rows means sold out (or a
        // concurrent bump won the version — the admission counter makes
        // that impossible for distinct users, so sold-out it is).
        let bumped = sqlx::query(
            r"
            UPDATE coupons
            SET issued_quantity = issued_quantity + 1, version = version + 1
            WHERE id = $1 AND issued_quantity < total_quantity
            ",
        )
        .bind(coupon_id.value())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if bumped.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as(r"SELECT id FROM coupons WHERE id = $1")
                .bind(coupon_id.value())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            return Err(match exists {
                Some(_) => CommerceError::CouponSoldOut { coupon_id },
                None => CommerceError::CouponNotFound { coupon_id },
            });
        }

        let inserted = sqlx::query(&format!(
            r"
            INSERT INTO user_coupons (user_id, coupon_id, status, issued_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COUPON_COLUMNS}
            "
        ))
        .bind(user_id.value())
        .bind(coupon_id.value())
        .bind(UserCouponStatus::Issued.as_str())
        .bind(issued_at)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            // The partial unique index on active rows: duplicate issue.
            Err(e) if is_unique_violation(&e) => {
                return Err(CommerceError::CouponAlreadyIssued { coupon_id, user_id });
            }
            Err(e) => return Err(db_err(e)),
        };

        OutboxWriter::append_all(&mut tx, events).await?;
        tx.commit().await.map_err(db_err)?;
        row_to_user_coupon(&row)
    }

    async fn find_user_coupon(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> Result<Option<UserCoupon>> {
        let row = sqlx::query(&format!(
            r"
            SELECT {USER_COUPON_COLUMNS} FROM user_coupons
            WHERE user_id = $1 AND coupon_id = $2
            ORDER BY id DESC
            LIMIT 1
            "
        ))
        .bind(user_id.value())
        .bind(coupon_id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_user_coupon).transpose()
    }

    async fn mark_used(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        order_id: OrderId,
        events: Vec<NewOutboxEvent>,
    ) -> Result<UserCoupon> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        let row = sqlx::query(&format!(
            r"
            SELECT {USER_COUPON_COLUMNS} FROM user_coupons
            WHERE user_id = $1 AND coupon_id = $2
            ORDER BY id DESC
            LIMIT 1
            FOR UPDATE
            "
        ))
        .bind(user_id.value())
        .bind(coupon_id.value())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| CommerceError::CouponNotUsable {
            coupon_id,
            reason: "not held by user".to_string(),
        })?;
        let current = row_to_user_coupon(&row)?;

        match current.status {
            UserCouponStatus::Used => {
                return if current.used_order_id == Some(order_id) {
                    // Replay of the same order.
                    Ok(current)
                } else {
                    Err(CommerceError::CouponNotUsable {
                        coupon_id,
                        reason: "already used by another order".to_string(),
                    })
                };
            }
            UserCouponStatus::Expired => {
                return Err(CommerceError::CouponNotUsable {
                    coupon_id,
                    reason: "expired".to_string(),
                });
            }
            UserCouponStatus::Issued => {}
        }

        let updated = sqlx::query(&format!(
            r"
            UPDATE user_coupons
            SET status = $1, used_order_id = $2, used_at = NOW()
            WHERE id = $3
            RETURNING {USER_COUPON_COLUMNS}
            "
        ))
        .bind(UserCouponStatus::Used.as_str())
        .bind(order_id.value())
        .bind(current.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        OutboxWriter::append_all(&mut tx, events).await?;
        tx.commit().await.map_err(db_err)?;
        row_to_user_coupon(&updated)
    }

    async fn restore(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        events: Vec<NewOutboxEvent>,
    ) -> Result<bool> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        let reverted = sqlx::query(
            r"
            UPDATE user_coupons
            SET status = $1, used_order_id = NULL, used_at = NULL
            WHERE user_id = $2 AND coupon_id = $3 AND status = $4
            ",
        )
        .bind(UserCouponStatus::Issued.as_str())
        .bind(user_id.value())
        .bind(coupon_id.value())
        .bind(UserCouponStatus::Used.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        // Not USED (already restored, expired, never held): no-op.
        if reverted.rows_affected() == 0 {
            tx.commit().await.map_err(db_err)?;
            return Ok(false);
        }

        sqlx::query(
            r"
            UPDATE coupons
            SET issued_quantity = issued_quantity - 1, version = version + 1
            WHERE id = $1 AND issued_quantity > 0
            ",
        )
        .bind(coupon_id.value())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        OutboxWriter::append_all(&mut tx, events).await?;
        tx.commit().await.map_err(db_err)?;

        tracing::info!(user_id = %user_id, coupon_id = %coupon_id, "user coupon restored");
        Ok(true)
    }

    async fn count_issued(&self, coupon_id: CouponId) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r"SELECT COUNT(*) FROM user_coupons WHERE coupon_id = $1 AND status = 'ISSUED'",
        )
        .bind(coupon_id.value())
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        Ok(count)
    }
}
