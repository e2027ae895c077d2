//! Product statistics and popularity ranking repositories.

use crate::{PgStores, db_err};
use sqlx::Row;
use storefront_core::error::Result;
use storefront_core::ids::ProductId;
use storefront_core::stats::{PopularProduct, ProductStatistics, StatDelta, StatKind};
use storefront_core::store::StatsStore;

impl StatsStore for PgStores {
    async fn apply_deltas(&self, deltas: &[StatDelta]) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        for delta in deltas {
            let (view, sales, wish) = match delta.kind {
                StatKind::View => (delta.amount, 0, 0),
                StatKind::Sale => (0, delta.amount, 0),
                StatKind::Wish => (0, 0, delta.amount),
            };
            sqlx::query(
                r"
                INSERT INTO product_statistics (product_id, view_count, sales_count, wish_count, version)
                VALUES ($1, $2, $3, $4, 1)
                ON CONFLICT (product_id) DO UPDATE SET
                    view_count = product_statistics.view_count + EXCLUDED.view_count,
                    sales_count = product_statistics.sales_count + EXCLUDED.sales_count,
                    wish_count = product_statistics.wish_count + EXCLUDED.wish_count,
                    version = product_statistics.version + 1
                ",
            )
            .bind(delta.product_id.value())
            .bind(view)
            .bind(sales)
            .bind(wish)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_statistics(&self, product_id: ProductId) -> Result<Option<ProductStatistics>> {
        let row = sqlx::query(
            r"
            SELECT product_id, view_count, sales_count, wish_count, version
            FROM product_statistics WHERE product_id = $1
            ",
        )
        .bind(product_id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(|row| ProductStatistics {
            product_id: ProductId::new(row.get("product_id")),
            view_count: row.get("view_count"),
            sales_count: row.get("sales_count"),
            wish_count: row.get("wish_count"),
            version: row.get("version"),
        }))
    }

    async fn get_many(&self, product_ids: &[ProductId]) -> Result<Vec<ProductStatistics>> {
        let ids: Vec<i64> = product_ids.iter().map(|p| p.value()).collect();
        let rows = sqlx::query(
            r"
            SELECT product_id, view_count, sales_count, wish_count, version
            FROM product_statistics WHERE product_id = ANY($1)
            ORDER BY product_id
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| ProductStatistics {
                product_id: ProductId::new(row.get("product_id")),
                view_count: row.get("view_count"),
                sales_count: row.get("sales_count"),
                wish_count: row.get("wish_count"),
                version: row.get("version"),
            })
            .collect())
    }

    async fn upsert_ranking(&self, entries: &[PopularProduct]) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        for entry in entries {
            sqlx::query(
                r"
                INSERT INTO popular_products (product_id, score, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (product_id) DO UPDATE
                    SET score = EXCLUDED.score, updated_at = NOW()
                ",
            )
            .bind(entry.product_id.value())
            .bind(entry.score)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn top_ranked(&self, limit: usize) -> Result<Vec<PopularProduct>> {
        #[allow(clippy::cast_possible_wrap)]
        let rows = sqlx::query(
            r"
            SELECT product_id, score FROM popular_products
            ORDER BY score DESC, product_id
            LIMIT $1
            ",
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| PopularProduct {
                product_id: ProductId::new(row.get("product_id")),
                score: row.get("score"),
            })
            .collect())
    }
}
