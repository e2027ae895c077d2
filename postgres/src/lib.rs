//! # Storefront Postgres
//!
//! `PostgreSQL` implementations of every durable-store seam in
//! `storefront-core`: the aggregate repositories, the transactional outbox
//! writer and the dead-letter queue.
//!
//! # Atomicity
//!
//! Every mutating operation runs in one transaction and appends its outbox
//! rows through [`outbox_writer::OutboxWriter`] inside that transaction —
//! on commit the aggregate change and its events are durable together, on
//! rollback neither leaks.
//!
//! # Concurrency
//!
//! Balance changes take a row-level lock (`SELECT … FOR UPDATE`) and then
//! re-check the optimistic version in the guarded `UPDATE`; a guard miss
//! surfaces as `ConcurrencyConflict` with nothing written. Stock and
//! coupon quantities use conditional updates the same way.

mod coupons;
mod fulfillment;
mod inventory;
mod orders;
mod outbox;
pub mod outbox_writer;
mod payments;
mod points;
mod stats;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use storefront_core::error::{CommerceError, Result};

pub use outbox_writer::OutboxWriter;

/// Shared connection pool implementing all repository traits.
///
/// Cheap to clone; every service holds the same pool.
#[derive(Clone)]
pub struct PgStores {
    pool: PgPool,
}

impl PgStores {
    /// Connect to the database.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Store`] when the pool cannot be created.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .map_err(|e| CommerceError::Store(format!("failed to connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Store`] when a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CommerceError::Store(format!("migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a sqlx error onto the store error kind.
pub(crate) fn db_err(e: sqlx::Error) -> CommerceError {
    CommerceError::Store(e.to_string())
}

/// Whether a sqlx error is a unique-constraint violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db) if db.constraint().is_some() && db.code().as_deref() == Some("23505")
    )
}
