//! Statistics aggregator: hot counters in the memory store, folded
//! periodically into durable rows and the popularity ranking.
//!
//! # Ingest
//!
//! Each view/sale/wish event appends a small JSON entry to the per-hour
//! log list and bumps the realtime counter in parallel.
//!
//! # Fold (every 30 minutes)
//!
//! For hours `h-1` and `h-2` the log is claimed with the
//! **rename-then-read** discipline: leftovers from a crashed fold are
//! persisted first, then the live log is atomically renamed to its scratch
//! key, read, persisted in chunks of 100 (with at-least-once retry —
//! counters are commutative) and only then discarded. A naive
//! read-then-delete would lose every event between the read and the delete
//! on a crash.
//!
//! After the fold the popularity ranking is recomputed for the touched
//! products and the `popular(limit)` caches are re-warmed.

use std::collections::HashMap;
use std::time::Duration as StdDuration;
use storefront_core::clock::Clock;
use storefront_core::error::Result;
use storefront_core::ids::ProductId;
use storefront_core::keys;
use storefront_core::memstore::{CacheStore, StatsBuffer};
use storefront_core::stats::{
    PopularProduct, ProductStatistics, StatDelta, StatEvent, StatKind,
};
use storefront_core::store::StatsStore;
use storefront_runtime::retry::{RetryPolicy, retry_with_backoff};

/// Deltas persisted per transaction.
pub const FOLD_CHUNK: usize = 100;

/// The cached `popular(limit)` variants.
pub const POPULAR_LIMITS: [usize; 3] = [5, 10, 20];

/// TTL of the popular cache; the warmer refreshes it far more often.
const POPULAR_CACHE_TTL: StdDuration = StdDuration::from_secs(3600);

/// Outcome counters for one fold pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FoldStats {
    /// Log entries folded.
    pub entries: usize,
    /// Distinct products whose counters changed.
    pub products: usize,
}

/// Owns product statistics and the popularity ranking.
pub struct StatisticsService<S, K, C> {
    stores: S,
    buffer: K,
    clock: C,
}

impl<S, K, C> StatisticsService<S, K, C>
where
    S: StatsStore,
    K: StatsBuffer + CacheStore,
    C: Clock,
{
    /// Create the service.
    pub const fn new(stores: S, buffer: K, clock: C) -> Self {
        Self {
            stores,
            buffer,
            clock,
        }
    }

    /// Record a product view.
    ///
    /// # Errors
    ///
    /// Memory-store errors.
    pub async fn record_view(&self, product_id: ProductId) -> Result<()> {
        self.record(product_id, StatKind::View, 1).await
    }

    /// Record a wish-list add.
    ///
    /// # Errors
    ///
    /// Memory-store errors.
    pub async fn record_wish(&self, product_id: ProductId) -> Result<()> {
        self.record(product_id, StatKind::Wish, 1).await
    }

    /// Record a sale of `quantity` units.
    ///
    /// # Errors
    ///
    /// Memory-store errors.
    pub async fn record_sale(&self, product_id: ProductId, quantity: i64) -> Result<()> {
        self.record(product_id, StatKind::Sale, quantity).await
    }

    async fn record(&self, product_id: ProductId, kind: StatKind, quantity: i64) -> Result<()> {
        let event = StatEvent {
            product_id,
            kind,
            quantity,
            occurred_at: self.clock.now(),
        };
        self.buffer.append_log(event.hour_bucket(), &event).await?;
        self.buffer.bump_counter(kind, product_id, quantity).await?;
        Ok(())
    }

    /// Fold the last two closed hours into durable counters and refresh
    /// the ranking. Worker entry point (every 30 minutes).
    ///
    /// # Errors
    ///
    /// Memory-store and durable-store errors.
    pub async fn fold(&self) -> Result<FoldStats> {
        let current_hour = self.clock.now().timestamp() / 3600;
        let mut total = FoldStats::default();
        let mut touched: Vec<ProductId> = Vec::new();

        for hour in [current_hour - 1, current_hour - 2] {
            let folded = self.fold_hour(hour).await?;
            total.entries += folded.0;
            touched.extend(folded.1);
        }

        touched.sort_unstable();
        touched.dedup();
        total.products = touched.len();

        if !touched.is_empty() {
            self.refresh_ranking(&touched).await?;
            tracing::info!(
                entries = total.entries,
                products = total.products,
                "statistics fold finished"
            );
        }
        Ok(total)
    }

    /// Fold a single hour bucket; returns `(entries, touched products)`.
    ///
    /// # Errors
    ///
    /// Memory-store and durable-store errors.
    pub async fn fold_hour(&self, hour: i64) -> Result<(usize, Vec<ProductId>)> {
        let mut entries_folded = 0;
        let mut touched = Vec::new();

        // A crashed fold leaves entries in the scratch key; persist those
        // before rotating the live log into it.
        let leftovers = self.buffer.read_scratch(hour).await?;
        if !leftovers.is_empty() {
            tracing::warn!(hour, entries = leftovers.len(), "folding leftover scratch");
            touched.extend(self.persist_entries(&leftovers).await?);
            entries_folded += leftovers.len();
            self.buffer.discard_scratch(hour).await?;
        }

        if self.buffer.rotate_log(hour).await? {
            let entries = self.buffer.read_scratch(hour).await?;
            touched.extend(self.persist_entries(&entries).await?);
            entries_folded += entries.len();
            // Only after the durable commit may the scratch disappear.
            self.buffer.discard_scratch(hour).await?;
        }

        Ok((entries_folded, touched))
    }

    /// Aggregate entries by `(product, kind)` and persist in chunks, each
    /// chunk retried on transient failure.
    async fn persist_entries(&self, entries: &[StatEvent]) -> Result<Vec<ProductId>> {
        let mut aggregated: HashMap<(ProductId, StatKind), i64> = HashMap::new();
        for entry in entries {
            *aggregated.entry((entry.product_id, entry.kind)).or_insert(0) += entry.quantity;
        }

        let mut deltas: Vec<StatDelta> = aggregated
            .into_iter()
            .map(|((product_id, kind), amount)| StatDelta {
                product_id,
                kind,
                amount,
            })
            .collect();
        deltas.sort_by_key(|d| (d.product_id, d.kind as u8));

        for chunk in deltas.chunks(FOLD_CHUNK) {
            retry_with_backoff(
                RetryPolicy::builder()
                    .max_retries(3)
                    .initial_delay(StdDuration::from_millis(50))
                    .jitter(0.3)
                    .build(),
                || self.stores.apply_deltas(chunk),
            )
            .await?;
        }

        let mut products: Vec<ProductId> = deltas.iter().map(|d| d.product_id).collect();
        products.sort_unstable();
        products.dedup();
        Ok(products)
    }

    /// Recompute scores for the given products from their durable counters
    /// and upsert the ranking.
    async fn refresh_ranking(&self, products: &[ProductId]) -> Result<()> {
        let stats = self.stores.get_many(products).await?;
        let entries: Vec<PopularProduct> = stats
            .iter()
            .map(|s| PopularProduct {
                product_id: s.product_id,
                score: s.popularity_score(),
            })
            .collect();
        self.stores.upsert_ranking(&entries).await
    }

    /// Evict and repopulate every `popular(limit)` cache. Worker entry
    /// point, scheduled right after the fold.
    ///
    /// # Errors
    ///
    /// Memory-store and durable-store errors.
    pub async fn warm_popular_cache(&self) -> Result<()> {
        for limit in POPULAR_LIMITS {
            let key = keys::cache_popular(limit);
            self.buffer.delete(&key).await?;
            // The read path repopulates the cache.
            self.popular(limit).await?;
        }
        Ok(())
    }

    /// Top products by popularity, cache-aside.
    ///
    /// # Errors
    ///
    /// Memory-store and durable-store errors.
    pub async fn popular(&self, limit: usize) -> Result<Vec<PopularProduct>> {
        let key = keys::cache_popular(limit);
        if let Some(cached) = self.buffer.get_json(&key).await? {
            if let Ok(list) = serde_json::from_value::<Vec<PopularProduct>>(cached) {
                return Ok(list);
            }
        }

        let top = self.stores.top_ranked(limit).await?;
        let value = serde_json::to_value(&top)
            .map_err(|e| storefront_core::CommerceError::Serialization(e.to_string()))?;
        self.buffer.put_json(&key, &value, POPULAR_CACHE_TTL).await?;
        Ok(top)
    }

    /// Durable counters for one product.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn product_statistics(
        &self,
        product_id: ProductId,
    ) -> Result<Option<ProductStatistics>> {
        self.stores.get_statistics(product_id).await
    }

    /// Realtime (unfolded) counter value.
    ///
    /// # Errors
    ///
    /// Memory-store errors.
    pub async fn realtime_counter(&self, kind: StatKind, product_id: ProductId) -> Result<i64> {
        self.buffer.realtime_count(kind, product_id).await
    }
}
