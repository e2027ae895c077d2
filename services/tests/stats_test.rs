//! Statistics aggregator scenarios: the rename-then-read fold, crash
//! recovery from scratch keys, ranking and cache warming.

#![allow(clippy::unwrap_used)]

use chrono::Duration;
use storefront_core::clock::Clock;
use storefront_core::ids::ProductId;
use storefront_core::keys;
use storefront_core::memstore::{CacheStore, StatsBuffer};
use storefront_core::stats::StatKind;
use storefront_services::stats::{POPULAR_LIMITS, StatisticsService};
use storefront_testing::mocks::{AdjustableClock, MemoryKv, MemoryStores};

type Service = StatisticsService<MemoryStores, MemoryKv, AdjustableClock>;

fn setup() -> (Service, MemoryStores, MemoryKv, AdjustableClock) {
    let clock = AdjustableClock::at_test_epoch();
    let stores = MemoryStores::new(clock.clone());
    let kv = MemoryKv::new();
    let service = StatisticsService::new(stores.clone(), kv.clone(), clock.clone());
    (service, stores, kv, clock)
}

/// S7: 1000 views for product 42 in hour `h`; at `h+1` the fold worker
/// runs twice; the durable view count increases by exactly 1000.
#[tokio::test]
async fn fold_is_idempotent_across_runs() {
    let (stats, _stores, kv, clock) = setup();
    let product = ProductId::new(42);

    for _ in 0..1000 {
        stats.record_view(product).await.unwrap();
    }
    assert_eq!(kv.realtime_count(StatKind::View, product).await.unwrap(), 1000);

    clock.advance(Duration::hours(1));
    let first = stats.fold().await.unwrap();
    assert_eq!(first.entries, 1000);
    assert_eq!(first.products, 1);

    let second = stats.fold().await.unwrap();
    assert_eq!(second.entries, 0);

    let durable = stats.product_statistics(product).await.unwrap().unwrap();
    assert_eq!(durable.view_count, 1000);
}

/// Crash recovery: entries stranded in the scratch key by a crashed fold
/// are persisted by the next fold before the live log rotates.
#[tokio::test]
async fn leftover_scratch_is_folded_first() {
    let (stats, _stores, kv, clock) = setup();
    let product = ProductId::new(42);
    let hour = clock.now().timestamp() / 3600;

    // Simulate the crash window: events were renamed to scratch but never
    // persisted or discarded.
    for _ in 0..3 {
        stats.record_view(product).await.unwrap();
    }
    assert!(kv.rotate_log(hour).await.unwrap());

    // New traffic lands in a fresh log for the same hour.
    for _ in 0..2 {
        stats.record_wish(product).await.unwrap();
    }

    clock.advance(Duration::hours(1));
    let folded = stats.fold().await.unwrap();
    assert_eq!(folded.entries, 5);

    let durable = stats.product_statistics(product).await.unwrap().unwrap();
    assert_eq!(durable.view_count, 3);
    assert_eq!(durable.wish_count, 2);
}

/// Events spread over the two folded hours all land.
#[tokio::test]
async fn fold_covers_both_closed_hours() {
    let (stats, _stores, _kv, clock) = setup();
    let product = ProductId::new(7);

    stats.record_view(product).await.unwrap();
    clock.advance(Duration::hours(1));
    stats.record_view(product).await.unwrap();
    clock.advance(Duration::hours(1));

    let folded = stats.fold().await.unwrap();
    assert_eq!(folded.entries, 2);
    let durable = stats.product_statistics(product).await.unwrap().unwrap();
    assert_eq!(durable.view_count, 2);
}

#[tokio::test]
async fn ranking_orders_by_weighted_score() {
    let (stats, _stores, _kv, clock) = setup();

    // score = 0.4·sales + 0.3·views + 0.3·wishes
    // product 1: 10 sales → 4.0; product 2: 10 views → 3.0;
    // product 3: 20 wishes → 6.0.
    stats.record_sale(ProductId::new(1), 10).await.unwrap();
    for _ in 0..10 {
        stats.record_view(ProductId::new(2)).await.unwrap();
    }
    for _ in 0..20 {
        stats.record_wish(ProductId::new(3)).await.unwrap();
    }

    clock.advance(Duration::hours(1));
    stats.fold().await.unwrap();

    let popular = stats.popular(3).await.unwrap();
    let ids: Vec<i64> = popular.iter().map(|p| p.product_id.value()).collect();
    assert_eq!(ids, vec![3, 1, 2]);
    assert!((popular[0].score - 6.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn popular_reads_are_cache_aside() {
    let (stats, _stores, kv, clock) = setup();

    stats.record_sale(ProductId::new(1), 5).await.unwrap();
    stats.record_sale(ProductId::new(2), 50).await.unwrap();
    clock.advance(Duration::hours(1));
    stats.fold().await.unwrap();

    assert!(kv.get_json(&keys::cache_popular(5)).await.unwrap().is_none());
    let first = stats.popular(5).await.unwrap();
    assert_eq!(first[0].product_id, ProductId::new(2));

    // The second read is served from the cache the first one filled.
    assert!(kv.get_json(&keys::cache_popular(5)).await.unwrap().is_some());
    let second = stats.popular(5).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn cache_warmer_populates_every_limit() {
    let (stats, _stores, kv, clock) = setup();
    stats.record_sale(ProductId::new(1), 3).await.unwrap();
    clock.advance(Duration::hours(1));
    stats.fold().await.unwrap();

    stats.warm_popular_cache().await.unwrap();
    for limit in POPULAR_LIMITS {
        assert!(
            kv.get_json(&keys::cache_popular(limit)).await.unwrap().is_some(),
            "popular({limit}) cache should be warm"
        );
    }
}

/// Chunked persistence: more than one chunk's worth of distinct products
/// still folds completely.
#[tokio::test]
async fn fold_handles_many_products() {
    let (stats, _stores, _kv, clock) = setup();
    for product in 1..=250_i64 {
        stats.record_view(ProductId::new(product)).await.unwrap();
    }
    clock.advance(Duration::hours(1));

    let folded = stats.fold().await.unwrap();
    assert_eq!(folded.entries, 250);
    assert_eq!(folded.products, 250);

    for product in [1_i64, 125, 250] {
        let durable = stats
            .product_statistics(ProductId::new(product))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(durable.view_count, 1);
    }
}
