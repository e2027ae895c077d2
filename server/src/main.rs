//! Storefront backend server.
//!
//! Wires the Postgres stores, the Redis memory store, the payment gateway
//! client, the handler registry, every scheduled worker and the HTTP
//! router; shuts everything down on ctrl-c via a shared watch channel.

mod config;
mod gateway;

use config::Config;
use gateway::HttpPaymentGateway;
use std::sync::Arc;
use storefront_core::clock::SystemClock;
use storefront_postgres::PgStores;
use storefront_redis::{RedisKv, RedisLockManager, RedisNotificationBus};
use storefront_runtime::dispatcher::OutboxDispatcher;
use storefront_runtime::dlq_monitor::{DlqMonitor, LogAlertChannel};
use storefront_runtime::scheduler::spawn_periodic;
use storefront_services::Services;
use storefront_services::order::payment_ttl;
use storefront_web::{AppState, router};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

type AppServices =
    Services<PgStores, RedisKv, RedisLockManager, HttpPaymentGateway, SystemClock>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(bind_addr = config.bind_addr.as_str(), "starting storefront server");

    // Backends.
    let stores = PgStores::connect(&config.database_url).await?;
    stores.migrate().await?;
    let kv = RedisKv::connect(&config.redis_url).await?;
    let locks = RedisLockManager::connect(&config.redis_url).await?;
    let bus = RedisNotificationBus::connect(&config.redis_url).await?;
    let payment_gateway = HttpPaymentGateway::new(config.gateway_url.clone());

    // Service graph and handler registry.
    let services: Arc<AppServices> = Arc::new(Services::new(
        stores.clone(),
        kv,
        locks,
        payment_gateway,
        SystemClock,
    ));
    let registry = Arc::new(services.build_registry(bus));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    // Outbox dispatcher.
    let dispatcher = OutboxDispatcher::new(Arc::new(stores.clone()), Arc::clone(&registry));
    let dispatcher_handle = {
        let shutdown = shutdown_rx.clone();
        let interval = config.dispatch_interval;
        tokio::spawn(async move { dispatcher.run(interval, shutdown).await })
    };

    // DLQ monitoring.
    let dlq_monitor = Arc::new(DlqMonitor::new(
        Arc::new(stores.clone()),
        Arc::new(LogAlertChannel),
    ));
    let check_monitor = Arc::clone(&dlq_monitor);
    workers.push(spawn_periodic(
        "dlq-check",
        config.dlq_check_interval,
        shutdown_rx.clone(),
        move || {
            let monitor = Arc::clone(&check_monitor);
            async move { monitor.check().await.map(|_| ()) }
        },
    ));
    let report_monitor = Arc::clone(&dlq_monitor);
    workers.push(spawn_periodic(
        "dlq-report",
        config.dlq_report_interval,
        shutdown_rx.clone(),
        move || {
            let monitor = Arc::clone(&report_monitor);
            async move { monitor.report().await.map(|_| ()) }
        },
    ));

    // Coupon drain.
    let drain_services = Arc::clone(&services);
    workers.push(spawn_periodic(
        "coupon-drain",
        config.coupon_drain_interval,
        shutdown_rx.clone(),
        move || {
            let services = Arc::clone(&drain_services);
            async move { services.coupon_issue.drain_all().await.map(|_| ()) }
        },
    ));

    // Statistics fold + cache warm.
    let fold_services = Arc::clone(&services);
    workers.push(spawn_periodic(
        "stats-fold",
        config.stats_fold_interval,
        shutdown_rx.clone(),
        move || {
            let services = Arc::clone(&fold_services);
            async move {
                services.stats.fold().await?;
                services.stats.warm_popular_cache().await
            }
        },
    ));

    // Order expiry.
    let expiry_services = Arc::clone(&services);
    workers.push(spawn_periodic(
        "order-expiry",
        config.order_expiry_interval,
        shutdown_rx.clone(),
        move || {
            let services = Arc::clone(&expiry_services);
            async move { services.orders.expire_overdue(payment_ttl()).await.map(|_| ()) }
        },
    ));

    // Cross-instance notification fan-in.
    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    let subscriber =
        RedisNotificationBus::spawn_subscriber(&config.redis_url, notify_tx, shutdown_rx.clone())
            .await?;
    workers.push(subscriber);
    let fanin_registry = Arc::clone(&services.notifier);
    workers.push(tokio::spawn(async move {
        while let Some(notification) = notify_rx.recv().await {
            fanin_registry.notify(&notification).await;
        }
    }));

    // HTTP surface.
    let app = router(AppState::new(services));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = config.bind_addr.as_str(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Stop the workers and wait for everything to wind down.
    let _ = shutdown_tx.send(true);
    let _ = dispatcher_handle.await;
    for worker in workers {
        let _ = worker.await;
    }
    tracing::info!("storefront server stopped");
    Ok(())
}
