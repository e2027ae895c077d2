//! The assembled service bundle and the dyn facade the HTTP layer uses.
//!
//! [`Services`] wires every domain service over one durable-store handle,
//! one memory-store handle, one lock manager, one gateway and one clock.
//! [`CommerceApi`] erases all those type parameters behind boxed futures so
//! the web crate can hold a plain `Arc<dyn CommerceApi>`.

use crate::coupon::{CouponIssueService, CouponService};
use crate::fulfillment::{CartService, DeliveryService};
use crate::handlers::{
    CartEventHandler, CouponEventHandler, DeliveryEventHandler, InventoryEventHandler,
    NotificationHandler, OrderEventHandler, PaymentEventHandler, PointEventHandler,
    StatsEventHandler,
};
use crate::inventory::InventoryService;
use crate::locks::UserLockTable;
use crate::notifier::NotifierRegistry;
use crate::order::OrderService;
use crate::payment::{PaymentReceipt, PaymentRequest, PaymentSaga};
use crate::point::PointService;
use crate::stats::StatisticsService;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use storefront_core::clock::Clock;
use storefront_core::coupon::AdmissionOutcome;
use storefront_core::error::Result;
use storefront_core::gateway::PaymentGateway;
use storefront_core::ids::{CouponId, OrderId, ProductId, UserId};
use storefront_core::lock::LockManager;
use storefront_core::memstore::{CacheStore, CouponAdmissionStore, StatsBuffer};
use storefront_core::notify::{Notification, NotificationBus};
use storefront_core::order::{Order, OrderItem};
use storefront_core::point::{BalanceHistory, UserBalance};
use storefront_core::stats::PopularProduct;
use storefront_core::store::{
    BalanceStore, CartStore, CouponStore, DeliveryStore, HandledEventStore, InventoryStore,
    OrderStore, OutboxStore, PaymentStore, StatsStore,
};
use storefront_runtime::registry::HandlerRegistry;
use tokio::sync::broadcast;

/// Boxed future alias for the dyn-compatible facade.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The surface the HTTP layer consumes.
///
/// Methods mirror the external interface one-to-one; boxed futures keep
/// the trait dyn-compatible (`Arc<dyn CommerceApi>`).
pub trait CommerceApi: Send + Sync {
    /// Create an order for a user.
    fn create_order(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
        coupon_ids: Vec<CouponId>,
    ) -> ApiFuture<'_, Order>;

    /// Load an order.
    fn get_order(&self, order_id: OrderId) -> ApiFuture<'_, Order>;

    /// Current point balance.
    fn balance(&self, user_id: UserId) -> ApiFuture<'_, UserBalance>;

    /// Point histories, newest first, capped at 100.
    fn point_histories(&self, user_id: UserId) -> ApiFuture<'_, Vec<BalanceHistory>>;

    /// Charge points.
    fn charge_points(
        &self,
        user_id: UserId,
        amount: i64,
        description: String,
    ) -> ApiFuture<'_, UserBalance>;

    /// Deduct points.
    fn deduct_points(
        &self,
        user_id: UserId,
        amount: i64,
        order_id: Option<OrderId>,
        description: String,
    ) -> ApiFuture<'_, UserBalance>;

    /// Run the payment saga.
    fn process_payment(&self, request: PaymentRequest) -> ApiFuture<'_, PaymentReceipt>;

    /// Request a limited-coupon issue (fast admission path).
    fn issue_coupon(&self, coupon_id: CouponId, user_id: UserId)
    -> ApiFuture<'_, AdmissionOutcome>;

    /// Popular products, cache-aside.
    fn popular_products(&self, limit: usize) -> ApiFuture<'_, Vec<PopularProduct>>;

    /// Record a product view (statistics ingest).
    fn record_view(&self, product_id: ProductId) -> ApiFuture<'_, ()>;

    /// Subscribe to a user's realtime notifications.
    fn subscribe(
        &self,
        user_id: UserId,
    ) -> Pin<Box<dyn Future<Output = broadcast::Receiver<Notification>> + Send + '_>>;
}

/// Every domain service wired over shared backends.
pub struct Services<S, K, L, G, C> {
    stores: S,
    /// Order lifecycle.
    pub orders: Arc<OrderService<S, C>>,
    /// Point balance engine.
    pub points: Arc<PointService<S, L, C>>,
    /// Payment saga coordinator.
    pub payments: Arc<PaymentSaga<S, G, L, C>>,
    /// Coupon consumption and compensation.
    pub coupons: Arc<CouponService<S, K>>,
    /// Coupon issuance engine.
    pub coupon_issue: Arc<CouponIssueService<S, K, L, C>>,
    /// Inventory.
    pub inventory: Arc<InventoryService<S>>,
    /// Deliveries.
    pub deliveries: Arc<DeliveryService<S>>,
    /// Carts.
    pub carts: Arc<CartService<S>>,
    /// Statistics aggregator.
    pub stats: Arc<StatisticsService<S, K, C>>,
    /// Realtime subscription registry.
    pub notifier: Arc<NotifierRegistry>,
}

impl<S, K, L, G, C> Services<S, K, L, G, C>
where
    S: OrderStore
        + BalanceStore
        + PaymentStore
        + CouponStore
        + InventoryStore
        + DeliveryStore
        + CartStore
        + StatsStore
        + OutboxStore
        + HandledEventStore
        + Clone
        + Send
        + Sync
        + 'static,
    K: CouponAdmissionStore + StatsBuffer + CacheStore + Clone + Send + Sync + 'static,
    L: LockManager + Clone + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    C: Clock + Clone + Send + Sync + 'static,
{
    /// Wire the full service graph. The per-user lock table is shared
    /// between the point engine and the payment saga so same-user
    /// operations serialize across both.
    pub fn new(stores: S, kv: K, locks: L, gateway: G, clock: C) -> Self {
        let lock_table = Arc::new(UserLockTable::new());
        Self {
            orders: Arc::new(OrderService::new(stores.clone(), clock.clone())),
            points: Arc::new(PointService::new(
                stores.clone(),
                locks.clone(),
                Arc::clone(&lock_table),
                clock.clone(),
            )),
            payments: Arc::new(PaymentSaga::new(
                stores.clone(),
                gateway,
                locks.clone(),
                lock_table,
                clock.clone(),
            )),
            coupons: Arc::new(CouponService::new(stores.clone(), kv.clone())),
            coupon_issue: Arc::new(CouponIssueService::new(
                stores.clone(),
                kv.clone(),
                locks,
                clock.clone(),
            )),
            inventory: Arc::new(InventoryService::new(stores.clone())),
            deliveries: Arc::new(DeliveryService::new(stores.clone())),
            carts: Arc::new(CartService::new(stores.clone())),
            stats: Arc::new(StatisticsService::new(stores.clone(), kv, clock)),
            notifier: NotifierRegistry::shared(),
            stores,
        }
    }

    /// Build the immutable handler registry over these services.
    #[must_use]
    pub fn build_registry<B>(&self, bus: B) -> HandlerRegistry
    where
        B: NotificationBus + 'static,
    {
        HandlerRegistry::builder()
            .register(Arc::new(OrderEventHandler::new(Arc::clone(&self.orders))))
            .register(Arc::new(PaymentEventHandler::new(Arc::clone(&self.orders))))
            .register(Arc::new(InventoryEventHandler::new(
                Arc::clone(&self.inventory),
                Arc::clone(&self.orders),
            )))
            .register(Arc::new(CouponEventHandler::new(
                Arc::clone(&self.coupons),
                Arc::clone(&self.orders),
            )))
            .register(Arc::new(PointEventHandler::new(
                Arc::clone(&self.points),
                self.stores.clone(),
            )))
            .register(Arc::new(DeliveryEventHandler::new(
                Arc::clone(&self.deliveries),
                Arc::clone(&self.orders),
            )))
            .register(Arc::new(CartEventHandler::new(
                Arc::clone(&self.carts),
                Arc::clone(&self.orders),
                self.stores.clone(),
            )))
            .register(Arc::new(StatsEventHandler::new(
                Arc::clone(&self.stats),
                self.stores.clone(),
            )))
            .register(Arc::new(NotificationHandler::new(
                Arc::clone(&self.notifier),
                bus,
            )))
            .build()
    }
}

impl<S, K, L, G, C> CommerceApi for Services<S, K, L, G, C>
where
    S: OrderStore
        + BalanceStore
        + PaymentStore
        + CouponStore
        + InventoryStore
        + DeliveryStore
        + CartStore
        + StatsStore
        + OutboxStore
        + HandledEventStore
        + Clone
        + Send
        + Sync
        + 'static,
    K: CouponAdmissionStore + StatsBuffer + CacheStore + Clone + Send + Sync + 'static,
    L: LockManager + Clone + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    C: Clock + Clone + Send + Sync + 'static,
{
    fn create_order(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
        coupon_ids: Vec<CouponId>,
    ) -> ApiFuture<'_, Order> {
        Box::pin(async move { self.orders.create_order(user_id, items, coupon_ids).await })
    }

    fn get_order(&self, order_id: OrderId) -> ApiFuture<'_, Order> {
        Box::pin(async move { self.orders.get(order_id).await })
    }

    fn balance(&self, user_id: UserId) -> ApiFuture<'_, UserBalance> {
        Box::pin(async move { self.points.balance(user_id).await })
    }

    fn point_histories(&self, user_id: UserId) -> ApiFuture<'_, Vec<BalanceHistory>> {
        Box::pin(async move { self.points.histories(user_id).await })
    }

    fn charge_points(
        &self,
        user_id: UserId,
        amount: i64,
        description: String,
    ) -> ApiFuture<'_, UserBalance> {
        Box::pin(async move { self.points.charge(user_id, amount, &description).await })
    }

    fn deduct_points(
        &self,
        user_id: UserId,
        amount: i64,
        order_id: Option<OrderId>,
        description: String,
    ) -> ApiFuture<'_, UserBalance> {
        Box::pin(async move {
            self.points
                .deduct(user_id, amount, order_id, &description)
                .await
        })
    }

    fn process_payment(&self, request: PaymentRequest) -> ApiFuture<'_, PaymentReceipt> {
        Box::pin(async move { self.payments.process(request).await })
    }

    fn issue_coupon(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
    ) -> ApiFuture<'_, AdmissionOutcome> {
        Box::pin(async move { self.coupon_issue.request_issue(coupon_id, user_id).await })
    }

    fn popular_products(&self, limit: usize) -> ApiFuture<'_, Vec<PopularProduct>> {
        Box::pin(async move { self.stats.popular(limit).await })
    }

    fn record_view(&self, product_id: ProductId) -> ApiFuture<'_, ()> {
        Box::pin(async move { self.stats.record_view(product_id).await })
    }

    fn subscribe(
        &self,
        user_id: UserId,
    ) -> Pin<Box<dyn Future<Output = broadcast::Receiver<Notification>> + Send + '_>> {
        Box::pin(async move { self.notifier.subscribe(user_id).await })
    }
}
