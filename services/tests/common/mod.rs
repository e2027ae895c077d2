//! Shared harness for service integration tests: the full service graph
//! over in-memory backends, plus a dispatcher wired to the real handler
//! registry.

#![allow(dead_code)] // each integration test binary uses a subset
#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use storefront_core::notify::NoopNotificationBus;
use storefront_runtime::dispatcher::OutboxDispatcher;
use storefront_testing::mocks::{
    FixedClock, InMemoryLockManager, MemoryKv, MemoryStores, MockGateway, test_clock,
};

pub type TestServices = storefront_services::Services<
    MemoryStores,
    MemoryKv,
    InMemoryLockManager,
    MockGateway,
    FixedClock,
>;

pub struct Harness {
    pub stores: MemoryStores,
    pub kv: MemoryKv,
    pub gateway: MockGateway,
    pub services: Arc<TestServices>,
    pub dispatcher: OutboxDispatcher<MemoryStores>,
}

impl Harness {
    pub fn new() -> Self {
        let stores = MemoryStores::new(test_clock());
        let kv = MemoryKv::new();
        let gateway = MockGateway::new();
        let services = Arc::new(storefront_services::Services::new(
            stores.clone(),
            kv.clone(),
            InMemoryLockManager::new(),
            gateway.clone(),
            test_clock(),
        ));
        let registry = Arc::new(services.build_registry(NoopNotificationBus));
        let dispatcher = OutboxDispatcher::new(Arc::new(stores.clone()), registry);
        Self {
            stores,
            kv,
            gateway,
            services,
            dispatcher,
        }
    }

    /// Run dispatcher cycles until the outbox drains (or a safety cap).
    pub async fn dispatch_until_idle(&self) {
        for _ in 0..25 {
            let stats = self.dispatcher.run_cycle().await.expect("dispatch cycle");
            if stats.claimed == 0 {
                return;
            }
        }
        panic!("outbox did not drain within 25 cycles");
    }
}
