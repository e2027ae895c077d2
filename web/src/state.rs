//! Application state for Axum handlers.

use std::sync::Arc;
use storefront_services::CommerceApi;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The service facade.
    pub api: Arc<dyn CommerceApi>,
}

impl AppState {
    /// Wrap the service facade.
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>) -> Self {
        Self { api }
    }
}
