//! Event handler registry: event type → ordered handler list.
//!
//! The registry is built once at boot and immutable afterwards. Handlers of
//! one event type are sorted by [`EventHandler::priority`] (ties broken by
//! name for determinism); the order handler registers at priority 1 so
//! order-state transitions precede side-effect handlers.

use std::collections::HashMap;
use std::sync::Arc;
use storefront_core::handler::EventHandler;

/// Immutable mapping from event type to its ordered handler list.
pub struct HandlerRegistry {
    by_type: HashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder {
            handlers: Vec::new(),
        }
    }

    /// The ordered handlers for an event type; empty when none registered.
    #[must_use]
    pub fn handlers_for(&self, event_type: &str) -> &[Arc<dyn EventHandler>] {
        self.by_type.get(event_type).map_or(&[], Vec::as_slice)
    }

    /// All event types with at least one handler.
    #[must_use]
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Number of distinct event types covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Whether no handler is registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

/// Collects handlers before the registry is frozen.
pub struct HandlerRegistryBuilder {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl HandlerRegistryBuilder {
    /// Add a handler; it is indexed under every type it advertises.
    #[must_use]
    pub fn register(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> HandlerRegistry {
        let mut by_type: HashMap<String, Vec<Arc<dyn EventHandler>>> = HashMap::new();
        for handler in self.handlers {
            for event_type in handler.event_types() {
                by_type
                    .entry((*event_type).to_string())
                    .or_default()
                    .push(Arc::clone(&handler));
            }
        }
        for handlers in by_type.values_mut() {
            handlers.sort_by_key(|h| (h.priority(), h.name()));
        }

        for (event_type, handlers) in &by_type {
            tracing::debug!(
                event_type = event_type.as_str(),
                handlers = handlers.len(),
                "handlers registered"
            );
        }

        HandlerRegistry { by_type }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use storefront_core::handler::HandlerFuture;
    use storefront_core::outbox::OutboxEvent;

    struct NamedHandler {
        name: &'static str,
        types: &'static [&'static str],
        priority: i32,
    }

    impl EventHandler for NamedHandler {
        fn name(&self) -> &'static str {
            self.name
        }

        fn event_types(&self) -> &'static [&'static str] {
            self.types
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn handle<'a>(&'a self, _event: &'a OutboxEvent) -> HandlerFuture<'a> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn handlers_sorted_by_priority() {
        let registry = HandlerRegistry::builder()
            .register(Arc::new(NamedHandler {
                name: "side-effect",
                types: &["PaymentCompleted"],
                priority: 100,
            }))
            .register(Arc::new(NamedHandler {
                name: "order",
                types: &["PaymentCompleted"],
                priority: 1,
            }))
            .build();

        let handlers = registry.handlers_for("PaymentCompleted");
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].name(), "order");
        assert_eq!(handlers[1].name(), "side-effect");
    }

    #[test]
    fn handler_indexed_under_every_type() {
        let registry = HandlerRegistry::builder()
            .register(Arc::new(NamedHandler {
                name: "multi",
                types: &["OrderCancelled", "PaymentCompleted"],
                priority: 50,
            }))
            .build();

        assert_eq!(registry.handlers_for("OrderCancelled").len(), 1);
        assert_eq!(registry.handlers_for("PaymentCompleted").len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unknown_type_has_no_handlers() {
        let registry = HandlerRegistry::builder().build();
        assert!(registry.handlers_for("Whatever").is_empty());
        assert!(registry.is_empty());
    }
}
