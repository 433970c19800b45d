// @zen-component: SESSION-InvalidationBus
//
//! Process-wide "credentials no longer valid" broadcast.
//!
//! The HTTP layer publishes, the session orchestrator listens. Neither side
//! imports the other. Delivery is synchronous: `publish` returns after every
//! handler registered at call time has run. Nothing is queued or replayed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::scope::Scope;

/// Conventional event name, kept for log correlation with the web client.
pub const UNAUTHORIZED_EVENT: &str = "auth:unauthorized";

/// "This scope's credentials are no longer valid."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationEvent {
    pub scope: Scope,
}

type Handler = Arc<dyn Fn(InvalidationEvent) + Send + Sync>;

struct Registry {
    next_id: AtomicU64,
    handlers: DashMap<u64, Handler>,
}

/// Broadcast channel for [`InvalidationEvent`]s. Clones share subscribers.
#[derive(Clone)]
pub struct InvalidationBus {
    registry: Arc<Registry>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                handlers: DashMap::new(),
            }),
        }
    }

    /// Deliver `{ scope }` to every current subscriber.
    pub fn publish(&self, scope: Scope) {
        // Snapshot first: handlers may unsubscribe while running.
        let handlers: Vec<Handler> = self
            .registry
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        debug!(
            event = UNAUTHORIZED_EVENT,
            scope = %scope,
            subscribers = handlers.len(),
            "publishing invalidation"
        );
        let event = InvalidationEvent { scope };
        for handler in handlers {
            handler(event);
        }
    }

    /// Register `handler`. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(InvalidationEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.handlers.insert(id, Arc::new(handler));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.handlers.len()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`InvalidationBus::subscribe`].
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.handlers.remove(&self.id);
        }
    }
}
