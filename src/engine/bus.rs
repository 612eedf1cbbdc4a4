//! Change notification bus.
//!
//! Handlers receive the full snapshot after every committed mutation, in
//! subscription order. There is no queuing or deduplication.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, error};

use crate::model::ProgressDocument;

type Handler = Arc<dyn Fn(&ProgressDocument) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // A panicking handler never runs under the lock, but recover anyway.
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Default)]
pub struct NotificationBus {
    registry: Arc<Mutex<Registry>>,
}

/// Capability returned by [`NotificationBus::subscribe`]. Dropping it keeps the
/// handler registered; call [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).handlers.retain(|(id, _)| *id != self.id);
            debug!(subscription = self.id, "Progress subscriber removed");
        }
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ProgressDocument) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.handlers.push((id, Arc::new(handler)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).handlers.len()
    }

    /// Delivers `snapshot` to every handler. A panicking handler is logged and
    /// skipped; the rest still run.
    pub fn notify(&self, snapshot: &ProgressDocument) {
        // Handlers may subscribe or unsubscribe while being notified.
        let handlers: Vec<(u64, Handler)> = lock(&self.registry).handlers.clone();
        for (id, handler) in handlers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(snapshot)));
            if result.is_err() {
                error!(subscription = id, "Progress subscriber panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_delivers_in_subscription_order() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = seen.clone();
        let _a = bus.subscribe(move |_| s1.lock().unwrap().push("first"));
        let s2 = seen.clone();
        let _b = bus.subscribe(move |_| s2.lock().unwrap().push("second"));

        bus.notify(&ProgressDocument::default());
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = NotificationBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let sub = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.notify(&ProgressDocument::default());
        sub.unsubscribe();
        bus.notify(&ProgressDocument::default());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = NotificationBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _bad = bus.subscribe(|_| panic!("render failed"));
        let c = count.clone();
        let _good = bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.notify(&ProgressDocument::default());
        bus.notify(&ProgressDocument::default());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_every_notify_is_a_full_round() {
        let bus = NotificationBus::new();
        let levels = Arc::new(Mutex::new(Vec::new()));
        let l = levels.clone();
        let _s = bus.subscribe(move |doc| l.lock().unwrap().push(doc.user_profile.level));

        let mut doc = ProgressDocument::default();
        bus.notify(&doc);
        doc.user_profile.level = 2;
        bus.notify(&doc);
        bus.notify(&doc);
        assert_eq!(*levels.lock().unwrap(), vec![1, 2, 2]);
    }
}
