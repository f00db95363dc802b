//! Ordered subscriber registry with synchronous delivery.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::Frame;

/// Receives every frame a transport reads.
///
/// `update` runs synchronously on the task that called `read()`, before the
/// caller sees the frame, so it should return quickly.
pub trait Subscriber: Send + Sync {
    /// Handle one received frame.
    fn update(&self, frame: &Frame);
}

impl<F> Subscriber for F
where
    F: Fn(&Frame) + Send + Sync,
{
    fn update(&self, frame: &Frame) {
        self(frame)
    }
}

/// Handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    subscriber: Weak<dyn Subscriber>,
}

impl Registration {
    fn refers_to(&self, ptr: *const ()) -> bool {
        self.subscriber.as_ptr() as *const () == ptr
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Registration>,
}

/// Delivers received frames to subscribers in registration order.
///
/// The bus holds subscribers weakly: the registrant keeps the `Arc` and a
/// dropped subscriber is pruned on the next delivery. Clones share the
/// same registry.
#[derive(Clone, Default)]
pub struct NotificationBus {
    registry: Arc<Mutex<Registry>>,
}

impl NotificationBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber. The same subscriber may be registered twice and
    /// is then notified twice.
    pub fn add_subscriber<S>(&self, subscriber: &Arc<S>) -> SubscriptionId
    where
        S: Subscriber + 'static,
    {
        let weak: Weak<S> = Arc::downgrade(subscriber);
        let weak: Weak<dyn Subscriber> = weak;
        let mut registry = self.registry.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.entries.push(Registration {
            id,
            subscriber: weak,
        });
        tracing::trace!(subscription = id.0, "subscriber added");
        id
    }

    /// Remove the first registration of `subscriber`.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove_subscriber<S>(&self, subscriber: &Arc<S>) -> bool
    where
        S: Subscriber + ?Sized,
    {
        let ptr = Arc::as_ptr(subscriber) as *const ();
        let mut registry = self.registry.lock();
        match registry.entries.iter().position(|r| r.refers_to(ptr)) {
            Some(index) => {
                let removed = registry.entries.remove(index);
                tracing::trace!(subscription = removed.id.0, "subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Remove the registration with this id.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.entries.len();
        registry.entries.retain(|r| r.id != id);
        before != registry.entries.len()
    }

    /// Number of registrations, including ones whose subscriber was dropped
    /// but not yet pruned.
    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `frame` to every live subscriber, in registration order.
    ///
    /// A subscriber that panics is logged and skipped; the others still
    /// receive the frame. Returns the number of subscribers that handled
    /// the frame without panicking.
    pub fn notify(&self, frame: &Frame) -> usize {
        let live: Vec<Arc<dyn Subscriber>> = {
            let mut registry = self.registry.lock();
            registry.entries.retain(|r| r.subscriber.strong_count() > 0);
            registry
                .entries
                .iter()
                .filter_map(|r| r.subscriber.upgrade())
                .collect()
        };

        let mut delivered = 0;
        for subscriber in live {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber.update(frame))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(len = frame.len(), "subscriber panicked during update");
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.len())
            .finish()
    }
}
