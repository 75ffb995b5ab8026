//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values.
//! This includes effects, computed values, watchers and component renders.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Each subscriber gets a unique ID when created. The dependency graph stores
/// only these IDs; the runtime resolves them through a weak registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation that can be notified when one of its dependencies changes.
pub trait Subscriber {
    /// The subscriber's ID.
    fn subscriber_id(&self) -> SubscriberId;

    /// Derived values are notified in the first pass of `trigger`, before
    /// every other subscriber.
    fn is_derived(&self) -> bool;

    /// A dependency changed: run now, or hand off to the scheduler hook.
    fn notify(self: Rc<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    struct Counter {
        id: SubscriberId,
        hits: Cell<u32>,
    }

    impl Subscriber for Counter {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn is_derived(&self) -> bool {
            false
        }

        fn notify(self: Rc<Self>) {
            self.hits.set(self.hits.get() + 1);
        }
    }

    #[test]
    fn notify_through_trait_object() {
        let counter = Rc::new(Counter {
            id: SubscriberId::new(),
            hits: Cell::new(0),
        });
        let erased: Rc<dyn Subscriber> = counter.clone();

        erased.notify();
        assert_eq!(counter.hits.get(), 1);
    }
}
