//! Computed Values
//!
//! A computed value caches the result of a getter and recomputes lazily.
//!
//! # How Computed Values Work
//!
//! 1. On first access, the getter runs inside the computed's own derived
//!    effect and its reads become the computed's dependencies.
//!
//! 2. The result is cached. Later reads return the cache without running
//!    the getter.
//!
//! 3. When a dependency changes, the derived effect does not recompute. It
//!    marks the cache stale and notifies whoever read the computed. Because
//!    derived effects are notified before everything else, an effect reading
//!    both a source and a computed of it never sees a stale computed.
//!
//! 4. The next read recomputes.
//!
//! Readers track the computed's own identity-only container, so a computed
//! can be read by effects, other computed values and watchers alike.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::effect::Effect;
use super::runtime::Runtime;
use super::store::ContainerToken;
use crate::graph::{ContainerId, DepKey, Key};

struct ComputedInner<T> {
    runtime: Runtime,
    token: Rc<ContainerToken>,
    effect: Effect,
    getter: Box<dyn Fn() -> T>,
    cache: RefCell<Option<T>>,
    dirty: Rc<Cell<bool>>,
}

/// A lazily recomputed, cached derived value.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trellis_core::{Computed, Runtime};
///
/// let runtime = Runtime::new();
/// let state = runtime.reactive(json!({ "count": 2 })).unwrap();
///
/// let source = state.clone();
/// let doubled = Computed::new(&runtime, move || {
///     source.get("count").and_then(|c| c.as_i64()).unwrap_or(0) * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// state.set("count", 5).unwrap();
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value. The getter does not run until first read.
    pub fn new<F>(runtime: &Runtime, getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let token = runtime.cell_container();
        let dirty = Rc::new(Cell::new(true));

        let effect = {
            let dirty = Rc::clone(&dirty);
            let weak = Rc::downgrade(&runtime.inner);
            let id = token.id();
            Effect::derived(
                runtime,
                Rc::new(move |_: &Effect| {
                    if dirty.replace(true) {
                        return;
                    }
                    trace!(%id, "computed marked stale");
                    if let Some(runtime) = weak.upgrade() {
                        runtime.notify(&DepKey::new(id, Key::Value));
                    }
                }),
            )
        };

        Self {
            inner: Rc::new(ComputedInner {
                runtime: runtime.clone(),
                token,
                effect,
                getter: Box::new(getter),
                cache: RefCell::new(None),
                dirty,
            }),
        }
    }

    /// Read the value, recomputing if a dependency changed since the last
    /// read. The read is tracked.
    pub fn get(&self) -> T {
        let inner = &self.inner;
        inner.runtime.track(inner.token.id(), Key::Value);

        if !inner.dirty.get() {
            if let Some(value) = inner.cache.borrow().clone() {
                return value;
            }
        }

        let value = match inner.effect.scope(|| (inner.getter)()) {
            Some(value) => {
                inner.dirty.set(false);
                value
            }
            // Re-entered from its own getter: serve the last value.
            None => match inner.cache.borrow().clone() {
                Some(value) => return value,
                None => inner.runtime.untracked(|| (inner.getter)()),
            },
        };
        *inner.cache.borrow_mut() = Some(value.clone());
        value
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Number of times the getter has run.
    pub fn compute_count(&self) -> u64 {
        self.inner.effect.run_count()
    }

    /// The identity readers of this computed subscribe to.
    pub fn id(&self) -> ContainerId {
        self.inner.token.id()
    }
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("dirty", &self.is_dirty())
            .field("cache", &*self.inner.cache.borrow())
            .finish()
    }
}
