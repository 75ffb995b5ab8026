//! Refs
//!
//! A ref is a single reactive cell. Reads track `(ref, Value)`, writes of a
//! different value trigger it. Structured values stored in a ref are wrapped,
//! so their properties are reactive too.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::runtime::Runtime;
use super::store::{ContainerToken, Prop};
use crate::graph::{ContainerId, DepKey, Key};

struct RefInner {
    runtime: Runtime,
    token: Rc<ContainerToken>,
    value: RefCell<Prop>,
}

/// A reactive single-value cell.
///
/// # Example
///
/// ```rust
/// use trellis_core::{Effect, Ref, Runtime};
///
/// let runtime = Runtime::new();
/// let count = Ref::new(&runtime, 1);
///
/// let observed = count.clone();
/// let effect = Effect::new(&runtime, move || {
///     let _ = observed.get();
/// });
///
/// count.set(2);
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Ref {
    inner: Rc<RefInner>,
}

impl Ref {
    pub fn new(runtime: &Runtime, value: impl Into<Value>) -> Self {
        Self {
            inner: Rc::new(RefInner {
                runtime: runtime.clone(),
                token: runtime.cell_container(),
                value: RefCell::new(runtime.to_reactive(value.into())),
            }),
        }
    }

    /// Read the current value. The read is tracked.
    pub fn get(&self) -> Prop {
        self.inner.runtime.track(self.id(), Key::Value);
        self.inner.value.borrow().clone()
    }

    /// Read the current value as a deep snapshot.
    pub fn get_value(&self) -> Value {
        self.get().to_value()
    }

    /// Read without tracking.
    pub fn peek(&self) -> Prop {
        self.inner.value.borrow().clone()
    }

    /// Replace the value. Writing a value equal to the current one is a
    /// no-op.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        if self.inner.value.borrow().to_value() == value {
            return;
        }
        let next = self.inner.runtime.to_reactive(value);
        let previous = self.inner.value.replace(next);
        drop(previous);
        self.inner
            .runtime
            .inner
            .notify(&DepKey::new(self.id(), Key::Value));
    }

    /// Apply `f` to the current value and store the result.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) {
        let current = self.inner.value.borrow().to_value();
        self.set(f(&current));
    }

    /// The identity readers of this ref subscribe to.
    pub fn id(&self) -> ContainerId {
        self.inner.token.id()
    }
}

impl Runtime {
    /// Create a [`Ref`] holding `value`.
    pub fn create_ref(&self, value: impl Into<Value>) -> Ref {
        Ref::new(self, value)
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.id())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}
