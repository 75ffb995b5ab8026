//! Reactive Containers
//!
//! Structured state (JSON objects and arrays) lives in the runtime's arena and
//! is accessed through [`Reactive`], an explicit accessor: every read goes
//! through `get`/`keys`/`len` and is tracked, every write goes through
//! `set`/`push`/`remove` and triggers.
//!
//! # Lazy nesting
//!
//! Wrapping is shallow. A nested object or array stays a raw JSON value inside
//! its parent until it is first read through the wrapper; at that point it is
//! moved into its own arena slot and the parent keeps a reference to it. Later
//! reads return the same nested wrapper. Substructures that are never reached
//! are never wrapped.
//!
//! # Identity
//!
//! All handles to one container share one `Rc<ContainerToken>`. Two
//! `Reactive`s are equal iff they address the same container. When the last
//! token reference goes away the container id is retired and garbage collection
//! removes its data and its dependency entries.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::runtime::{Runtime, RuntimeInner};
use crate::error::ReactiveError;
use crate::graph::{ContainerId, DepKey, Key};

/// A slot inside a container.
pub(crate) enum Slot {
    /// A primitive, or a structured value that has not been read yet.
    Raw(Value),
    /// A structured value promoted to its own container.
    Nested(Rc<ContainerToken>),
}

impl Slot {
    fn same_as(&self, other: &Slot) -> bool {
        match (self, other) {
            (Slot::Raw(a), Slot::Raw(b)) => a == b,
            (Slot::Nested(a), Slot::Nested(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Container data held by the arena.
pub(crate) enum Container {
    Object(IndexMap<String, Slot>),
    Array(Vec<Slot>),
    /// A ref or computed: the value lives in the handle, the arena only
    /// provides the identity for dependency entries.
    Cell,
}

impl Container {
    fn from_structured(value: Value) -> Self {
        match value {
            Value::Array(items) => Container::Array(items.into_iter().map(Slot::Raw).collect()),
            Value::Object(map) => Container::Object(
                map.into_iter()
                    .map(|(name, value)| (name, Slot::Raw(value)))
                    .collect(),
            ),
            // Callers only pass structured values.
            other => Container::Array(vec![Slot::Raw(other)]),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Container::Object(_) => "object",
            Container::Array(_) => "array",
            Container::Cell => "cell",
        }
    }

    fn slot_mut(&mut self, key: &Key) -> Option<&mut Slot> {
        match (self, key) {
            (Container::Object(map), Key::Field(name)) => map.get_mut(name),
            (Container::Array(items), Key::Index(index)) => items.get_mut(*index),
            _ => None,
        }
    }
}

/// The container arena of one runtime.
#[derive(Default)]
pub(crate) struct Store {
    entries: HashMap<ContainerId, Container>,
}

impl Store {
    pub(crate) fn contains(&self, id: ContainerId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn remove(&mut self, id: ContainerId) -> Option<Container> {
        self.entries.remove(&id)
    }

    fn get(&self, id: ContainerId) -> Result<&Container, ReactiveError> {
        self.entries
            .get(&id)
            .ok_or(ReactiveError::UnknownContainer(id))
    }

    fn get_mut(&mut self, id: ContainerId) -> Result<&mut Container, ReactiveError> {
        self.entries
            .get_mut(&id)
            .ok_or(ReactiveError::UnknownContainer(id))
    }

    fn snapshot(&self, id: ContainerId, seen: &mut HashSet<ContainerId>) -> Value {
        if !seen.insert(id) {
            return Value::Null;
        }
        let value = match self.entries.get(&id) {
            Some(Container::Object(map)) => Value::Object(
                map.iter()
                    .map(|(name, slot)| (name.clone(), self.snapshot_slot(slot, seen)))
                    .collect::<Map<_, _>>(),
            ),
            Some(Container::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|slot| self.snapshot_slot(slot, seen))
                    .collect(),
            ),
            Some(Container::Cell) | None => Value::Null,
        };
        seen.remove(&id);
        value
    }

    fn snapshot_slot(&self, slot: &Slot, seen: &mut HashSet<ContainerId>) -> Value {
        match slot {
            Slot::Raw(value) => value.clone(),
            Slot::Nested(token) => self.snapshot(token.id, seen),
        }
    }
}

/// Identity of one arena container. Dropping the last reference retires it.
pub(crate) struct ContainerToken {
    id: ContainerId,
    runtime: Weak<RuntimeInner>,
}

impl ContainerToken {
    pub(crate) fn id(&self) -> ContainerId {
        self.id
    }
}

impl Drop for ContainerToken {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.retire(self.id);
        }
    }
}

fn allocate(inner: &RuntimeInner, store: &mut Store, data: Container) -> Rc<ContainerToken> {
    let id = ContainerId::new();
    store.entries.insert(id, data);
    Rc::new(ContainerToken {
        id,
        runtime: inner.this.clone(),
    })
}

fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Result of a read through a wrapper.
#[derive(Clone, PartialEq)]
pub enum Prop {
    /// A primitive value.
    Value(Value),
    /// A structured value, wrapped.
    Reactive(Reactive),
}

impl Prop {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Prop::Value(value) => Some(value),
            Prop::Reactive(_) => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Prop::Reactive(reactive) => Some(reactive),
            Prop::Value(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    /// Untracked deep snapshot.
    pub fn to_value(&self) -> Value {
        match self {
            Prop::Value(value) => value.clone(),
            Prop::Reactive(reactive) => reactive.to_value(),
        }
    }

    /// Deep snapshot that tracks every property it visits.
    pub fn to_value_tracked(&self) -> Value {
        match self {
            Prop::Value(value) => value.clone(),
            Prop::Reactive(reactive) => reactive.to_value_tracked(),
        }
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Value(value) => write!(f, "Value({value})"),
            Prop::Reactive(reactive) => write!(f, "{reactive:?}"),
        }
    }
}

impl From<Value> for Prop {
    fn from(value: Value) -> Self {
        Prop::Value(value)
    }
}

impl From<Reactive> for Prop {
    fn from(reactive: Reactive) -> Self {
        Prop::Reactive(reactive)
    }
}

enum Write {
    Unchanged,
    Changed,
    Added,
}

/// Tracked accessor over a structured container.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trellis_core::{Effect, Runtime};
///
/// let runtime = Runtime::new();
/// let state = runtime.reactive(json!({ "count": 1 })).unwrap();
///
/// let observed = state.clone();
/// let effect = Effect::new(&runtime, move || {
///     let _ = observed.get("count");
/// });
///
/// state.set("count", 2).unwrap();
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Reactive {
    runtime: Runtime,
    token: Rc<ContainerToken>,
}

impl Reactive {
    /// Move a structured value into the arena and wrap it.
    pub fn new(runtime: &Runtime, value: Value) -> Result<Self, ReactiveError> {
        if !is_structured(&value) {
            return Err(ReactiveError::NotStructured(kind_name(&value)));
        }
        let token = {
            let mut store = runtime.inner.store.borrow_mut();
            allocate(&runtime.inner, &mut store, Container::from_structured(value))
        };
        Ok(Self {
            runtime: runtime.clone(),
            token,
        })
    }

    /// The container's id in the dependency graph.
    pub fn id(&self) -> ContainerId {
        self.token.id
    }

    /// The runtime this container lives in.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Whether this wraps an array. Not tracked.
    pub fn is_array(&self) -> bool {
        matches!(
            self.runtime.inner.store.borrow().get(self.id()),
            Ok(Container::Array(_))
        )
    }

    /// Read a property. Structured values come back wrapped.
    pub fn get(&self, key: impl Into<Key>) -> Option<Prop> {
        let key = key.into();
        self.runtime.inner.track(self.id(), key.clone());
        self.read(&key)
    }

    /// Read a property as an untracked deep snapshot. The read itself is
    /// tracked like [`get`](Self::get).
    pub fn get_value(&self, key: impl Into<Key>) -> Option<Value> {
        self.get(key).map(|prop| prop.to_value())
    }

    /// Whether a property exists.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.runtime.inner.track(self.id(), key.clone());
        let mut store = self.runtime.inner.store.borrow_mut();
        store
            .get_mut(self.id())
            .map(|container| container.slot_mut(&key).is_some())
            .unwrap_or(false)
    }

    /// The container's keys, in order.
    pub fn keys(&self) -> Vec<Key> {
        self.runtime.inner.track(self.id(), Key::Iterate);
        match self.runtime.inner.store.borrow().get(self.id()) {
            Ok(Container::Object(map)) => map.keys().cloned().map(Key::Field).collect(),
            Ok(Container::Array(items)) => (0..items.len()).map(Key::Index).collect(),
            _ => Vec::new(),
        }
    }

    /// Number of fields or items.
    pub fn len(&self) -> usize {
        self.runtime.inner.track(self.id(), Key::Iterate);
        self.len_untracked()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a property. Writing an equal primitive is a no-op.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), ReactiveError> {
        self.write(key.into(), Slot::Raw(value.into()))
    }

    /// Store another container by identity.
    pub fn set_reactive(&self, key: impl Into<Key>, value: &Reactive) -> Result<(), ReactiveError> {
        self.write(key.into(), Slot::Nested(Rc::clone(&value.token)))
    }

    /// Append to an array.
    pub fn push(&self, value: impl Into<Value>) -> Result<(), ReactiveError> {
        let len = self.len_untracked();
        self.write(Key::Index(len), Slot::Raw(value.into()))
    }

    /// Remove the last item of an array, returning its snapshot.
    pub fn pop(&self) -> Result<Option<Value>, ReactiveError> {
        let (removed, index) = {
            let mut store = self.runtime.inner.store.borrow_mut();
            match store.get_mut(self.id())? {
                Container::Array(items) => {
                    let index = items.len().checked_sub(1);
                    (items.pop(), index)
                }
                other => {
                    return Err(ReactiveError::KeyMismatch {
                        key: "pop".into(),
                        kind: other.kind(),
                    })
                }
            }
        };
        let (Some(slot), Some(index)) = (removed, index) else {
            return Ok(None);
        };
        let value = self.snapshot_slot(&slot);
        drop(slot);
        self.notify(Key::Index(index));
        self.notify(Key::Iterate);
        Ok(Some(value))
    }

    /// Remove a field from an object. Returns whether it existed.
    pub fn remove(&self, name: &str) -> Result<bool, ReactiveError> {
        let removed = {
            let mut store = self.runtime.inner.store.borrow_mut();
            match store.get_mut(self.id())? {
                Container::Object(map) => map.shift_remove(name),
                other => {
                    return Err(ReactiveError::KeyMismatch {
                        key: name.to_owned(),
                        kind: other.kind(),
                    })
                }
            }
        };
        if removed.is_none() {
            return Ok(false);
        }
        drop(removed);
        self.notify(Key::from(name));
        self.notify(Key::Iterate);
        Ok(true)
    }

    /// Untracked deep snapshot of the container.
    pub fn to_value(&self) -> Value {
        let store = self.runtime.inner.store.borrow();
        store.snapshot(self.id(), &mut HashSet::new())
    }

    /// Deep snapshot that tracks every key and nested container it visits.
    pub fn to_value_tracked(&self) -> Value {
        self.traverse(&mut HashSet::new())
    }

    fn traverse(&self, seen: &mut HashSet<ContainerId>) -> Value {
        if !seen.insert(self.id()) {
            return Value::Null;
        }
        let keys = self.keys();
        let mut visit = |key: Key| match self.get(key) {
            Some(Prop::Reactive(nested)) => nested.traverse(seen),
            Some(Prop::Value(value)) => value,
            None => Value::Null,
        };
        let value = if self.is_array() {
            Value::Array(keys.into_iter().map(&mut visit).collect())
        } else {
            let mut map = Map::new();
            for key in keys {
                let name = key.to_string();
                map.insert(name, visit(key));
            }
            Value::Object(map)
        };
        seen.remove(&self.id());
        value
    }

    fn len_untracked(&self) -> usize {
        match self.runtime.inner.store.borrow().get(self.id()) {
            Ok(Container::Object(map)) => map.len(),
            Ok(Container::Array(items)) => items.len(),
            _ => 0,
        }
    }

    fn snapshot_slot(&self, slot: &Slot) -> Value {
        let store = self.runtime.inner.store.borrow();
        store.snapshot_slot(slot, &mut HashSet::new())
    }

    fn read(&self, key: &Key) -> Option<Prop> {
        let inner = &self.runtime.inner;
        let mut store = inner.store.borrow_mut();

        let raw = {
            let slot = store.get_mut(self.id()).ok()?.slot_mut(key)?;
            match slot {
                Slot::Nested(token) => return Some(self.nested(Rc::clone(token))),
                Slot::Raw(value) if !is_structured(value) => {
                    return Some(Prop::Value(value.clone()))
                }
                Slot::Raw(value) => std::mem::take(value),
            }
        };

        // First read of a nested structure: give it its own container.
        let token = allocate(inner, &mut store, Container::from_structured(raw));
        if let Some(slot) = store
            .get_mut(self.id())
            .ok()
            .and_then(|container| container.slot_mut(key))
        {
            *slot = Slot::Nested(Rc::clone(&token));
        }
        Some(self.nested(token))
    }

    fn nested(&self, token: Rc<ContainerToken>) -> Prop {
        Prop::Reactive(Reactive {
            runtime: self.runtime.clone(),
            token,
        })
    }

    fn write(&self, key: Key, new: Slot) -> Result<(), ReactiveError> {
        let (outcome, old) = {
            let mut store = self.runtime.inner.store.borrow_mut();
            let container = store.get_mut(self.id())?;
            let kind = container.kind();
            match (container, &key) {
                (Container::Object(map), Key::Field(name)) => match map.get_mut(name) {
                    Some(slot) if slot.same_as(&new) => (Write::Unchanged, None),
                    Some(slot) => (Write::Changed, Some(std::mem::replace(slot, new))),
                    None => {
                        map.insert(name.clone(), new);
                        (Write::Added, None)
                    }
                },
                (Container::Array(items), Key::Index(index)) => {
                    let len = items.len();
                    match items.get_mut(*index) {
                        Some(slot) if slot.same_as(&new) => (Write::Unchanged, None),
                        Some(slot) => (Write::Changed, Some(std::mem::replace(slot, new))),
                        None if *index == len => {
                            items.push(new);
                            (Write::Added, None)
                        }
                        None => {
                            return Err(ReactiveError::IndexOutOfBounds { index: *index, len })
                        }
                    }
                }
                _ => {
                    return Err(ReactiveError::KeyMismatch {
                        key: key.to_string(),
                        kind,
                    })
                }
            }
        };
        drop(old);

        match outcome {
            Write::Unchanged => {}
            Write::Changed => self.notify(key),
            Write::Added => {
                self.notify(key);
                self.notify(Key::Iterate);
            }
        }
        Ok(())
    }

    fn notify(&self, key: Key) {
        self.runtime.inner.notify(&DepKey::new(self.id(), key));
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.token, &other.token)
    }
}

impl Eq for Reactive {}

impl Hash for Reactive {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("id", &self.id())
            .field("value", &self.to_value())
            .finish()
    }
}

impl Runtime {
    /// Wrap a structured value. Primitives are rejected.
    pub fn reactive(&self, value: impl Into<Value>) -> Result<Reactive, ReactiveError> {
        Reactive::new(self, value.into())
    }

    /// Wrap structured values and pass primitives through.
    ///
    /// A value that is already wrapped comes back as the same wrapper.
    pub fn to_reactive(&self, value: impl Into<Prop>) -> Prop {
        match value.into() {
            Prop::Value(value) if is_structured(&value) => match Reactive::new(self, value) {
                Ok(reactive) => Prop::Reactive(reactive),
                Err(_) => Prop::Value(Value::Null),
            },
            other => other,
        }
    }

    /// Allocate an identity-only container for a ref or computed.
    pub(crate) fn cell_container(&self) -> Rc<ContainerToken> {
        let mut store = self.inner.store.borrow_mut();
        allocate(&self.inner, &mut store, Container::Cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrapping_rejects_primitives() {
        let runtime = Runtime::new();
        let err = runtime.reactive(json!(5)).unwrap_err();
        assert!(matches!(err, ReactiveError::NotStructured("number")));
    }

    #[test]
    fn rewrapping_returns_the_same_wrapper() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "a": 1 })).unwrap();
        let again = runtime.to_reactive(state.clone());
        assert_eq!(again.as_reactive(), Some(&state));
    }

    #[test]
    fn nested_values_are_wrapped_on_first_read() {
        let runtime = Runtime::new();
        let state = runtime
            .reactive(json!({ "user": { "name": "ada" }, "tags": ["x"] }))
            .unwrap();
        assert_eq!(runtime.container_count(), 1);

        let user = state.get("user").unwrap();
        let user = user.as_reactive().unwrap().clone();
        assert_eq!(runtime.container_count(), 2);

        // Same identity on the next read.
        let again = state.get("user").unwrap();
        assert_eq!(again.as_reactive(), Some(&user));
        assert_eq!(runtime.container_count(), 2);

        assert_eq!(user.get("name").unwrap().as_str(), Some("ada"));
    }

    #[test]
    fn snapshot_sees_through_nested_containers() {
        let runtime = Runtime::new();
        let value = json!({ "user": { "name": "ada" }, "tags": ["x", "y"] });
        let state = runtime.reactive(value.clone()).unwrap();

        let _ = state.get("user");
        assert_eq!(state.to_value(), value);
    }

    #[test]
    fn array_operations() {
        let runtime = Runtime::new();
        let list = runtime.reactive(json!([1, 2])).unwrap();
        assert!(list.is_array());

        list.push(3).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(2usize).unwrap().as_i64(), Some(3));

        assert_eq!(list.pop().unwrap(), Some(json!(3)));
        assert_eq!(list.to_value(), json!([1, 2]));

        let err = list.set(5usize, 1).unwrap_err();
        assert!(matches!(err, ReactiveError::IndexOutOfBounds { index: 5, len: 2 }));
    }

    #[test]
    fn key_kind_must_match_container_kind() {
        let runtime = Runtime::new();
        let list = runtime.reactive(json!([])).unwrap();
        let err = list.set("name", 1).unwrap_err();
        assert!(matches!(err, ReactiveError::KeyMismatch { kind: "array", .. }));
        assert!(list.remove("name").is_err());
    }

    #[test]
    fn remove_reports_presence() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "a": 1 })).unwrap();
        assert!(state.remove("a").unwrap());
        assert!(!state.remove("a").unwrap());
        assert!(state.is_empty());
    }

    #[test]
    fn dropping_the_last_handle_retires_the_container() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "child": { "x": 1 } })).unwrap();
        let _ = state.get("child");
        assert_eq!(runtime.container_count(), 2);

        drop(state);
        assert_eq!(runtime.collect_garbage(), 2);
        assert_eq!(runtime.container_count(), 0);
    }

    #[test]
    fn nested_container_outlives_parent_while_referenced() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "child": { "x": 1 } })).unwrap();
        let child = state.get("child").unwrap().as_reactive().unwrap().clone();

        drop(state);
        runtime.collect_garbage();
        assert!(runtime.is_live(child.id()));
        assert_eq!(child.get("x").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn self_referencing_snapshot_terminates() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({})).unwrap();
        state.set_reactive("me", &state).unwrap();
        assert_eq!(state.to_value(), json!({ "me": null }));
        // Break the cycle so the container can be collected.
        state.remove("me").unwrap();
    }
}
