//! Graph Keys
//!
//! This module defines the identifiers that address entries in the
//! dependency graph: container ids and property keys.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a reactive container (object, array, ref or computed).
///
/// The dependency graph is indexed by this id rather than by a reference to
/// the container, so the graph never extends a container's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl ContainerId {
    /// Generate a new unique container ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A property key inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Named field of an object container.
    Field(String),

    /// Position inside an array container.
    Index(usize),

    /// The shape of the container: its key set or length.
    /// Read by enumeration, written by insertions and removals.
    Iterate,

    /// The single slot of a ref or computed value.
    Value,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(index) => write!(f, "[{index}]"),
            Key::Iterate => f.write_str("<iterate>"),
            Key::Value => f.write_str("<value>"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// A dependency: one key of one container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepKey {
    pub container: ContainerId,
    pub key: Key,
}

impl DepKey {
    pub fn new(container: ContainerId, key: Key) -> Self {
        Self { container, key }
    }
}

impl fmt::Display for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.container, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_ids_are_unique() {
        let id1 = ContainerId::new();
        let id2 = ContainerId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn keys_convert_from_names_and_indices() {
        assert_eq!(Key::from("count"), Key::Field("count".into()));
        assert_eq!(Key::from(3usize), Key::Index(3));
    }

    #[test]
    fn dep_keys_display_container_and_key() {
        let id = ContainerId::new();
        let dep = DepKey::new(id, Key::Index(2));
        assert_eq!(dep.to_string(), format!("#{}.[2]", id.raw()));
    }
}
