//! Dependency Graph
//!
//! Bidirectional index between dependencies and subscribers:
//!
//! - forward: `(container, key)` → subscribers, in subscription order
//! - reverse: subscriber → every `(container, key)` it is subscribed to
//! - per container: the keys that currently have an entry
//!
//! The forward index drives `trigger`. The reverse index lets a subscriber
//! drop all of its edges before it re-runs or when it stops. The per-container
//! index lets a retired container drop all of its entries without a scan.

use std::collections::HashMap;

use indexmap::IndexSet;

use super::node::{ContainerId, DepKey, Key};
use crate::reactive::SubscriberId;

/// The dependency graph of one runtime.
#[derive(Debug, Default)]
pub struct DepGraph {
    subscribers: HashMap<DepKey, IndexSet<SubscriberId>>,
    subscriptions: HashMap<SubscriberId, IndexSet<DepKey>>,
    keys_by_container: HashMap<ContainerId, IndexSet<Key>>,
}

impl DepGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge: `subscriber` depends on `dep`.
    ///
    /// Returns `false` if the edge already existed.
    pub fn add_edge(&mut self, dep: DepKey, subscriber: SubscriberId) -> bool {
        let inserted = self
            .subscribers
            .entry(dep.clone())
            .or_default()
            .insert(subscriber);
        if inserted {
            self.keys_by_container
                .entry(dep.container)
                .or_default()
                .insert(dep.key.clone());
            self.subscriptions
                .entry(subscriber)
                .or_default()
                .insert(dep);
        }
        inserted
    }

    /// Remove a single edge. Empty entries are deleted.
    pub fn remove_edge(&mut self, dep: &DepKey, subscriber: SubscriberId) {
        self.unlink_forward(dep, subscriber);
        if let Some(deps) = self.subscriptions.get_mut(&subscriber) {
            deps.shift_remove(dep);
            if deps.is_empty() {
                self.subscriptions.remove(&subscriber);
            }
        }
    }

    /// Snapshot of the subscribers of `dep`, in subscription order.
    pub fn subscribers(&self, dep: &DepKey) -> Option<Vec<SubscriberId>> {
        self.subscribers
            .get(dep)
            .map(|subs| subs.iter().copied().collect())
    }

    /// Remove every edge of `subscriber`.
    ///
    /// Called before a computation re-runs and when it stops.
    pub fn clear_subscriber(&mut self, subscriber: SubscriberId) {
        let Some(deps) = self.subscriptions.remove(&subscriber) else {
            return;
        };
        for dep in &deps {
            self.unlink_forward(dep, subscriber);
        }
    }

    /// Remove every entry keyed by `container`.
    ///
    /// Called when the container's last handle is gone.
    pub fn retire_container(&mut self, container: ContainerId) {
        let Some(keys) = self.keys_by_container.remove(&container) else {
            return;
        };
        for key in keys {
            let dep = DepKey::new(container, key);
            let Some(subs) = self.subscribers.remove(&dep) else {
                continue;
            };
            for subscriber in subs {
                if let Some(deps) = self.subscriptions.get_mut(&subscriber) {
                    deps.shift_remove(&dep);
                    if deps.is_empty() {
                        self.subscriptions.remove(&subscriber);
                    }
                }
            }
        }
    }

    /// Number of `(container, key)` entries with at least one subscriber.
    pub fn entry_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of dependencies a subscriber currently has.
    pub fn dependency_count(&self, subscriber: SubscriberId) -> usize {
        self.subscriptions.get(&subscriber).map_or(0, IndexSet::len)
    }

    /// Number of subscribers on a dependency.
    pub fn subscriber_count(&self, dep: &DepKey) -> usize {
        self.subscribers.get(dep).map_or(0, IndexSet::len)
    }

    /// Whether any entry is keyed by `container`.
    pub fn tracks_container(&self, container: ContainerId) -> bool {
        self.keys_by_container.contains_key(&container)
    }

    fn unlink_forward(&mut self, dep: &DepKey, subscriber: SubscriberId) {
        let Some(subs) = self.subscribers.get_mut(dep) else {
            return;
        };
        subs.shift_remove(&subscriber);
        if !subs.is_empty() {
            return;
        }
        self.subscribers.remove(dep);
        if let Some(keys) = self.keys_by_container.get_mut(&dep.container) {
            keys.shift_remove(&dep.key);
            if keys.is_empty() {
                self.keys_by_container.remove(&dep.container);
            }
        }
    }
}
