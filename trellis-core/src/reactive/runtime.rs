//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects reactive containers,
//! computed values and effects. It owns the container arena, the dependency
//! graph and the scheduler.
//!
//! # How It Works
//!
//! 1. When a container is wrapped, its data moves into the runtime's arena
//!    and it gets a `ContainerId`.
//!
//! 2. When a computation reads a container property, the runtime records the
//!    edge `(container, key) → subscriber`.
//!
//! 3. When a property changes, the runtime:
//!    a. Snapshots the subscribers of `(container, key)`
//!    b. Notifies derived values first (they mark themselves stale and
//!       forward the notification to their own readers)
//!    c. Notifies every other subscriber: it runs immediately, or its
//!       scheduler hook queues it on the batch scheduler
//!
//! # Ownership
//!
//! The runtime is a cheap `Rc` handle. Everything created from a runtime
//! holds a clone of it, and tracking goes through the runtime's own context
//! stack; nothing is process-global. Subscribers are registered weakly, and
//! containers are referenced by id, so the runtime never keeps a computation
//! or a container alive on its own.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::context::{ContextStack, ReactiveContext};
use super::store::Store;
use super::subscriber::{Subscriber, SubscriberId};
use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::{ContainerId, DepGraph, DepKey, Key};
use crate::scheduler::{FlushReport, Job, Scheduler};

pub(crate) struct RuntimeInner {
    pub(crate) this: Weak<RuntimeInner>,
    config: RuntimeConfig,
    pub(crate) store: RefCell<Store>,
    pub(crate) graph: RefCell<DepGraph>,
    registry: RefCell<HashMap<SubscriberId, Weak<dyn Subscriber>>>,
    pub(crate) context: ContextStack,
    retired: RefCell<Vec<ContainerId>>,
    scheduler: Scheduler,
}

/// Handle to a reactive runtime.
///
/// Cloning a `Runtime` creates another handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let scheduler = Scheduler::new(config.flush_mode);
        let inner = Rc::new_cyclic(|this| RuntimeInner {
            this: this.clone(),
            config: config.clone(),
            store: RefCell::new(Store::default()),
            graph: RefCell::new(DepGraph::new()),
            registry: RefCell::new(HashMap::new()),
            context: ContextStack::default(),
            retired: RefCell::new(Vec::new()),
            scheduler,
        });

        if config.collect_garbage_on_flush {
            let weak = Rc::downgrade(&inner);
            inner.scheduler.set_after_flush(Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.collect_garbage();
                }
            }));
        }

        Self { inner }
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The batch scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Record that the active computation (if any) reads `(container, key)`.
    pub fn track(&self, container: ContainerId, key: Key) {
        self.inner.track(container, key);
    }

    /// Notify every subscriber of `(container, key)`.
    ///
    /// Fails if `container` is not a live container of this runtime.
    pub fn trigger(&self, container: ContainerId, key: Key) -> Result<(), ReactiveError> {
        if !self.inner.store.borrow().contains(container) {
            return Err(ReactiveError::UnknownContainer(container));
        }
        self.inner.notify(&DepKey::new(container, key));
        Ok(())
    }

    /// Run `f` without attributing its reads to the active computation.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _ctx = ReactiveContext::pause(&self.inner.context);
        f()
    }

    /// Whether a computation is currently being tracked.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_active()
    }

    /// Queue a job on the scheduler.
    pub fn enqueue(&self, job: Job) -> bool {
        self.inner.scheduler.enqueue(job)
    }

    /// Run all pending jobs.
    pub fn flush(&self) -> FlushReport {
        self.inner.scheduler.flush()
    }

    /// Run pending jobs until none are left, including jobs queued by the
    /// jobs that ran.
    pub fn flush_all(&self) -> FlushReport {
        self.inner.scheduler.flush_all()
    }

    /// Yield once to the executor so a flush spawned in
    /// [`FlushMode::LocalTask`](crate::FlushMode::LocalTask) mode can run.
    pub async fn tick(&self) {
        tokio::task::yield_now().await;
    }

    /// Drop retired containers and their dependency entries.
    ///
    /// Returns the number of containers collected.
    pub fn collect_garbage(&self) -> usize {
        self.inner.collect_garbage()
    }

    /// Number of live containers in the arena.
    pub fn container_count(&self) -> usize {
        self.inner.store.borrow().len()
    }

    /// Whether `container` is live.
    pub fn is_live(&self, container: ContainerId) -> bool {
        self.inner.store.borrow().contains(container)
    }

    /// Number of dependency entries with at least one subscriber.
    pub fn dependency_entry_count(&self) -> usize {
        self.inner.graph.borrow().entry_count()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Runtime {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("containers", &self.container_count())
            .field("dependency_entries", &self.dependency_entry_count())
            .field("subscribers", &self.subscriber_count())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl RuntimeInner {
    pub(crate) fn handle(&self) -> Option<Runtime> {
        self.this.upgrade().map(Runtime::from_inner)
    }

    /// Register a subscriber so `trigger` can resolve its id.
    pub(crate) fn register(&self, subscriber: Weak<dyn Subscriber>, id: SubscriberId) {
        self.registry.borrow_mut().insert(id, subscriber);
    }

    /// Remove a subscriber and all of its edges.
    ///
    /// Uses `try_borrow_mut` because this also runs from `Drop`; a subscriber
    /// that cannot be removed right now is pruned by the next `notify` that
    /// finds its weak reference dead.
    pub(crate) fn unregister(&self, id: SubscriberId) {
        if let Ok(mut registry) = self.registry.try_borrow_mut() {
            registry.remove(&id);
        }
        if let Ok(mut graph) = self.graph.try_borrow_mut() {
            graph.clear_subscriber(id);
        }
    }

    pub(crate) fn track(&self, container: ContainerId, key: Key) {
        let Some(subscriber) = self.context.current() else {
            return;
        };
        let dep = DepKey::new(container, key);
        trace!(%dep, ?subscriber, "track");
        self.graph.borrow_mut().add_edge(dep, subscriber);
    }

    /// Notify the subscribers of `dep` in two passes: derived values first.
    pub(crate) fn notify(&self, dep: &DepKey) {
        let Some(ids) = self.graph.borrow().subscribers(dep) else {
            return;
        };
        trace!(%dep, subscribers = ids.len(), "trigger");

        let mut derived = Vec::new();
        let mut others = Vec::new();
        let mut dead = Vec::new();
        {
            let registry = self.registry.borrow();
            for id in ids {
                match registry.get(&id).and_then(Weak::upgrade) {
                    Some(sub) if sub.is_derived() => derived.push(sub),
                    Some(sub) => others.push(sub),
                    None => dead.push(id),
                }
            }
        }

        if !dead.is_empty() {
            let mut registry = self.registry.borrow_mut();
            let mut graph = self.graph.borrow_mut();
            for id in dead {
                registry.remove(&id);
                graph.clear_subscriber(id);
            }
        }

        for sub in derived {
            sub.notify();
        }
        for sub in others {
            sub.notify();
        }
    }

    pub(crate) fn retire(&self, container: ContainerId) {
        self.retired.borrow_mut().push(container);
    }

    pub(crate) fn collect_garbage(&self) -> usize {
        let mut collected = 0;
        loop {
            let Some(container) = self.retired.borrow_mut().pop() else {
                break;
            };
            // Dropping the entry may retire nested containers; that only
            // touches `retired`, which is not borrowed here.
            let entry = self.store.borrow_mut().remove(container);
            self.graph.borrow_mut().retire_container(container);
            if entry.is_some() {
                collected += 1;
            }
            drop(entry);
        }
        if collected > 0 {
            debug!(collected, "collected retired containers");
        }
        collected
    }
}
