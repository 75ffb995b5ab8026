//! Effect Implementation
//!
//! An Effect is a computation that re-runs whenever a property it read
//! changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately (unless `lazy`) to
//!    establish its initial dependencies.
//!
//! 2. When any dependency changes, the effect is notified. Without a
//!    scheduler hook it re-runs synchronously; with one, the hook decides
//!    (typically by queueing a job on the batch scheduler).
//!
//! 3. Before re-running, the effect drops all of its edges and tracks fresh
//!    ones, so branches that are no longer taken stop triggering it.
//!
//! An effect without a scheduler that writes to a property it is reading
//! while it runs does not re-trigger itself. A scheduled effect hands the
//! notification to its hook, and the batch scheduler's deduplication bounds
//! the re-runs.
//!
//! # Lifetime
//!
//! The runtime registers effects weakly. An effect stays subscribed while a
//! handle to it exists and until it is stopped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{Runtime, RuntimeInner};
use super::subscriber::{Subscriber, SubscriberId};
use crate::error::ReactiveError;

/// Hook called instead of re-running when a dependency changes.
pub type EffectScheduler = Rc<dyn Fn(&Effect)>;

/// Options for [`Effect::with_options`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,
    /// Called on notification instead of running the effect.
    pub scheduler: Option<EffectScheduler>,
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

pub(crate) struct EffectInner {
    id: SubscriberId,
    runtime: Weak<RuntimeInner>,
    body: RefCell<Box<dyn FnMut()>>,
    scheduler: Option<EffectScheduler>,
    derived: bool,
    active: Cell<bool>,
    running: Cell<bool>,
    runs: Cell<u64>,
}

impl Subscriber for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn is_derived(&self) -> bool {
        self.derived
    }

    fn notify(self: Rc<Self>) {
        if !self.active.get() {
            return;
        }
        let effect = Effect { inner: self };
        match effect.inner.scheduler.clone() {
            // A scheduled effect triggered by its own run still queues; the
            // job lands in the next batch.
            Some(scheduler) => scheduler(&effect),
            None if effect.inner.running.get() => {
                trace!(id = ?effect.inner.id, "effect triggered itself, skipping");
            }
            None => effect.run(),
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.unregister(self.id);
        }
    }
}

/// A computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use serde_json::json;
/// use trellis_core::{Effect, Runtime};
///
/// let runtime = Runtime::new();
/// let state = runtime.reactive(json!({ "count": 0 })).unwrap();
/// let seen = Rc::new(Cell::new(0));
///
/// let effect = {
///     let state = state.clone();
///     let seen = Rc::clone(&seen);
///     Effect::new(&runtime, move || {
///         seen.set(state.get("count").and_then(|c| c.as_i64()).unwrap_or(0));
///     })
/// };
///
/// state.set("count", 5).unwrap();
/// assert_eq!(seen.get(), 5);
/// # drop(effect);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect and run it immediately.
    pub fn new<F>(runtime: &Runtime, body: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::with_options(runtime, body, EffectOptions::default())
    }

    /// Create an effect with options.
    pub fn with_options<F>(runtime: &Runtime, body: F, options: EffectOptions) -> Self
    where
        F: FnMut() + 'static,
    {
        let effect = Self::build(runtime, Box::new(body), options.scheduler, false);
        if !options.lazy {
            effect.run();
        }
        effect
    }

    /// A lazy derived effect: notified in the first pass of a trigger.
    pub(crate) fn derived(runtime: &Runtime, scheduler: EffectScheduler) -> Self {
        Self::build(runtime, Box::new(|| {}), Some(scheduler), true)
    }

    fn build(
        runtime: &Runtime,
        body: Box<dyn FnMut()>,
        scheduler: Option<EffectScheduler>,
        derived: bool,
    ) -> Self {
        let inner = Rc::new(EffectInner {
            id: SubscriberId::new(),
            runtime: Rc::downgrade(&runtime.inner),
            body: RefCell::new(body),
            scheduler,
            derived,
            active: Cell::new(true),
            running: Cell::new(false),
            runs: Cell::new(0),
        });
        let erased: Rc<dyn Subscriber> = inner.clone();
        runtime.inner.register(Rc::downgrade(&erased), inner.id);
        Self { inner }
    }

    /// Run the body now, re-collecting dependencies.
    ///
    /// Does nothing if the effect is stopped or already running.
    pub fn run(&self) {
        self.scope(|| {
            let mut body = self.inner.body.borrow_mut();
            body();
        });
    }

    /// Run `f` as this effect: old edges are dropped and reads inside `f`
    /// are attributed to the effect.
    pub(crate) fn scope<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let inner = &self.inner;
        if !inner.active.get() {
            return None;
        }
        if inner.running.get() {
            trace!(id = ?inner.id, "effect re-entered, skipping");
            return None;
        }
        let runtime = inner.runtime.upgrade()?;

        runtime.graph.borrow_mut().clear_subscriber(inner.id);
        inner.running.set(true);
        let result = {
            let _ctx = ReactiveContext::enter(&runtime.context, inner.id);
            f()
        };
        inner.running.set(false);
        inner.runs.set(inner.runs.get() + 1);
        Some(result)
    }

    /// Stop the effect: it drops its edges and never runs again.
    pub fn stop(&self) -> Result<(), ReactiveError> {
        if !self.inner.active.replace(false) {
            return Err(ReactiveError::AlreadyStopped(self.inner.id));
        }
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.unregister(self.inner.id);
        }
        trace!(id = ?self.inner.id, "effect stopped");
        Ok(())
    }

    /// Whether the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Whether the effect's body is on the stack right now.
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }

    /// Number of `(container, key)` entries the effect currently reads.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .runtime
            .upgrade()
            .map(|runtime| runtime.graph.borrow().dependency_count(self.inner.id))
            .unwrap_or(0)
    }

    /// The effect's subscriber id.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// A handle that does not keep the effect alive.
    pub fn downgrade(&self) -> WeakEffect {
        WeakEffect(Rc::downgrade(&self.inner))
    }
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("runs", &self.run_count())
            .finish()
    }
}

/// Weak handle to an [`Effect`].
#[derive(Clone)]
pub struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub fn upgrade(&self) -> Option<Effect> {
        self.0.upgrade().map(|inner| Effect { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn effect_runs_immediately() {
        let runtime = Runtime::new();
        let effect = Effect::new(&runtime, || {});
        assert_eq!(effect.run_count(), 1);
        assert!(effect.is_active());
    }

    #[test]
    fn lazy_effect_waits_for_run() {
        let runtime = Runtime::new();
        let effect = Effect::with_options(
            &runtime,
            || {},
            EffectOptions {
                lazy: true,
                ..Default::default()
            },
        );
        assert_eq!(effect.run_count(), 0);
        effect.run();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_a_dependency_changes() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "a": 1, "b": 1 })).unwrap();

        let observed = state.clone();
        let effect = Effect::new(&runtime, move || {
            let _ = observed.get("a");
        });

        state.set("b", 2).unwrap();
        assert_eq!(effect.run_count(), 1);

        state.set("a", 2).unwrap();
        assert_eq!(effect.run_count(), 2);

        // Same value: no trigger.
        state.set("a", 2).unwrap();
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn dependencies_follow_the_branch_taken() {
        let runtime = Runtime::new();
        let state = runtime
            .reactive(json!({ "flag": true, "a": 1, "b": 2 }))
            .unwrap();

        let observed = state.clone();
        let effect = Effect::new(&runtime, move || {
            let flag = observed.get("flag").and_then(|p| p.as_bool()).unwrap_or(false);
            let _ = observed.get(if flag { "a" } else { "b" });
        });
        assert_eq!(effect.dependency_count(), 2);

        state.set("flag", false).unwrap();
        assert_eq!(effect.run_count(), 2);

        state.set("a", 10).unwrap();
        assert_eq!(effect.run_count(), 2);

        state.set("b", 20).unwrap();
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn self_mutation_does_not_retrigger() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "n": 0 })).unwrap();

        let observed = state.clone();
        let effect = Effect::new(&runtime, move || {
            let n = observed.get("n").and_then(|p| p.as_i64()).unwrap_or(0);
            observed.set("n", n + 1).unwrap();
        });

        assert_eq!(effect.run_count(), 1);
        assert_eq!(state.get("n").and_then(|p| p.as_i64()), Some(1));
    }

    #[test]
    fn scheduled_self_mutation_reaches_the_hook() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "n": 0 })).unwrap();
        let hooked = Rc::new(Cell::new(0));

        let observed = state.clone();
        let counter = Rc::clone(&hooked);
        let effect = Effect::with_options(
            &runtime,
            move || {
                let n = observed.get("n").and_then(|p| p.as_i64()).unwrap_or(0);
                if n == 0 {
                    observed.set("n", 1).unwrap();
                }
            },
            EffectOptions {
                lazy: false,
                scheduler: Some(Rc::new(move |_: &Effect| counter.set(counter.get() + 1))),
            },
        );

        assert_eq!(effect.run_count(), 1);
        assert_eq!(hooked.get(), 1);
    }

    #[test]
    fn scheduler_hook_replaces_the_rerun() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "a": 1 })).unwrap();
        let hooked = Rc::new(Cell::new(0));

        let observed = state.clone();
        let counter = Rc::clone(&hooked);
        let effect = Effect::with_options(
            &runtime,
            move || {
                let _ = observed.get("a");
            },
            EffectOptions {
                lazy: false,
                scheduler: Some(Rc::new(move |_: &Effect| counter.set(counter.get() + 1))),
            },
        );

        state.set("a", 2).unwrap();
        assert_eq!(hooked.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn stopped_effect_never_runs_again() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "a": 1 })).unwrap();

        let observed = state.clone();
        let effect = Effect::new(&runtime, move || {
            let _ = observed.get("a");
        });

        effect.stop().unwrap();
        assert!(!effect.is_active());
        assert_eq!(effect.dependency_count(), 0);

        state.set("a", 2).unwrap();
        effect.run();
        assert_eq!(effect.run_count(), 1);

        let err = effect.stop().unwrap_err();
        assert!(matches!(err, ReactiveError::AlreadyStopped(_)));
    }

    #[test]
    fn dropping_the_effect_unsubscribes_it() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "a": 1 })).unwrap();

        let observed = state.clone();
        let effect = Effect::new(&runtime, move || {
            let _ = observed.get("a");
        });
        assert_eq!(runtime.dependency_entry_count(), 1);

        drop(effect);
        assert_eq!(runtime.dependency_entry_count(), 0);
        assert_eq!(runtime.subscriber_count(), 0);
    }

    #[test]
    fn nested_effects_track_separately() {
        let runtime = Runtime::new();
        let state = runtime.reactive(json!({ "outer": 0, "inner": 0 })).unwrap();
        let inner_slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

        let outer = {
            let state = state.clone();
            let runtime = runtime.clone();
            let inner_slot = Rc::clone(&inner_slot);
            Effect::new(&runtime.clone(), move || {
                let _ = state.get("outer");
                let observed = state.clone();
                let inner = Effect::new(&runtime, move || {
                    let _ = observed.get("inner");
                });
                *inner_slot.borrow_mut() = Some(inner);
            })
        };

        let first_inner = inner_slot.borrow().clone().unwrap();
        state.set("inner", 1).unwrap();
        assert_eq!(outer.run_count(), 1);
        assert_eq!(first_inner.run_count(), 2);
    }
}
