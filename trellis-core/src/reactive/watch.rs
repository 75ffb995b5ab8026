//! Watchers
//!
//! A watcher runs a callback with the new and old value of a source after
//! the source changes. The callback never runs inline with the mutation: the
//! watcher's effect queues a job on the batch scheduler, so several
//! mutations in one turn produce one callback.
//!
//! Reactive sources are always watched deeply. Ref and getter sources are
//! compared by value unless `deep` is set, in which case every nested
//! property is tracked and the callback fires on any change.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::effect::{Effect, EffectOptions};
use super::refs::Ref;
use super::runtime::Runtime;
use super::store::{Prop, Reactive};
use crate::error::ReactiveError;
use crate::scheduler::{Job, JobId};

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    Reactive(Reactive),
    Ref(Ref),
    Getter(Rc<dyn Fn() -> Prop>),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Prop + 'static,
    {
        WatchSource::Getter(Rc::new(f))
    }
}

impl From<Reactive> for WatchSource {
    fn from(reactive: Reactive) -> Self {
        WatchSource::Reactive(reactive)
    }
}

impl From<Ref> for WatchSource {
    fn from(reference: Ref) -> Self {
        WatchSource::Ref(reference)
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Reactive(reactive) => f.debug_tuple("Reactive").field(reactive).finish(),
            WatchSource::Ref(reference) => f.debug_tuple("Ref").field(reference).finish(),
            WatchSource::Getter(_) => f.write_str("Getter"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Run the callback once on creation, with `Null` as the old value.
    pub immediate: bool,
    /// Track nested properties and fire on any change.
    pub deep: bool,
}

struct WatchState {
    latest: RefCell<Value>,
    old: RefCell<Value>,
    callback: RefCell<Box<dyn FnMut(&Value, &Value)>>,
    deep: bool,
}

impl WatchState {
    fn run(&self, effect: &Effect, force: bool) {
        if !effect.is_active() {
            return;
        }
        effect.run();
        let new = self.latest.borrow().clone();
        let old = self.old.replace(new.clone());
        if force || self.deep || new != old {
            let mut callback = self.callback.borrow_mut();
            callback(&new, &old);
        }
    }
}

/// Handle to a running watcher. Dropping it stops the watcher.
pub struct WatchHandle {
    effect: Effect,
    job: JobId,
}

impl WatchHandle {
    pub fn stop(&self) -> Result<(), ReactiveError> {
        self.effect.stop()
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    /// The id of the job this watcher queues.
    pub fn job_id(&self) -> JobId {
        self.job
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("effect", &self.effect)
            .field("job", &self.job)
            .finish()
    }
}

fn snapshot(prop: Prop, deep: bool) -> Value {
    if deep {
        prop.to_value_tracked()
    } else {
        prop.to_value()
    }
}

/// Watch `source` and call `callback(new, old)` after it changes.
pub fn watch<F>(
    runtime: &Runtime,
    source: impl Into<WatchSource>,
    callback: F,
    options: WatchOptions,
) -> WatchHandle
where
    F: FnMut(&Value, &Value) + 'static,
{
    let source = source.into();
    let deep = options.deep || matches!(source, WatchSource::Reactive(_));
    let compute: Box<dyn Fn() -> Value> = match source {
        WatchSource::Reactive(reactive) => Box::new(move || reactive.to_value_tracked()),
        WatchSource::Ref(reference) => Box::new(move || snapshot(reference.get(), deep)),
        WatchSource::Getter(getter) => Box::new(move || snapshot(getter(), deep)),
    };

    let state = Rc::new(WatchState {
        latest: RefCell::new(Value::Null),
        old: RefCell::new(Value::Null),
        callback: RefCell::new(Box::new(callback)),
        deep,
    });
    let job = JobId::new();

    let body = {
        let state = Rc::clone(&state);
        move || {
            let value = compute();
            *state.latest.borrow_mut() = value;
        }
    };

    let scheduler = {
        let state = Rc::clone(&state);
        let runtime = Rc::downgrade(&runtime.inner);
        Rc::new(move |effect: &Effect| {
            let Some(runtime) = runtime.upgrade().map(Runtime::from_inner) else {
                return;
            };
            let effect = effect.downgrade();
            let state = Rc::clone(&state);
            runtime.enqueue(Job::new(job, move || {
                if let Some(effect) = effect.upgrade() {
                    state.run(&effect, false);
                }
                Ok(())
            }));
        })
    };

    let effect = Effect::with_options(
        runtime,
        body,
        EffectOptions {
            lazy: true,
            scheduler: Some(scheduler),
        },
    );

    if options.immediate {
        state.run(&effect, true);
    } else {
        effect.run();
        let initial = state.latest.borrow().clone();
        *state.old.borrow_mut() = initial;
    }

    WatchHandle { effect, job }
}

impl Runtime {
    /// See [`watch`].
    pub fn watch<F>(
        &self,
        source: impl Into<WatchSource>,
        callback: F,
        options: WatchOptions,
    ) -> WatchHandle
    where
        F: FnMut(&Value, &Value) + 'static,
    {
        watch(self, source, callback, options)
    }
}
