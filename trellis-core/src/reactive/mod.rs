//! Reactive Primitives
//!
//! This module implements the reactive core: wrapped containers, refs,
//! computed values, effects and watchers, all scoped to an explicit
//! [`Runtime`].
//!
//! # Concepts
//!
//! ## Containers
//!
//! A [`Reactive`] wraps a JSON object or array. Reading a property inside a
//! running computation records the edge `(container, key) → computation`;
//! writing a different value notifies every computation on that edge.
//! Iteration (`keys`, `len`) is tracked under a dedicated key that fires when
//! properties are added or removed.
//!
//! ## Computed values
//!
//! A [`Computed`] caches a derived value and recomputes lazily. Computed
//! values are notified before any other subscriber, so effects never observe
//! a stale one.
//!
//! ## Effects
//!
//! An [`Effect`] re-runs when its dependencies change, either synchronously or
//! through a scheduler hook. Watchers and component renders are effects with
//! a hook that queues a job on the batch scheduler.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: the runtime keeps a stack of running
//! computations and attributes every tracked read to the top of the stack.
//! The stack belongs to the runtime, so independent runtimes never observe
//! each other.

mod computed;
mod context;
mod effect;
mod refs;
mod runtime;
mod store;
mod subscriber;
mod watch;

pub use computed::Computed;
pub use effect::{Effect, EffectOptions, EffectScheduler, WeakEffect};
pub use refs::Ref;
pub use runtime::Runtime;
pub use store::{Prop, Reactive};
pub use subscriber::{Subscriber, SubscriberId};
pub use watch::{watch, WatchHandle, WatchOptions, WatchSource};

pub(crate) use runtime::RuntimeInner;
