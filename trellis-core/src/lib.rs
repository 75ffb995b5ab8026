//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (wrapped containers, refs, computed values, effects,
//!   watchers)
//! - A deduplicating batch scheduler
//! - Virtual nodes and a keyed-diff renderer over an abstract host
//! - Stateful components whose renders re-run through the scheduler
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives and dependency tracking, scoped to a
//!   [`Runtime`]
//! - `graph`: The `(container, key) → subscribers` dependency graph
//! - `scheduler`: Job queue and flush state machine
//! - `vnode`: Virtual node model and prop normalization
//! - `host`: The [`host::HostAdapter`] trait and an in-memory host
//! - `renderer`: Patch algorithm, keyed child diff and components
//!
//! Everything is single-threaded. Handles are `Rc`-based and a runtime is
//! never shared across threads.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use serde_json::json;
//! use trellis_core::{Computed, Effect, Runtime};
//!
//! let runtime = Runtime::new();
//! let state = runtime.reactive(json!({ "count": 1 })).unwrap();
//!
//! // A derived value
//! let doubled = {
//!     let state = state.clone();
//!     Computed::new(&runtime, move || {
//!         state.get_value("count").and_then(|v| v.as_i64()).unwrap_or(0) * 2
//!     })
//! };
//!
//! // An effect reading it
//! let seen = Rc::new(Cell::new(0));
//! let _effect = {
//!     let (doubled, seen) = (doubled.clone(), Rc::clone(&seen));
//!     Effect::new(&runtime, move || seen.set(doubled.get()))
//! };
//! assert_eq!(seen.get(), 2);
//!
//! state.set("count", 5).unwrap();
//! assert_eq!(seen.get(), 10);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod host;
pub mod reactive;
pub mod renderer;
pub mod scheduler;
pub mod vnode;

pub use config::{FlushMode, RuntimeConfig};
pub use error::{Error, ReactiveError, RenderError, Result};
pub use reactive::{
    watch, Computed, Effect, EffectOptions, Prop, Reactive, Ref, Runtime, WatchHandle,
    WatchOptions, WatchSource,
};
pub use scheduler::{FlushReport, FlushState, Job, JobId, Scheduler};
