//! Dependency Graph
//!
//! This module implements the graph that records which computations read
//! which pieces of reactive state.
//!
//! # Overview
//!
//! - An entry is keyed by `(ContainerId, Key)`: one property of one observed
//!   container, or the single slot of a ref/computed.
//! - Each entry holds the ordered set of subscribers that read it during
//!   their latest run.
//!
//! # Design Decisions
//!
//! 1. Entries are keyed by container *id*, never by reference. A container
//!    whose last handle is dropped is retired, and its entries are removed
//!    during garbage collection. The graph never keeps a container alive.
//!
//! 2. The graph keeps a reverse index (subscriber → deps) so a computation
//!    can drop its edges in one call before it re-runs.
//!
//! 3. Subscriber sets are `IndexSet`s, so notification order is the order of
//!    subscription and is deterministic.

mod deps;
mod node;

pub use deps::DepGraph;
pub use node::{ContainerId, DepKey, Key};
