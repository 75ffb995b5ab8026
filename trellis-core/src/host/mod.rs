//! Host Adapters
//!
//! The renderer never touches a concrete UI tree. Every host operation goes
//! through [`HostAdapter`], which addresses host nodes by opaque
//! [`NodeHandle`]s. Host operations are synchronous and infallible at this
//! layer.
//!
//! [`MemoryHost`] is an in-memory implementation used by tests, benchmarks
//! and headless embedders.

mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use memory::{HostStats, MemoryHost};

use crate::vnode::PropValue;

/// Opaque handle to a host node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Operations the renderer needs from a host tree.
pub trait HostAdapter {
    /// Create a detached element.
    fn create_element(&mut self, tag: &str) -> NodeHandle;

    /// Create a detached text node.
    fn create_text(&mut self, text: &str) -> NodeHandle;

    /// Create a detached comment node.
    fn create_comment(&mut self, text: &str) -> NodeHandle;

    /// Replace an element's children with a single text node (or nothing
    /// for an empty string).
    fn set_element_text(&mut self, node: NodeHandle, text: &str);

    /// Update the content of a text node.
    fn set_text(&mut self, node: NodeHandle, text: &str);

    /// Insert `node` into `parent` before `anchor`, or at the end. Inserting
    /// a node that is already attached moves it.
    fn insert(&mut self, node: NodeHandle, parent: NodeHandle, anchor: Option<NodeHandle>);

    /// Detach `node` and release it.
    fn remove(&mut self, node: NodeHandle);

    /// Apply a prop change. `next == None` clears the prop.
    fn patch_property(
        &mut self,
        node: NodeHandle,
        key: &str,
        prev: Option<&PropValue>,
        next: Option<&PropValue>,
    );

    /// The node following `node` in its parent.
    fn next_sibling(&self, node: NodeHandle) -> Option<NodeHandle>;
}
