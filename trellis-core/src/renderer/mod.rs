//! Renderer
//!
//! The renderer reconciles virtual trees into a host tree. It remembers the
//! tree last rendered into each container; rendering again patches the old
//! tree into the new one with as few host operations as it can find.
//!
//! # Patch Algorithm
//!
//! Nodes are patched pairwise. A pair with a different type or key is
//! replaced: the old node is unmounted and the new one mounted where the old
//! one was. Otherwise the host node is reused and only the difference is
//! applied: text content, children, then props.
//!
//! Child lists go through a keyed diff (see `keyed.rs`): common prefix and
//! suffix are patched in place, and the remaining middle is matched by key.
//! The nodes that sit on a longest increasing subsequence of old positions
//! stay put and everything else is moved, so a reorder costs
//! `matched - lis_len` host moves.

mod component;
mod keyed;
mod lis;
mod patch;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

pub use component::{
    render_fn, ComponentContext, ComponentDef, ComponentInstance, HookFn, RenderFn, SetupContext,
    SetupFn,
};
pub use lis::longest_increasing_subsequence;

use crate::error::Result;
use crate::host::{HostAdapter, NodeHandle};
use crate::reactive::Runtime;
use crate::vnode::VNode;

pub(crate) struct RendererInner<H: HostAdapter + 'static> {
    this: Weak<RendererInner<H>>,
    runtime: Runtime,
    host: RefCell<H>,
    roots: RefCell<HashMap<NodeHandle, VNode>>,
}

/// Renders virtual trees into a host.
///
/// # Example
///
/// ```rust
/// use trellis_core::host::MemoryHost;
/// use trellis_core::renderer::Renderer;
/// use trellis_core::vnode::VNode;
/// use trellis_core::Runtime;
///
/// let runtime = Runtime::new();
/// let mut host = MemoryHost::new();
/// let root = host.create_root();
/// let renderer = Renderer::new(&runtime, host);
///
/// renderer
///     .mount(VNode::element("p").children("hello"), root)
///     .unwrap();
/// assert_eq!(renderer.with_host(|h| h.serialize(root)), "<p>hello</p>");
/// ```
pub struct Renderer<H: HostAdapter + 'static> {
    inner: Rc<RendererInner<H>>,
}

impl<H: HostAdapter + 'static> Renderer<H> {
    pub fn new(runtime: &Runtime, host: H) -> Self {
        Self {
            inner: Rc::new_cyclic(|this| RendererInner {
                this: this.clone(),
                runtime: runtime.clone(),
                host: RefCell::new(host),
                roots: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Render `vnode` into `container`, patching whatever was rendered there
    /// before. `None` unmounts the previous tree.
    pub fn render(&self, vnode: Option<VNode>, container: NodeHandle) -> Result<()> {
        let previous = self.inner.roots.borrow_mut().remove(&container);
        match (previous, vnode) {
            (Some(mut previous), None) => {
                debug!(%container, "unmounting root");
                self.inner.unmount(&mut previous, true);
            }
            (None, None) => {}
            (mut previous, Some(mut vnode)) => {
                let result = self
                    .inner
                    .patch(previous.as_mut(), &mut vnode, container, None);
                // Keep the tree even when the patch failed part way: it owns
                // whatever host nodes were created or reused.
                self.inner.roots.borrow_mut().insert(container, vnode);
                return result;
            }
        }
        Ok(())
    }

    pub fn mount(&self, vnode: VNode, container: NodeHandle) -> Result<()> {
        self.render(Some(vnode), container)
    }

    pub fn unmount(&self, container: NodeHandle) -> Result<()> {
        self.render(None, container)
    }

    /// Inspect the tree currently rendered into `container`.
    pub fn with_root<R>(&self, container: NodeHandle, f: impl FnOnce(&VNode) -> R) -> Option<R> {
        self.inner.roots.borrow().get(&container).map(f)
    }

    /// Access the host. Do not re-enter the renderer from `f`.
    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.inner.host.borrow())
    }

    /// Mutable access to the host. Do not re-enter the renderer from `f`.
    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.host.borrow_mut())
    }
}

impl<H: HostAdapter + 'static> fmt::Debug for Renderer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("roots", &self.inner.roots.borrow().len())
            .field("runtime", &self.inner.runtime)
            .finish()
    }
}
