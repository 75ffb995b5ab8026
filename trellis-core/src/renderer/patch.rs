//! Patch State Machine
//!
//! `patch` turns an old vnode into a new one against the host, or mounts the
//! new one when there is no old.
//!
//! # How It Works
//!
//! 1. Nodes that are not the same (type or key differ) are replaced: the old
//!    one is unmounted and the new one mounted where it stood.
//! 2. Otherwise the node kind picks the handler. Leaves reuse their host
//!    node, elements diff props and children, fragments diff children only,
//!    and components hand new props to their instance.
//! 3. Children move between the none, text and list shapes through a
//!    transition table. List to list goes to the keyed diff.
//!
//! A patch that fails part way leaves every vnode it touched describing the
//! host nodes it owns, so the next patch can clean up.

use smallvec::SmallVec;
use tracing::trace;

use super::RendererInner;
use crate::error::{RenderError, Result};
use crate::host::{HostAdapter, NodeHandle};
use crate::vnode::{is_same_node, Children, NodeType, Props, VNode};

/// Host nodes a vnode occupies, in document order.
pub(crate) type HostNodes = SmallVec<[NodeHandle; 4]>;

#[derive(Clone, Copy)]
enum Dispatch {
    Text,
    Comment,
    Fragment,
    Element,
    Component,
}

fn dispatch(vnode: &VNode) -> Dispatch {
    match vnode.node_type {
        NodeType::Text => Dispatch::Text,
        NodeType::Comment => Dispatch::Comment,
        NodeType::Fragment => Dispatch::Fragment,
        NodeType::Element(_) => Dispatch::Element,
        NodeType::Component(_) => Dispatch::Component,
    }
}

impl<H: HostAdapter + 'static> RendererInner<H> {
    /// Patch `old` into `new`, or mount `new` when there is no `old`.
    pub(crate) fn patch(
        &self,
        old: Option<&mut VNode>,
        new: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> Result<()> {
        let mut anchor = anchor;
        let old = match old {
            Some(old) if !is_same_node(old, new) => {
                if let Some(last) = self.last_host(old) {
                    anchor = self.host.borrow().next_sibling(last);
                }
                trace!(old = ?old.node_type, new = ?new.node_type, "replacing node");
                self.unmount(old, true);
                None
            }
            old => old,
        };

        match dispatch(new) {
            Dispatch::Text => self.process_leaf(old, new, container, anchor, false),
            Dispatch::Comment => self.process_leaf(old, new, container, anchor, true),
            Dispatch::Fragment => match old {
                None => self.mount_children(new, container, anchor),
                Some(old) => self.patch_children(old, new, container, anchor),
            },
            Dispatch::Element => match old {
                None => self.mount_element(new, container, anchor),
                Some(old) => self.patch_element(old, new),
            },
            Dispatch::Component => match old {
                None => {
                    let NodeType::Component(def) = &new.node_type else {
                        return Ok(());
                    };
                    let def = def.clone();
                    self.mount_component(new, def, container, anchor)
                }
                Some(old) => self.patch_component(old, new, container),
            },
        }
    }

    fn process_leaf(
        &self,
        old: Option<&mut VNode>,
        new: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
        comment: bool,
    ) -> Result<()> {
        let content = new.text_content().unwrap_or_default();
        match old {
            None => {
                let el = {
                    let mut host = self.host.borrow_mut();
                    let el = if comment {
                        host.create_comment(content)
                    } else {
                        host.create_text(content)
                    };
                    host.insert(el, container, anchor);
                    el
                };
                new.el = Some(el);
            }
            Some(old) => {
                let kind = if comment { "comment" } else { "text" };
                let el = old.el.ok_or(RenderError::MissingHandle(kind))?;
                if !comment && old.text_content() != Some(content) {
                    self.host.borrow_mut().set_text(el, content);
                }
                new.el = Some(el);
            }
        }
        Ok(())
    }

    fn mount_element(
        &self,
        vnode: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> Result<()> {
        let NodeType::Element(tag) = &vnode.node_type else {
            return Ok(());
        };
        let el = self.host.borrow_mut().create_element(tag);
        vnode.el = Some(el);

        // A failed child still leaves the element attached, so the vnode
        // keeps describing what the host holds.
        let children = match &mut vnode.children {
            Children::Text(text) => {
                self.host.borrow_mut().set_element_text(el, text);
                Ok(())
            }
            Children::List(list) => list
                .iter_mut()
                .try_for_each(|child| self.patch(None, child, el, None)),
            Children::None => Ok(()),
        };

        {
            let mut host = self.host.borrow_mut();
            for (key, value) in &vnode.props {
                host.patch_property(el, key, None, Some(value));
            }
            host.insert(el, container, anchor);
        }
        trace!(%el, "mounted element");
        children
    }

    fn patch_element(&self, old: &mut VNode, new: &mut VNode) -> Result<()> {
        let el = old.el.ok_or(RenderError::MissingHandle("element"))?;
        new.el = Some(el);
        self.patch_children(old, new, el, None)?;
        self.patch_props(el, &old.props, &new.props);
        Ok(())
    }

    fn patch_props(&self, el: NodeHandle, old: &Props, new: &Props) {
        let mut host = self.host.borrow_mut();
        for (key, next) in new {
            let prev = old.get(key);
            if prev != Some(next) {
                host.patch_property(el, key, prev, Some(next));
            }
        }
        for (key, prev) in old {
            if !new.contains_key(key) {
                host.patch_property(el, key, Some(prev), None);
            }
        }
    }

    fn mount_children(
        &self,
        vnode: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> Result<()> {
        if let Some(list) = vnode.list_children_mut() {
            for child in list.iter_mut() {
                self.patch(None, child, container, anchor)?;
            }
        }
        Ok(())
    }

    /// Reconcile the children of `old` into `new`. For elements `container`
    /// is the element itself; for fragments it is the fragment's parent.
    fn patch_children(
        &self,
        old: &mut VNode,
        new: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> Result<()> {
        let old_children = std::mem::take(&mut old.children);
        match (old_children, &mut new.children) {
            (Children::List(mut list), Children::Text(text)) => {
                for child in list.iter_mut() {
                    self.unmount(child, true);
                }
                self.host.borrow_mut().set_element_text(container, text);
            }
            (Children::Text(prev), Children::Text(text)) => {
                if prev != *text {
                    self.host.borrow_mut().set_element_text(container, text);
                }
            }
            (Children::None, Children::Text(text)) => {
                self.host.borrow_mut().set_element_text(container, text);
            }
            (Children::List(list), Children::List(next)) => {
                self.patch_keyed_children(list, next, container, anchor)?;
            }
            (Children::Text(_), Children::List(next)) => {
                self.host.borrow_mut().set_element_text(container, "");
                for child in next.iter_mut() {
                    self.patch(None, child, container, anchor)?;
                }
            }
            (Children::None, Children::List(next)) => {
                for child in next.iter_mut() {
                    self.patch(None, child, container, anchor)?;
                }
            }
            (Children::List(mut list), Children::None) => {
                for child in list.iter_mut() {
                    self.unmount(child, true);
                }
            }
            (Children::Text(_), Children::None) => {
                self.host.borrow_mut().set_element_text(container, "");
            }
            (Children::None, Children::None) => {}
        }
        Ok(())
    }

    /// Release a mounted vnode. Only the topmost host nodes are removed when
    /// `remove` is set; descendants go with them, and nested components are
    /// stopped either way.
    pub(crate) fn unmount(&self, vnode: &mut VNode, remove: bool) {
        match dispatch(vnode) {
            Dispatch::Component => {
                if let Some(instance) = vnode.component.take() {
                    trace!(uid = instance.uid(), "unmounting component");
                    instance.stop();
                    let sub_tree = instance.sub_tree.borrow_mut().take();
                    if let Some(mut sub_tree) = sub_tree {
                        self.unmount(&mut sub_tree, remove);
                    }
                }
            }
            Dispatch::Fragment => {
                if let Some(list) = vnode.list_children_mut() {
                    for child in list.iter_mut() {
                        self.unmount(child, remove);
                    }
                }
            }
            Dispatch::Element => {
                if let Some(list) = vnode.list_children_mut() {
                    for child in list.iter_mut() {
                        self.unmount(child, false);
                    }
                }
                if let (true, Some(el)) = (remove, vnode.el.take()) {
                    self.host.borrow_mut().remove(el);
                }
            }
            Dispatch::Text | Dispatch::Comment => {
                if let (true, Some(el)) = (remove, vnode.el.take()) {
                    self.host.borrow_mut().remove(el);
                }
            }
        }
    }

    /// Move every host node of `vnode` before `anchor`.
    pub(crate) fn move_node(&self, vnode: &VNode, container: NodeHandle, anchor: Option<NodeHandle>) {
        let nodes = self.host_nodes(vnode);
        let mut host = self.host.borrow_mut();
        for node in nodes {
            host.insert(node, container, anchor);
        }
    }

    pub(crate) fn host_nodes(&self, vnode: &VNode) -> HostNodes {
        let mut nodes = HostNodes::new();
        self.collect_host_nodes(vnode, &mut nodes);
        nodes
    }

    fn collect_host_nodes(&self, vnode: &VNode, out: &mut HostNodes) {
        match dispatch(vnode) {
            Dispatch::Fragment => {
                if let Children::List(list) = &vnode.children {
                    for child in list {
                        self.collect_host_nodes(child, out);
                    }
                }
            }
            Dispatch::Component => {
                if let Some(instance) = &vnode.component {
                    if let Some(sub_tree) = instance.sub_tree.borrow().as_ref() {
                        self.collect_host_nodes(sub_tree, out);
                    }
                }
            }
            _ => out.extend(vnode.el),
        }
    }

    pub(crate) fn first_host(&self, vnode: &VNode) -> Option<NodeHandle> {
        self.host_nodes(vnode).first().copied()
    }

    pub(crate) fn last_host(&self, vnode: &VNode) -> Option<NodeHandle> {
        self.host_nodes(vnode).last().copied()
    }

    /// First host node of the first mounted vnode in `nodes`.
    pub(crate) fn first_host_in(&self, nodes: &[VNode]) -> Option<NodeHandle> {
        nodes.iter().find_map(|vnode| self.first_host(vnode))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::host::{MemoryHost, NodeHandle};
    use crate::reactive::Runtime;
    use crate::renderer::Renderer;
    use crate::vnode::VNode;

    fn setup() -> (Renderer<MemoryHost>, NodeHandle) {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        (Renderer::new(&Runtime::new(), host), root)
    }

    fn serialize(renderer: &Renderer<MemoryHost>, root: NodeHandle) -> String {
        renderer.with_host(|h| h.serialize(root))
    }

    #[test]
    fn different_type_replaces_the_node() {
        let (renderer, root) = setup();
        renderer.mount(VNode::element("div").children("a"), root).unwrap();
        renderer.with_host_mut(MemoryHost::reset_stats);

        renderer.mount(VNode::element("span").children("a"), root).unwrap();
        let stats = renderer.with_host(MemoryHost::stats);
        assert_eq!(serialize(&renderer, root), "<span>a</span>");
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.created, 1);
    }

    #[test]
    fn replacement_keeps_its_position() {
        let (renderer, root) = setup();
        let tree = |middle: VNode| {
            VNode::element("div")
                .child(VNode::element("i").children("a"))
                .child(middle)
                .child(VNode::element("i").children("c"))
        };
        renderer.mount(tree(VNode::element("i").children("b")), root).unwrap();
        renderer.mount(tree(VNode::element("b").children("b")), root).unwrap();
        assert_eq!(
            serialize(&renderer, root),
            "<div><i>a</i><b>b</b><i>c</i></div>"
        );
    }

    #[test]
    fn same_element_is_reused() {
        let (renderer, root) = setup();
        renderer
            .mount(VNode::element("p").prop("id", "x").children("one"), root)
            .unwrap();
        let before = renderer.with_root(root, VNode::el).flatten();
        renderer.with_host_mut(MemoryHost::reset_stats);

        renderer
            .mount(VNode::element("p").prop("id", "x").children("two"), root)
            .unwrap();
        let after = renderer.with_root(root, VNode::el).flatten();
        let stats = renderer.with_host(MemoryHost::stats);

        assert_eq!(before, after);
        assert_eq!(stats.created, 0);
        assert_eq!(stats.prop_patches, 0);
        assert_eq!(stats.text_updates, 1);
        assert_eq!(serialize(&renderer, root), r#"<p id="x">two</p>"#);
    }

    #[test]
    fn props_are_added_changed_and_removed() {
        let (renderer, root) = setup();
        renderer
            .mount(
                VNode::element("a")
                    .prop("href", "/one")
                    .prop("class", json!({ "active": true }))
                    .prop("title", "t"),
                root,
            )
            .unwrap();
        renderer.with_host_mut(MemoryHost::reset_stats);

        renderer
            .mount(
                VNode::element("a")
                    .prop("href", "/two")
                    .prop("class", json!({ "active": true })),
                root,
            )
            .unwrap();
        assert_eq!(renderer.with_host(MemoryHost::stats).prop_patches, 2);
        assert_eq!(
            serialize(&renderer, root),
            r#"<a class="active" href="/two"></a>"#
        );
    }

    #[test]
    fn children_transitions() {
        let (renderer, root) = setup();
        let render = |children: VNode| renderer.mount(children, root).unwrap();

        render(VNode::element("div").children("text"));
        assert_eq!(serialize(&renderer, root), "<div>text</div>");

        render(
            VNode::element("div")
                .child(VNode::element("b"))
                .child(VNode::text("x")),
        );
        assert_eq!(serialize(&renderer, root), "<div><b></b>x</div>");

        render(VNode::element("div"));
        assert_eq!(serialize(&renderer, root), "<div></div>");

        render(VNode::element("div").children("again"));
        assert_eq!(serialize(&renderer, root), "<div>again</div>");

        render(VNode::element("div").child(VNode::comment("c")));
        assert_eq!(serialize(&renderer, root), "<div><!--c--></div>");

        render(VNode::element("div"));
        assert_eq!(serialize(&renderer, root), "<div></div>");
    }

    #[test]
    fn fragment_children_land_before_the_next_sibling() {
        let (renderer, root) = setup();
        let tree = |inner: &[&str]| {
            VNode::element("ul")
                .child(VNode::element("li").children("x"))
                .child(VNode::fragment(
                    inner
                        .iter()
                        .map(|t| VNode::element("li").key(*t).children(*t))
                        .collect(),
                ))
                .child(VNode::element("li").children("y"))
        };
        renderer.mount(tree(&["a"]), root).unwrap();
        renderer.mount(tree(&["a", "b"]), root).unwrap();
        assert_eq!(
            serialize(&renderer, root),
            "<ul><li>x</li><li>a</li><li>b</li><li>y</li></ul>"
        );

        renderer.mount(tree(&["b"]), root).unwrap();
        assert_eq!(
            serialize(&renderer, root),
            "<ul><li>x</li><li>b</li><li>y</li></ul>"
        );
    }

    #[test]
    fn fragment_text_children_become_text_nodes() {
        let (renderer, root) = setup();
        renderer
            .mount(VNode::fragment(vec![]).children("loose"), root)
            .unwrap();
        assert_eq!(serialize(&renderer, root), "loose");
    }

    #[test]
    fn unmount_removes_only_the_top_node() {
        let (renderer, root) = setup();
        renderer
            .mount(
                VNode::element("div")
                    .child(VNode::element("span").children("a"))
                    .child(VNode::element("span").children("b")),
                root,
            )
            .unwrap();
        renderer.with_host_mut(MemoryHost::reset_stats);

        renderer.unmount(root).unwrap();
        assert_eq!(renderer.with_host(MemoryHost::stats).removed, 1);
        assert_eq!(renderer.with_host(MemoryHost::node_count), 1);
        assert!(renderer.with_root(root, |_| ()).is_none());
    }

    #[test]
    fn text_and_comment_leaves() {
        let (renderer, root) = setup();
        renderer.mount(VNode::text("hi"), root).unwrap();
        renderer.mount(VNode::text("bye"), root).unwrap();
        assert_eq!(serialize(&renderer, root), "bye");

        renderer.mount(VNode::comment("note"), root).unwrap();
        assert_eq!(serialize(&renderer, root), "<!--note-->");
    }
}
