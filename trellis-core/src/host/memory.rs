//! In-memory host tree.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use super::{HostAdapter, NodeHandle};
use crate::vnode::{event_name, is_listener, Handler, PropValue};

/// Counts of host operations, for asserting how much work a patch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostStats {
    /// Nodes created (elements, text and comments).
    pub created: usize,
    /// Inserts of detached nodes.
    pub inserted: usize,
    /// Inserts of nodes that were already attached.
    pub moved: usize,
    /// Removals.
    pub removed: usize,
    /// `patch_property` calls.
    pub prop_patches: usize,
    /// Text writes (`set_text` and `set_element_text`).
    pub text_updates: usize,
}

#[derive(Debug, Default)]
struct Element {
    tag: String,
    class: Option<String>,
    style: BTreeMap<String, String>,
    attrs: BTreeMap<String, Value>,
    listeners: HashMap<String, Handler>,
}

#[derive(Debug)]
enum Kind {
    Root,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct Node {
    kind: Kind,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

/// A host tree held in memory.
///
/// # Example
///
/// ```rust
/// use trellis_core::host::{HostAdapter, MemoryHost};
///
/// let mut host = MemoryHost::new();
/// let root = host.create_root();
/// let div = host.create_element("div");
/// host.set_element_text(div, "hello");
/// host.insert(div, root, None);
/// assert_eq!(host.serialize(root), "<div>hello</div>");
/// ```
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: HashMap<NodeHandle, Node>,
    next: u64,
    stats: HostStats,
}

fn style_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container to render into. Not counted in the stats.
    pub fn create_root(&mut self) -> NodeHandle {
        self.alloc(Kind::Root)
    }

    fn alloc(&mut self, kind: Kind) -> NodeHandle {
        self.next += 1;
        let handle = NodeHandle(self.next);
        self.nodes.insert(
            handle,
            Node {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        handle
    }

    fn create(&mut self, kind: Kind) -> NodeHandle {
        self.stats.created += 1;
        self.alloc(kind)
    }

    fn element_mut(&mut self, node: NodeHandle) -> Option<&mut Element> {
        match self.nodes.get_mut(&node).map(|n| &mut n.kind) {
            Some(Kind::Element(element)) => Some(element),
            _ => None,
        }
    }

    fn element(&self, node: NodeHandle) -> Option<&Element> {
        match self.nodes.get(&node).map(|n| &n.kind) {
            Some(Kind::Element(element)) => Some(element),
            _ => None,
        }
    }

    fn detach(&mut self, node: NodeHandle) -> bool {
        let Some(parent) = self.nodes.get_mut(&node).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|child| *child != node);
        }
        true
    }

    fn free(&mut self, node: NodeHandle) {
        if let Some(removed) = self.nodes.remove(&node) {
            for child in removed.children {
                self.free(child);
            }
        }
    }

    /// Operation counts since creation or the last [`reset_stats`](Self::reset_stats).
    pub fn stats(&self) -> HostStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = HostStats::default();
    }

    /// Number of live nodes, roots included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_live(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeHandle) -> &[NodeHandle] {
        self.nodes
            .get(&node)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    pub fn tag(&self, node: NodeHandle) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    /// Content of a text or comment node.
    pub fn text(&self, node: NodeHandle) -> Option<&str> {
        match self.nodes.get(&node).map(|n| &n.kind) {
            Some(Kind::Text(text) | Kind::Comment(text)) => Some(text),
            _ => None,
        }
    }

    pub fn attribute(&self, node: NodeHandle, name: &str) -> Option<&Value> {
        self.element(node).and_then(|e| e.attrs.get(name))
    }

    pub fn class(&self, node: NodeHandle) -> Option<&str> {
        self.element(node).and_then(|e| e.class.as_deref())
    }

    pub fn style(&self, node: NodeHandle, name: &str) -> Option<&str> {
        self.element(node)
            .and_then(|e| e.style.get(name))
            .map(String::as_str)
    }

    /// The handler registered for `event` (`"click"`), if any.
    pub fn listener(&self, node: NodeHandle, event: &str) -> Option<Handler> {
        self.element(node)
            .and_then(|e| e.listeners.get(event))
            .cloned()
    }

    /// Invoke the handler for `event`. Returns whether one was registered.
    pub fn dispatch(&self, node: NodeHandle, event: &str) -> bool {
        match self.listener(node, event) {
            Some(handler) => {
                handler.call();
                true
            }
            None => false,
        }
    }

    /// Depth-first search below `root` for the first element with `tag`.
    pub fn find(&self, root: NodeHandle, tag: &str) -> Option<NodeHandle> {
        for child in self.children(root) {
            if self.tag(*child) == Some(tag) {
                return Some(*child);
            }
            if let Some(found) = self.find(*child, tag) {
                return Some(found);
            }
        }
        None
    }

    /// Serialize `node` to markup. Attributes are sorted by name. A root
    /// serializes as its children.
    pub fn serialize(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    fn write_children(&self, node: NodeHandle, out: &mut String) {
        for child in self.children(node) {
            self.write_node(*child, out);
        }
    }

    fn write_node(&self, node: NodeHandle, out: &mut String) {
        let Some(entry) = self.nodes.get(&node) else {
            return;
        };
        match &entry.kind {
            Kind::Root => self.write_children(node, out),
            Kind::Text(text) => out.push_str(text),
            Kind::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
            Kind::Element(element) => {
                let mut attrs: BTreeMap<&str, String> = BTreeMap::new();
                if let Some(class) = &element.class {
                    attrs.insert("class", class.clone());
                }
                if !element.style.is_empty() {
                    let css = element
                        .style
                        .iter()
                        .map(|(name, value)| format!("{name}: {value}"))
                        .collect::<Vec<_>>()
                        .join("; ");
                    attrs.insert("style", css);
                }
                for (name, value) in &element.attrs {
                    let rendered = match value {
                        Value::Bool(true) => String::new(),
                        other => style_value(other),
                    };
                    attrs.insert(name.as_str(), rendered);
                }

                let _ = write!(out, "<{}", element.tag);
                for (name, value) in attrs {
                    if value.is_empty() && element.attrs.get(name) == Some(&Value::Bool(true)) {
                        let _ = write!(out, " {name}");
                    } else {
                        let _ = write!(out, " {name}=\"{value}\"");
                    }
                }
                out.push('>');
                self.write_children(node, out);
                let _ = write!(out, "</{}>", element.tag);
            }
        }
    }

    fn patch_style(&mut self, node: NodeHandle, prev: Option<&PropValue>, next: Option<&PropValue>) {
        let Some(element) = self.element_mut(node) else {
            return;
        };
        let next = match next.and_then(PropValue::as_json) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        };
        let Some(next) = next else {
            element.style.clear();
            return;
        };
        for (name, value) in next {
            if value.is_null() {
                element.style.remove(name);
            } else {
                element.style.insert(name.clone(), style_value(value));
            }
        }
        if let Some(Value::Object(prev)) = prev.and_then(PropValue::as_json) {
            for name in prev.keys() {
                if !next.contains_key(name) {
                    element.style.remove(name);
                }
            }
        }
    }
}

impl HostAdapter for MemoryHost {
    fn create_element(&mut self, tag: &str) -> NodeHandle {
        self.create(Kind::Element(Element {
            tag: tag.to_owned(),
            ..Element::default()
        }))
    }

    fn create_text(&mut self, text: &str) -> NodeHandle {
        self.create(Kind::Text(text.to_owned()))
    }

    fn create_comment(&mut self, text: &str) -> NodeHandle {
        self.create(Kind::Comment(text.to_owned()))
    }

    fn set_element_text(&mut self, node: NodeHandle, text: &str) {
        self.stats.text_updates += 1;
        let children = match self.nodes.get_mut(&node) {
            Some(entry) => std::mem::take(&mut entry.children),
            None => return,
        };
        for child in children {
            self.free(child);
        }
        if !text.is_empty() {
            let text = self.alloc(Kind::Text(text.to_owned()));
            if let Some(entry) = self.nodes.get_mut(&text) {
                entry.parent = Some(node);
            }
            if let Some(entry) = self.nodes.get_mut(&node) {
                entry.children.push(text);
            }
        }
    }

    fn set_text(&mut self, node: NodeHandle, text: &str) {
        if let Some(Kind::Text(content) | Kind::Comment(content)) =
            self.nodes.get_mut(&node).map(|n| &mut n.kind)
        {
            self.stats.text_updates += 1;
            *content = text.to_owned();
        }
    }

    fn insert(&mut self, node: NodeHandle, parent: NodeHandle, anchor: Option<NodeHandle>) {
        if !self.nodes.contains_key(&node) || !self.nodes.contains_key(&parent) {
            return;
        }
        if self.detach(node) {
            self.stats.moved += 1;
        } else {
            self.stats.inserted += 1;
        }
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.parent = Some(parent);
        }
        if let Some(entry) = self.nodes.get_mut(&parent) {
            let position = anchor
                .and_then(|anchor| entry.children.iter().position(|c| *c == anchor))
                .unwrap_or(entry.children.len());
            entry.children.insert(position, node);
        }
    }

    fn remove(&mut self, node: NodeHandle) {
        if !self.nodes.contains_key(&node) {
            return;
        }
        self.stats.removed += 1;
        self.detach(node);
        self.free(node);
    }

    fn patch_property(
        &mut self,
        node: NodeHandle,
        key: &str,
        prev: Option<&PropValue>,
        next: Option<&PropValue>,
    ) {
        self.stats.prop_patches += 1;
        if key == "style" {
            self.patch_style(node, prev, next);
            return;
        }
        let Some(element) = self.element_mut(node) else {
            return;
        };
        if key == "class" {
            element.class = next
                .and_then(PropValue::as_json)
                .and_then(Value::as_str)
                .map(str::to_owned);
        } else if is_listener(key) {
            let event = event_name(key);
            match next.and_then(PropValue::as_handler) {
                Some(handler) => {
                    element.listeners.insert(event, handler.clone());
                }
                None => {
                    element.listeners.remove(&event);
                }
            }
        } else {
            match next.and_then(PropValue::as_json) {
                None | Some(Value::Null) | Some(Value::Bool(false)) => {
                    element.attrs.remove(key);
                }
                Some(value) => {
                    element.attrs.insert(key.to_owned(), value.clone());
                }
            }
        }
    }

    fn next_sibling(&self, node: NodeHandle) -> Option<NodeHandle> {
        let parent = self.nodes.get(&node)?.parent?;
        let siblings = &self.nodes.get(&parent)?.children;
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn insert_appends_and_respects_anchor() {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        let a = host.create_text("a");
        let b = host.create_text("b");
        let c = host.create_text("c");

        host.insert(a, root, None);
        host.insert(c, root, None);
        host.insert(b, root, Some(c));

        assert_eq!(host.children(root), &[a, b, c]);
        assert_eq!(host.next_sibling(a), Some(b));
        assert_eq!(host.next_sibling(c), None);
        assert_eq!(host.serialize(root), "abc");
    }

    #[test]
    fn reinserting_counts_as_a_move() {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        let a = host.create_text("a");
        let b = host.create_text("b");
        host.insert(a, root, None);
        host.insert(b, root, None);

        host.insert(b, root, Some(a));
        assert_eq!(host.children(root), &[b, a]);

        let stats = host.stats();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.moved, 1);
    }

    #[test]
    fn remove_frees_the_subtree() {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        let div = host.create_element("div");
        let span = host.create_element("span");
        host.insert(span, div, None);
        host.insert(div, root, None);

        host.remove(div);
        assert!(!host.is_live(div));
        assert!(!host.is_live(span));
        assert!(host.children(root).is_empty());
        assert_eq!(host.node_count(), 1);
    }

    #[test]
    fn props_render_sorted() {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        let input = host.create_element("input");
        host.patch_property(input, "type", None, Some(&json!("text").into()));
        host.patch_property(input, "disabled", None, Some(&json!(true).into()));
        host.patch_property(input, "class", None, Some(&json!("a b").into()));
        host.patch_property(input, "style", None, Some(&json!({ "color": "red" }).into()));
        host.insert(input, root, None);

        assert_eq!(
            host.serialize(root),
            r#"<input class="a b" disabled style="color: red" type="text"></input>"#
        );

        host.patch_property(input, "disabled", Some(&json!(true).into()), Some(&json!(false).into()));
        host.patch_property(input, "class", None, None);
        assert_eq!(host.serialize(root), r#"<input style="color: red" type="text"></input>"#);
    }

    #[test]
    fn style_patch_drops_missing_entries() {
        let mut host = MemoryHost::new();
        let div = host.create_element("div");
        let prev: PropValue = json!({ "color": "red", "margin": "0" }).into();
        let next: PropValue = json!({ "color": "blue" }).into();

        host.patch_property(div, "style", None, Some(&prev));
        host.patch_property(div, "style", Some(&prev), Some(&next));
        assert_eq!(host.style(div, "color"), Some("blue"));
        assert_eq!(host.style(div, "margin"), None);
    }

    #[test]
    fn listeners_dispatch() {
        let mut host = MemoryHost::new();
        let button = host.create_element("button");
        let clicks = Rc::new(Cell::new(0));
        let counter = Rc::clone(&clicks);
        let handler = PropValue::Handler(Handler::new(move || counter.set(counter.get() + 1)));

        host.patch_property(button, "onClick", None, Some(&handler));
        assert!(host.dispatch(button, "click"));
        assert_eq!(clicks.get(), 1);

        host.patch_property(button, "onClick", Some(&handler), None);
        assert!(!host.dispatch(button, "click"));
    }

    #[test]
    fn element_text_replaces_children() {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        let p = host.create_element("p");
        let b = host.create_element("b");
        host.insert(b, p, None);
        host.insert(p, root, None);

        host.set_element_text(p, "plain");
        assert!(!host.is_live(b));
        assert_eq!(host.serialize(root), "<p>plain</p>");

        host.set_element_text(p, "");
        assert!(host.children(p).is_empty());
    }
}
