//! Virtual Nodes
//!
//! A [`VNode`] describes one node of the tree to render: a text or comment
//! leaf, a fragment, an element, or a component. VNodes are plain owned
//! values; the renderer fills in the mounted host handle (`el`) and, for
//! components, the live instance.
//!
//! # Shape
//!
//! Every node carries [`ShapeFlags`] combining its type category with its
//! children category, so the renderer can dispatch without inspecting the
//! node type and the children separately.

mod props;

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use serde_json::Value;

pub use props::{
    event_name, is_listener, normalize_class, normalize_style, parse_style, Handler, PropValue,
    Props,
};

use crate::host::NodeHandle;
use crate::renderer::{ComponentDef, ComponentInstance};

bitflags! {
    /// Type and children category of a node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShapeFlags: u32 {
        const ELEMENT = 1;
        const STATEFUL_COMPONENT = 1 << 2;
        const TEXT_CHILDREN = 1 << 3;
        const ARRAY_CHILDREN = 1 << 4;
    }
}

/// What a node is.
#[derive(Clone)]
pub enum NodeType {
    Text,
    Comment,
    Fragment,
    Element(String),
    Component(Rc<ComponentDef>),
}

impl PartialEq for NodeType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NodeType::Text, NodeType::Text)
            | (NodeType::Comment, NodeType::Comment)
            | (NodeType::Fragment, NodeType::Fragment) => true,
            (NodeType::Element(a), NodeType::Element(b)) => a == b,
            (NodeType::Component(a), NodeType::Component(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Text => f.write_str("Text"),
            NodeType::Comment => f.write_str("Comment"),
            NodeType::Fragment => f.write_str("Fragment"),
            NodeType::Element(tag) => write!(f, "Element({tag})"),
            NodeType::Component(def) => write!(f, "Component({})", def.name()),
        }
    }
}

/// Identity of a node among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Str(String),
    Int(i64),
}

impl NodeKey {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(NodeKey::Str(s.clone())),
            Value::Number(n) => n.as_i64().map(NodeKey::Int),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Str(s) => f.write_str(s),
            NodeKey::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for NodeKey {
    fn from(key: &str) -> Self {
        NodeKey::Str(key.to_owned())
    }
}

impl From<String> for NodeKey {
    fn from(key: String) -> Self {
        NodeKey::Str(key)
    }
}

impl From<i64> for NodeKey {
    fn from(key: i64) -> Self {
        NodeKey::Int(key)
    }
}

/// Children of a node.
#[derive(Debug, Clone, Default)]
pub enum Children {
    #[default]
    None,
    Text(String),
    List(Vec<VNode>),
}

impl Children {
    fn flag(&self) -> ShapeFlags {
        match self {
            Children::None => ShapeFlags::empty(),
            Children::Text(_) => ShapeFlags::TEXT_CHILDREN,
            Children::List(_) => ShapeFlags::ARRAY_CHILDREN,
        }
    }
}

impl From<Vec<VNode>> for Children {
    fn from(list: Vec<VNode>) -> Self {
        Children::List(list)
    }
}

impl From<&str> for Children {
    fn from(text: &str) -> Self {
        Children::Text(text.to_owned())
    }
}

impl From<String> for Children {
    fn from(text: String) -> Self {
        Children::Text(text)
    }
}

impl From<()> for Children {
    fn from(_: ()) -> Self {
        Children::None
    }
}

/// A node of the virtual tree.
#[derive(Clone)]
pub struct VNode {
    pub(crate) node_type: NodeType,
    pub(crate) props: Props,
    pub(crate) children: Children,
    pub(crate) shape: ShapeFlags,
    pub(crate) key: Option<NodeKey>,
    pub(crate) el: Option<NodeHandle>,
    pub(crate) component: Option<Rc<ComponentInstance>>,
}

impl VNode {
    fn new(node_type: NodeType, children: Children) -> Self {
        let type_flag = match &node_type {
            NodeType::Element(_) => ShapeFlags::ELEMENT,
            NodeType::Component(_) => ShapeFlags::STATEFUL_COMPONENT,
            _ => ShapeFlags::empty(),
        };
        let shape = type_flag | children.flag();
        Self {
            node_type,
            props: Props::new(),
            children,
            shape,
            key: None,
            el: None,
            component: None,
        }
    }

    /// A text leaf.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(NodeType::Text, Children::Text(content.into()))
    }

    /// A comment leaf.
    pub fn comment(content: impl Into<String>) -> Self {
        Self::new(NodeType::Comment, Children::Text(content.into()))
    }

    /// A fragment: a list of siblings without a host node of its own.
    pub fn fragment(children: Vec<VNode>) -> Self {
        Self::new(NodeType::Fragment, Children::List(children))
    }

    /// An element without props or children. Use the builder methods to
    /// add them.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::new(NodeType::Element(tag.into()), Children::None)
    }

    /// A component node.
    pub fn component(def: &Rc<ComponentDef>, props: Props) -> Self {
        Self::new(NodeType::Component(Rc::clone(def)), Children::None).with_props(props)
    }

    /// Set a prop. `key` sets the node key, `class` and `style` are
    /// normalized.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.set_prop(name.into(), value.into());
        self
    }

    /// Attach an event listener: `on("click", ..)` sets `onClick`.
    pub fn on<F>(self, event: &str, handler: F) -> Self
    where
        F: Fn() + 'static,
    {
        let mut chars = event.chars();
        let name = match chars.next() {
            Some(first) => format!("on{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => "on".to_owned(),
        };
        self.prop(name, Handler::new(handler))
    }

    /// Set the node key.
    pub fn key(mut self, key: impl Into<NodeKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Append a child. Existing text children become a text node.
    pub fn child(mut self, child: VNode) -> Self {
        let list = match std::mem::take(&mut self.children) {
            Children::None => vec![child],
            Children::Text(text) => vec![VNode::text(text), child],
            Children::List(mut list) => {
                list.push(child);
                list
            }
        };
        self.set_children(Children::List(list));
        self
    }

    /// Replace the children.
    pub fn children(mut self, children: impl Into<Children>) -> Self {
        self.set_children(children.into());
        self
    }

    fn with_props(mut self, props: Props) -> Self {
        for (name, value) in props {
            self.set_prop(name, value);
        }
        self
    }

    fn set_children(&mut self, children: Children) {
        // Fragments have no host node to hold text.
        let children = match (&self.node_type, children) {
            (NodeType::Fragment, Children::Text(text)) => Children::List(vec![VNode::text(text)]),
            (_, children) => children,
        };
        self.shape
            .remove(ShapeFlags::TEXT_CHILDREN | ShapeFlags::ARRAY_CHILDREN);
        self.shape |= children.flag();
        self.children = children;
    }

    fn set_prop(&mut self, name: String, value: PropValue) {
        let value = match (name.as_str(), value) {
            ("key", PropValue::Json(key)) => {
                self.key = NodeKey::from_json(&key);
                return;
            }
            ("class", PropValue::Json(class)) => PropValue::Json(normalize_class(&class).into()),
            ("style", PropValue::Json(style)) => PropValue::Json(normalize_style(&style)),
            (_, value) => value,
        };
        self.props.insert(name, value);
    }

    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn get_children(&self) -> &Children {
        &self.children
    }

    pub fn shape(&self) -> ShapeFlags {
        self.shape
    }

    pub fn get_key(&self) -> Option<&NodeKey> {
        self.key.as_ref()
    }

    /// The mounted host node, if any. Fragments and components have none.
    pub fn el(&self) -> Option<NodeHandle> {
        self.el
    }

    /// The live component instance of a mounted component node.
    pub fn component_instance(&self) -> Option<&Rc<ComponentInstance>> {
        self.component.as_ref()
    }

    /// Text content of a text or comment leaf.
    pub fn text_content(&self) -> Option<&str> {
        match (&self.node_type, &self.children) {
            (NodeType::Text | NodeType::Comment, Children::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub(crate) fn list_children_mut(&mut self) -> Option<&mut Vec<VNode>> {
        match &mut self.children {
            Children::List(list) => Some(list),
            _ => None,
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("type", &self.node_type);
        if let Some(key) = &self.key {
            s.field("key", key);
        }
        if !self.props.is_empty() {
            s.field("props", &self.props);
        }
        match &self.children {
            Children::None => {}
            Children::Text(text) => {
                s.field("text", text);
            }
            Children::List(list) => {
                s.field("children", list);
            }
        }
        s.field("el", &self.el).finish()
    }
}

/// Build an element from a tag, props and children.
pub fn h(tag: impl Into<String>, props: Props, children: impl Into<Children>) -> VNode {
    VNode::element(tag).with_props(props).children(children)
}

/// Whether two nodes can be patched into each other: same type and key.
pub fn is_same_node(a: &VNode, b: &VNode) -> bool {
    a.node_type == b.node_type && a.key == b.key
}

/// Build [`Props`] from `name => value` pairs.
#[macro_export]
macro_rules! props {
    () => { $crate::vnode::Props::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::vnode::Props::new();
        $( props.insert(::std::string::String::from($name), $crate::vnode::PropValue::from($value)); )+
        props
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shape_combines_type_and_children() {
        let node = VNode::element("div").children("hi");
        assert_eq!(node.shape(), ShapeFlags::ELEMENT | ShapeFlags::TEXT_CHILDREN);

        let node = VNode::element("ul").child(VNode::element("li"));
        assert_eq!(node.shape(), ShapeFlags::ELEMENT | ShapeFlags::ARRAY_CHILDREN);

        let node = VNode::fragment(vec![]);
        assert_eq!(node.shape(), ShapeFlags::ARRAY_CHILDREN);

        assert_eq!(VNode::element("br").shape(), ShapeFlags::ELEMENT);
    }

    #[test]
    fn text_children_become_a_node_when_a_child_is_added() {
        let node = VNode::element("p").children("a").child(VNode::text("b"));
        assert_eq!(node.shape(), ShapeFlags::ELEMENT | ShapeFlags::ARRAY_CHILDREN);
        match node.get_children() {
            Children::List(list) => {
                assert_eq!(list.len(), 2);
                assert_eq!(list[0].text_content(), Some("a"));
            }
            other => panic!("unexpected children {other:?}"),
        }
    }

    #[test]
    fn key_prop_becomes_the_node_key() {
        let node = h("li", props! { "key" => 7i64, "id" => "x" }, ());
        assert_eq!(node.get_key(), Some(&NodeKey::Int(7)));
        assert!(!node.props().contains_key("key"));
        assert!(node.props().contains_key("id"));
    }

    #[test]
    fn class_and_style_are_normalized_on_build() {
        let node = VNode::element("div")
            .prop("class", json!(["a", { "b": true, "c": false }]))
            .prop("style", "color: red");
        assert_eq!(node.props()["class"], PropValue::Json(json!("a b")));
        assert_eq!(node.props()["style"], PropValue::Json(json!({ "color": "red" })));
    }

    #[test]
    fn same_node_requires_type_and_key() {
        let a = VNode::element("li").key("a");
        assert!(is_same_node(&a, &VNode::element("li").key("a")));
        assert!(!is_same_node(&a, &VNode::element("li").key("b")));
        assert!(!is_same_node(&a, &VNode::element("div").key("a")));
        assert!(!is_same_node(&VNode::text("x"), &VNode::comment("x")));
        assert!(is_same_node(&VNode::text("x"), &VNode::text("y")));
    }

    #[test]
    fn listeners_are_stored_as_on_props() {
        let node = VNode::element("button").on("click", || {});
        assert!(matches!(node.props()["onClick"], PropValue::Handler(_)));
    }
}
