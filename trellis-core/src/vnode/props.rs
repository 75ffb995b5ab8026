//! Node props.
//!
//! Props are an ordered map from name to [`PropValue`]. A value is either
//! plain JSON or an event handler. `class` and `style` are normalized when a
//! node is built, so the host only ever sees a class string and a style map.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Ordered props of a node.
pub type Props = IndexMap<String, PropValue>;

/// An event handler. Handlers compare by identity.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn()>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self) {
        (self.0)()
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.0))
    }
}

/// A single prop value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Json(Value),
    Handler(Handler),
}

impl PropValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            PropValue::Json(value) => Some(value),
            PropValue::Handler(_) => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            PropValue::Handler(handler) => Some(handler),
            PropValue::Json(_) => None,
        }
    }
}

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        PropValue::Json(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Json(Value::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Json(Value::from(value))
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Json(Value::from(value))
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Json(Value::from(value))
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Json(Value::from(value))
    }
}

impl From<Handler> for PropValue {
    fn from(handler: Handler) -> Self {
        PropValue::Handler(handler)
    }
}

/// Whether `name` is an event listener prop (`onClick`, `onInput`, ...).
pub fn is_listener(name: &str) -> bool {
    name.strip_prefix("on")
        .and_then(|rest| rest.chars().next())
        .map_or(false, |c| !c.is_ascii_lowercase())
}

/// `onClick` → `click`.
pub fn event_name(name: &str) -> String {
    name.get(2..).unwrap_or_default().to_ascii_lowercase()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Flatten a `class` value into a space-separated string.
///
/// Strings are kept, arrays are flattened recursively, objects contribute
/// the names of their truthy entries.
pub fn normalize_class(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Array(items) => items
            .iter()
            .map(normalize_class)
            .filter(|class| !class.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(map) => map
            .iter()
            .filter(|(_, enabled)| is_truthy(enabled))
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Split a CSS declaration list on `;`, ignoring semicolons inside
/// parentheses.
fn split_declarations(css: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in css.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => {
                parts.push(&css[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&css[start..]);
    parts
}

/// Parse `"color: red; margin: 0"` into a map.
pub fn parse_style(css: &str) -> Map<String, Value> {
    let mut style = Map::new();
    for declaration in split_declarations(css) {
        if let Some((name, value)) = declaration.split_once(':') {
            let name = name.trim();
            if !name.is_empty() {
                style.insert(name.to_owned(), Value::from(value.trim()));
            }
        }
    }
    style
}

/// Normalize a `style` value into a map. Arrays are merged left to right.
pub fn normalize_style(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.clone()),
        Value::String(css) => Value::Object(parse_style(css)),
        Value::Array(items) => {
            let mut merged = Map::new();
            for item in items {
                if let Value::Object(map) = normalize_style(item) {
                    merged.extend(map);
                }
            }
            Value::Object(merged)
        }
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn class_normalization() {
        assert_eq!(normalize_class(&json!("a b")), "a b");
        assert_eq!(normalize_class(&json!(["a", ["b", ""], { "c": true }])), "a b c");
        assert_eq!(
            normalize_class(&json!({ "on": true, "off": false, "zero": 0, "one": 1 })),
            "on one"
        );
        assert_eq!(normalize_class(&json!(null)), "");
    }

    #[test]
    fn style_normalization() {
        assert_eq!(
            normalize_style(&json!("color: red; background: url(a;b)")),
            json!({ "color": "red", "background": "url(a;b)" })
        );
        assert_eq!(
            normalize_style(&json!([{ "a": "1" }, "b: 2", { "a": "3" }])),
            json!({ "a": "3", "b": "2" })
        );
    }

    #[test]
    fn listener_names() {
        assert!(is_listener("onClick"));
        assert!(!is_listener("once"));
        assert!(!is_listener("on"));
        assert_eq!(event_name("onClick"), "click");
    }

    #[test]
    fn handlers_compare_by_identity() {
        let a = Handler::new(|| {});
        let b = Handler::new(|| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
