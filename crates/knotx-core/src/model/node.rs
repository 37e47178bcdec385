use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{KnotId, Value};

/// Result of evaluating one key
///
/// `node == None` is the empty result: the key is unmapped, or was cut off by
/// the evaluator's re-entry guard. `path` lists the index, in priority order,
/// of every edge taken from the root knot down to the resolved knot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyNode {
    pub key: String,
    pub node: Option<Node>,
    #[serde(default)]
    pub path: Vec<usize>,
}

/// Runtime result tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Value {
        id: KnotId,
        version: i64,
        value: Value,
    },
    List {
        id: KnotId,
        version: i64,
        children: Vec<KeyNode>,
    },
    Map {
        id: KnotId,
        version: i64,
        children: BTreeMap<String, KeyNode>,
    },
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Value { id, .. } | Node::List { id, .. } | Node::Map { id, .. } => id,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            Node::Value { version, .. }
            | Node::List { version, .. }
            | Node::Map { version, .. } => *version,
        }
    }

    /// JSON view: values inline, lists as arrays, maps as objects
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Node::Value { value, .. } => value.to_json(),
            Node::List { children, .. } => {
                serde_json::Value::Array(children.iter().map(KeyNode::to_json).collect())
            }
            Node::Map { children, .. } => serde_json::Value::Object(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.to_json()))
                    .collect(),
            ),
        }
    }
}

impl KeyNode {
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            node: None,
            path: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_none()
    }

    /// Terminal value, if this key resolved to a `Valued` knot
    pub fn value(&self) -> Option<&Value> {
        match &self.node {
            Some(Node::Value { value, .. }) => Some(value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.node
            .as_ref()
            .map(Node::to_json)
            .unwrap_or(serde_json::Value::Null)
    }

    pub fn bool_or(&self, default: bool) -> bool {
        self.value().map_or(default, |v| v.bool_or(default))
    }

    pub fn number_or(&self, default: f64) -> f64 {
        self.value().map_or(default, |v| v.number_or(default))
    }

    pub fn string_or(&self, default: &str) -> String {
        self.value()
            .map_or_else(|| default.to_string(), |v| v.string_or(default))
    }

    /// Structured view; a `Map` node renders as a JSON object
    pub fn object_or(&self, default: serde_json::Value) -> serde_json::Value {
        match &self.node {
            Some(Node::Value { value, .. }) => value.object_or(default),
            Some(node @ Node::Map { .. }) => node.to_json(),
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(key: &str, id: &str, value: &str) -> KeyNode {
        KeyNode {
            key: key.into(),
            node: Some(Node::Value {
                id: id.into(),
                version: 0,
                value: Value::from(value),
            }),
            path: Vec::new(),
        }
    }

    #[test]
    fn test_empty_key_node_defaults() {
        let empty = KeyNode::empty("missing");
        assert!(empty.is_empty());
        assert!(empty.bool_or(true));
        assert_eq!(empty.string_or("fallback"), "fallback");
        assert_eq!(empty.to_json(), json!(null));
    }

    #[test]
    fn test_map_node_to_object() {
        let mut children = BTreeMap::new();
        children.insert("title".to_string(), leaf("t", "k1", "Hello"));
        children.insert("missing".to_string(), KeyNode::empty("m"));
        let node = KeyNode {
            key: "page".into(),
            node: Some(Node::Map {
                id: "m1".into(),
                version: 3,
                children,
            }),
            path: vec![0],
        };
        assert_eq!(
            node.object_or(json!({})),
            json!({"title": "Hello", "missing": null})
        );
        assert_eq!(node.string_or("x"), "x");
    }
}
