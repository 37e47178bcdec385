//! Flat, id-indexed view of an evaluated key

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::model::{KeyNode, KnotId, Node, Value};

/// Evaluation result with nested children replaced by knot ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatTree {
    pub root_key: String,
    /// `None` when the root key resolved to nothing
    pub root_id: Option<KnotId>,
    pub nodes: BTreeMap<KnotId, FlatEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatEntry {
    /// Key this knot was first reached through
    pub key: String,
    /// Edge indices taken to reach this knot from its key's root
    pub path: Vec<usize>,
    pub node: FlatNode,
    pub version: i64,
}

/// `None` children stand for keys that resolved to nothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FlatNode {
    Value(Value),
    List(Vec<Option<KnotId>>),
    Map(BTreeMap<String, Option<KnotId>>),
}

impl FlatTree {
    pub fn root(&self) -> Option<&FlatEntry> {
        self.root_id.as_ref().and_then(|id| self.nodes.get(id))
    }
}

/// Flatten in one depth-first pass; the first entry seen for an id wins
pub fn flatten(root: &KeyNode) -> FlatTree {
    let mut nodes = BTreeMap::new();
    let mut seen = HashSet::new();
    let root_id = visit(root, &mut seen, &mut nodes);
    FlatTree {
        root_key: root.key.clone(),
        root_id,
        nodes,
    }
}

fn visit(
    key_node: &KeyNode,
    seen: &mut HashSet<KnotId>,
    nodes: &mut BTreeMap<KnotId, FlatEntry>,
) -> Option<KnotId> {
    let node = key_node.node.as_ref()?;
    let id = node.id().to_string();
    // pre-order claim, so a repeat further down cannot take the slot
    if !seen.insert(id.clone()) {
        return Some(id);
    }

    let flat = match node {
        Node::Value { value, .. } => FlatNode::Value(value.clone()),
        Node::List { children, .. } => FlatNode::List(
            children
                .iter()
                .map(|child| visit(child, seen, nodes))
                .collect(),
        ),
        Node::Map { children, .. } => FlatNode::Map(
            children
                .iter()
                .map(|(name, child)| (name.clone(), visit(child, seen, nodes)))
                .collect(),
        ),
    };

    nodes.insert(
        id.clone(),
        FlatEntry {
            key: key_node.key.clone(),
            path: key_node.path.clone(),
            node: flat,
            version: node.version(),
        },
    );
    Some(id)
}
