use serde::{Deserialize, Serialize};

use super::{Edge, Knot, KnotId, UNCONDITIONAL_VERSION};

/// One ordered, incremental tree-mutation instruction
///
/// Operations are order-dependent: a `KeyMapping` must root the tree before
/// any `Knot` or `Edge` operation can locate its node, and a parent's `Knot`
/// operation must list an edge before that edge's `Edge` operation arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeltaOperation {
    KeyMapping { key: String, knot_id: KnotId },
    Knot(Knot),
    Edge(Edge),
}

impl DeltaOperation {
    /// Id of the node this operation addresses
    pub fn target_id(&self) -> &str {
        match self {
            DeltaOperation::KeyMapping { knot_id, .. } => knot_id,
            DeltaOperation::Knot(knot) => &knot.id,
            DeltaOperation::Edge(edge) => &edge.identifier.id,
        }
    }

    /// Inverse-style copy that overwrites without a version check
    pub fn unconditional(self) -> Self {
        match self {
            DeltaOperation::Knot(mut knot) => {
                knot.version = UNCONDITIONAL_VERSION;
                DeltaOperation::Knot(knot)
            }
            DeltaOperation::Edge(mut edge) => {
                edge.version = UNCONDITIONAL_VERSION;
                DeltaOperation::Edge(edge)
            }
            other => other,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DeltaOperation::KeyMapping { .. } => "key_mapping",
            DeltaOperation::Knot(_) => "knot",
            DeltaOperation::Edge(_) => "edge",
        }
    }
}
