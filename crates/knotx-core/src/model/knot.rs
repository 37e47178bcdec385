use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{KnotId, OrderedEdges, Properties, Value};

/// Payload of a knot
///
/// `Valued` is terminal. `Multi` and `Map` name further keys, which are
/// resolved through the key→knot mapping rather than through edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum KnotData {
    Valued(Value),
    Multi(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl KnotData {
    pub fn valued(value: impl Into<Value>) -> Self {
        KnotData::Valued(value.into())
    }

    pub fn multi<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KnotData::Multi(keys.into_iter().map(Into::into).collect())
    }

    /// Keys this payload dereferences, in declared order
    pub fn referenced_keys(&self) -> Vec<&str> {
        match self {
            KnotData::Valued(_) => Vec::new(),
            KnotData::Multi(keys) => keys.iter().map(String::as_str).collect(),
            KnotData::Map(entries) => entries.values().map(String::as_str).collect(),
        }
    }
}

/// A tree node: data plus priority-ordered outgoing edge identifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knot {
    pub id: KnotId,
    #[serde(default)]
    pub version: i64,
    pub data: KnotData,
    #[serde(default)]
    pub edges: OrderedEdges,
    #[serde(default)]
    pub properties: Properties,
}

impl Knot {
    /// Create a knot at version 0 with no edges
    pub fn new(id: impl Into<KnotId>, data: KnotData) -> Self {
        Self {
            id: id.into(),
            version: 0,
            data,
            edges: OrderedEdges::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn has_edges(&self) -> bool {
        !self.edges.is_empty()
    }

    /// Same knot with versions and sequence stamps ignored
    pub(crate) fn same_content(&self, other: &Knot) -> bool {
        self.id == other.id
            && self.data == other.data
            && self.properties == other.properties
            && self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(other.edges.iter())
                .all(|(a, b)| a.id == b.id && a.priority == b.priority)
    }
}
