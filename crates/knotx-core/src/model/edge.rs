use serde::{Deserialize, Serialize};

use super::{EdgeId, KnotId, Properties};
use crate::filter::Filter;

/// Ordering handle of an edge inside its owning knot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeIdentifier {
    pub id: EdgeId,
    /// Insertion sequence; 0 means "not yet inserted"
    #[serde(default)]
    pub sequence: u64,
    pub priority: i32,
}

impl EdgeIdentifier {
    pub fn new(id: impl Into<EdgeId>, priority: i32) -> Self {
        Self {
            id: id.into(),
            sequence: 0,
            priority,
        }
    }
}

fn default_percentage() -> u8 {
    100
}

fn default_live() -> bool {
    true
}

/// Directed, filter-gated, prioritized pointer from one knot to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub identifier: EdgeIdentifier,
    pub target: KnotId,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default = "default_live")]
    pub live: bool,
    /// Share of evaluations, in percent, that may take this edge
    #[serde(default = "default_percentage")]
    pub percentage: u8,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub version: i64,
}

impl Edge {
    /// A live, always-on edge with no filters
    pub fn new(identifier: EdgeIdentifier, target: impl Into<KnotId>) -> Self {
        Self {
            identifier,
            target: target.into(),
            filters: Vec::new(),
            live: true,
            percentage: 100,
            properties: Properties::new(),
            version: 0,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_percentage(mut self, percentage: u8) -> Self {
        self.percentage = percentage;
        self
    }

    pub fn id(&self) -> &str {
        &self.identifier.id
    }

    /// The single context field every filter on this edge tests, if they agree
    pub fn pivot(&self) -> Option<&str> {
        crate::filter::pivot_of(&self.filters)
    }

    /// Same edge with versions ignored, for observational comparison
    pub(crate) fn same_content(&self, other: &Edge) -> bool {
        self.identifier.id == other.identifier.id
            && self.identifier.priority == other.identifier.priority
            && self.target == other.target
            && self.filters == other.filters
            && self.live == other.live
            && self.percentage == other.percentage
            && self.properties == other.properties
    }
}
