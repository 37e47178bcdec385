//! Filter vocabulary and evaluation
//!
//! The vocabulary is closed. Anything the core does not understand travels
//! as [`Filter::Generic`] and is handed to the configured
//! [`GenericFilterHandler`].

pub mod context;
pub mod eval;
pub mod gate;
pub mod generic;
pub mod path;

pub use context::{Context, JsonContext};
pub use eval::FilterEvaluator;
pub use gate::{PercentageSampler, SeededSampler, ThreadRngSampler};
pub use generic::{GenericFilterHandler, RejectingGenericHandler};
pub use path::PathDocument;

use serde::{Deserialize, Serialize};

/// Condition attached to an edge
///
/// Leaf filters carry a JSONPath-style `path` into the context document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    Equals {
        path: String,
        value: serde_json::Value,
    },
    NotEquals {
        path: String,
        value: serde_json::Value,
    },
    Contains {
        path: String,
        value: serde_json::Value,
    },
    Exists {
        path: String,
    },
    Missing {
        path: String,
    },
    In {
        path: String,
        values: Vec<serde_json::Value>,
    },
    NotIn {
        path: String,
        values: Vec<serde_json::Value>,
    },
    LessThan {
        path: String,
        value: serde_json::Value,
    },
    LessOrEqual {
        path: String,
        value: serde_json::Value,
    },
    GreaterThan {
        path: String,
        value: serde_json::Value,
    },
    GreaterOrEqual {
        path: String,
        value: serde_json::Value,
    },
    /// Inclusive on both ends
    Between {
        path: String,
        low: serde_json::Value,
        high: serde_json::Value,
    },
    StartsWith {
        path: String,
        prefix: String,
    },
    EndsWith {
        path: String,
        suffix: String,
    },
    RegexMatch {
        path: String,
        pattern: String,
    },
    And {
        filters: Vec<Filter>,
    },
    Or {
        filters: Vec<Filter>,
    },
    Not {
        filter: Box<Filter>,
    },
    /// Always true
    Any,
    /// Opaque payload for an injected handler
    Generic {
        payload: serde_json::Value,
    },
}

impl Filter {
    pub fn equals(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Filter::Equals {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn not_equals(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Filter::NotEquals {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn contains(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Filter::Contains {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Filter::Exists { path: path.into() }
    }

    pub fn missing(path: impl Into<String>) -> Self {
        Filter::Missing { path: path.into() }
    }

    pub fn is_in<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        Filter::In {
            path: path.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        Filter::NotIn {
            path: path.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn greater_than(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Filter::GreaterThan {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn less_than(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Filter::LessThan {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn between(
        path: impl Into<String>,
        low: impl Into<serde_json::Value>,
        high: impl Into<serde_json::Value>,
    ) -> Self {
        Filter::Between {
            path: path.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn regex(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::RegexMatch {
            path: path.into(),
            pattern: pattern.into(),
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// The single context path this filter tests
    ///
    /// Composites have a pivot only when every child agrees on it.
    pub fn pivot(&self) -> Option<&str> {
        match self {
            Filter::Equals { path, .. }
            | Filter::NotEquals { path, .. }
            | Filter::Contains { path, .. }
            | Filter::Exists { path }
            | Filter::Missing { path }
            | Filter::In { path, .. }
            | Filter::NotIn { path, .. }
            | Filter::LessThan { path, .. }
            | Filter::LessOrEqual { path, .. }
            | Filter::GreaterThan { path, .. }
            | Filter::GreaterOrEqual { path, .. }
            | Filter::Between { path, .. }
            | Filter::StartsWith { path, .. }
            | Filter::EndsWith { path, .. }
            | Filter::RegexMatch { path, .. } => Some(path),
            Filter::Not { filter } => filter.pivot(),
            Filter::And { filters } | Filter::Or { filters } => pivot_of(filters),
            Filter::Any | Filter::Generic { .. } => None,
        }
    }
}

/// Shared pivot of a filter list; `None` if empty or the filters disagree
pub fn pivot_of(filters: &[Filter]) -> Option<&str> {
    let mut pivots = filters.iter().map(Filter::pivot);
    let first = pivots.next()??;
    pivots.all(|p| p == Some(first)).then_some(first)
}
