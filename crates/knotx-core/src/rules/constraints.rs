//! Structural limits and the mutual-exclusivity pivot rule
//!
//! All checks run before a mutation touches the stores.

use crate::config::ForestSettings;
use crate::errors::{KnotXError, Result};
use crate::filter::{pivot_of, Filter};
use crate::model::{Edge, UNCONDITIONAL_VERSION};

/// Per-edge checks: filter count, single-filter toggle, percentage range
pub fn validate_edge(settings: &ForestSettings, edge: &Edge) -> Result<()> {
    validate_edge_parts(settings, edge.id(), &edge.filters, edge.percentage)
}

pub(crate) fn validate_edge_parts(
    settings: &ForestSettings,
    edge_id: &str,
    filters: &[Filter],
    percentage: u8,
) -> Result<()> {
    if filters.len() > settings.max_filters_per_edge {
        return Err(KnotXError::TooManyFilters {
            edge_id: edge_id.to_string(),
            count: filters.len(),
            limit: settings.max_filters_per_edge,
        });
    }
    if settings.single_filter_per_edge && filters.len() > 1 {
        return Err(KnotXError::invalid(format!(
            "edge {} carries {} filters but only one is allowed",
            edge_id,
            filters.len()
        )));
    }
    if percentage > 100 {
        return Err(KnotXError::invalid(format!(
            "edge {} percentage {} is outside 0..=100",
            edge_id, percentage
        )));
    }
    Ok(())
}

/// Optimistic concurrency: `expected` must match the stored version
///
/// [`UNCONDITIONAL_VERSION`] matches anything.
pub fn check_version(id: &str, expected: i64, actual: i64) -> Result<()> {
    if expected != UNCONDITIONAL_VERSION && expected != actual {
        return Err(KnotXError::VersionConflict {
            id: id.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

pub fn validate_edge_count(settings: &ForestSettings, knot_id: &str, count: usize) -> Result<()> {
    if count > settings.max_edges_per_knot {
        return Err(KnotXError::TooManyEdges {
            knot_id: knot_id.to_string(),
            count,
            limit: settings.max_edges_per_knot,
        });
    }
    Ok(())
}

/// With mutual exclusivity on, every sibling edge must test one shared path
///
/// `siblings` yields each edge's filter list. An edge without a pivot
/// (no filters, only `Any`/`Generic`, or disagreeing filters) breaks the rule.
pub fn validate_pivots<'a, I>(settings: &ForestSettings, knot_id: &str, siblings: I) -> Result<()>
where
    I: IntoIterator<Item = &'a [Filter]>,
{
    if !settings.mutual_exclusivity {
        return Ok(());
    }
    let mut expected: Option<&str> = None;
    for filters in siblings {
        let found = pivot_of(filters);
        let agrees = match (expected, found) {
            (_, None) => false,
            (None, Some(pivot)) => {
                expected = Some(pivot);
                true
            }
            (Some(exp), Some(pivot)) => exp == pivot,
        };
        if !agrees {
            return Err(KnotXError::EdgePivotConstraintViolation {
                knot_id: knot_id.to_string(),
                expected: expected.map(str::to_string),
                found: found.map(str::to_string),
            });
        }
    }
    Ok(())
}
