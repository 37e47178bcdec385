//! Filter and edge-match evaluation

use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::context::Context;
use super::gate::{self, PercentageSampler, ThreadRngSampler};
use super::generic::{GenericFilterHandler, RejectingGenericHandler};
use super::Filter;
use crate::model::Edge;

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

/// Compiled pattern from the process-wide cache; `None` if it does not compile
fn cached_regex(pattern: &str) -> Option<Regex> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(re) = guard.get(pattern) {
            return Some(re.clone());
        }
    }

    let compiled = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid regex in filter; evaluating to false");
            return None;
        }
    };

    let mut guard = cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    if guard.len() >= REGEX_CACHE_MAX {
        guard.clear();
    }
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());
    Some(compiled)
}

/// Evaluates filters and full edge matches against a context
#[derive(Clone)]
pub struct FilterEvaluator {
    generic: Arc<dyn GenericFilterHandler>,
    sampler: Arc<dyn PercentageSampler>,
}

impl Default for FilterEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(RejectingGenericHandler), Arc::new(ThreadRngSampler))
    }
}

impl std::fmt::Debug for FilterEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEvaluator").finish_non_exhaustive()
    }
}

impl FilterEvaluator {
    pub fn new(
        generic: Arc<dyn GenericFilterHandler>,
        sampler: Arc<dyn PercentageSampler>,
    ) -> Self {
        Self { generic, sampler }
    }

    /// Edge match: live, percentage gate passed, and every filter true
    pub fn edge_matches(&self, edge: &Edge, context: &dyn Context) -> bool {
        if !edge.live {
            return false;
        }
        if !gate::admits(self.sampler.as_ref(), edge.percentage) {
            tracing::trace!(edge_id = edge.id(), percentage = edge.percentage, "gated out");
            return false;
        }
        edge.filters
            .iter()
            .all(|filter| self.evaluate(filter, context, Some(edge)))
    }

    pub fn evaluate(&self, filter: &Filter, context: &dyn Context, entity: Option<&Edge>) -> bool {
        let resolve = |path: &str| context.document().query(path);
        match filter {
            Filter::Equals { path, value } => all_of(&resolve(path), |v| json_eq(v, value)),
            Filter::NotEquals { path, value } => all_of(&resolve(path), |v| !json_eq(v, value)),
            Filter::Contains { path, value } => all_of(&resolve(path), |v| contains(v, value)),
            Filter::Exists { path } => resolve(path).iter().any(|v| !v.is_null()),
            Filter::Missing { path } => resolve(path).iter().all(serde_json::Value::is_null),
            Filter::In { path, values } => resolve(path)
                .iter()
                .filter(|v| !v.is_null())
                .any(|v| values.iter().any(|candidate| json_eq(v, candidate))),
            Filter::NotIn { path, values } => all_of(&resolve(path), |v| {
                !values.iter().any(|candidate| json_eq(v, candidate))
            }),
            Filter::LessThan { path, value } => {
                all_of(&resolve(path), |v| compare(v, value) == Some(Ordering::Less))
            }
            Filter::LessOrEqual { path, value } => all_of(&resolve(path), |v| {
                matches!(compare(v, value), Some(Ordering::Less | Ordering::Equal))
            }),
            Filter::GreaterThan { path, value } => {
                all_of(&resolve(path), |v| compare(v, value) == Some(Ordering::Greater))
            }
            Filter::GreaterOrEqual { path, value } => all_of(&resolve(path), |v| {
                matches!(compare(v, value), Some(Ordering::Greater | Ordering::Equal))
            }),
            Filter::Between { path, low, high } => all_of(&resolve(path), |v| {
                matches!(compare(v, low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(v, high), Some(Ordering::Less | Ordering::Equal))
            }),
            Filter::StartsWith { path, prefix } => {
                all_of(&resolve(path), |v| v.as_str().is_some_and(|s| s.starts_with(prefix.as_str())))
            }
            Filter::EndsWith { path, suffix } => {
                all_of(&resolve(path), |v| v.as_str().is_some_and(|s| s.ends_with(suffix.as_str())))
            }
            Filter::RegexMatch { path, pattern } => match cached_regex(pattern) {
                Some(re) => all_of(&resolve(path), |v| v.as_str().is_some_and(|s| re.is_match(s))),
                None => false,
            },
            Filter::And { filters } => filters
                .iter()
                .all(|child| self.evaluate(child, context, entity)),
            Filter::Or { filters } => filters
                .iter()
                .any(|child| self.evaluate(child, context, entity)),
            Filter::Not { filter } => !self.evaluate(filter, context, entity),
            Filter::Any => true,
            Filter::Generic { payload } => self.generic.matches(payload, context, entity),
        }
    }
}

/// Every non-null value satisfies `predicate`, and there is at least one
fn all_of<F>(values: &[serde_json::Value], predicate: F) -> bool
where
    F: Fn(&serde_json::Value) -> bool,
{
    let mut seen = false;
    for value in values.iter().filter(|v| !v.is_null()) {
        if !predicate(value) {
            return false;
        }
        seen = true;
    }
    seen
}

/// Equality with numbers compared by value, so `1 == 1.0`
fn json_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

/// Numbers numerically, strings lexicographically, anything else unordered
fn compare(a: &serde_json::Value, b: &serde_json::Value) -> Option<Ordering> {
    match (a, b) {
        (serde_json::Value::Number(x), serde_json::Value::Number(y)) => {
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (serde_json::Value::String(x), serde_json::Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(subject: &serde_json::Value, needle: &serde_json::Value) -> bool {
    match (subject, needle) {
        (serde_json::Value::String(s), serde_json::Value::String(n)) => s.contains(n.as_str()),
        (serde_json::Value::Array(items), _) => items.iter().any(|item| json_eq(item, needle)),
        _ => false,
    }
}
