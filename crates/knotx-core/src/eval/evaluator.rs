//! Recursive key evaluation

use std::collections::{BTreeMap, HashMap, HashSet};

use super::selector::select_edge;
use crate::errors::Result;
use crate::filter::{Context, FilterEvaluator};
use crate::model::{KeyNode, Knot, KnotData, Node};
use crate::store::{EdgeStore, KeyTreeStore, KnotStore};

/// Resolves keys to value trees against one set of stores
///
/// Memoization is per [`evaluate`](Self::evaluate) call: the context is fixed
/// for the call, so a key named twice resolves once.
pub struct Evaluator<'a> {
    keys: &'a dyn KeyTreeStore,
    knots: &'a dyn KnotStore,
    edges: &'a dyn EdgeStore,
    filters: FilterEvaluator,
    max_depth: usize,
}

#[derive(Default)]
struct Session {
    memo: HashMap<String, KeyNode>,
    /// Keys on the current resolution chain
    active: HashSet<String>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        keys: &'a dyn KeyTreeStore,
        knots: &'a dyn KnotStore,
        edges: &'a dyn EdgeStore,
        filters: FilterEvaluator,
        max_depth: usize,
    ) -> Self {
        Self {
            keys,
            knots,
            edges,
            filters,
            max_depth,
        }
    }

    /// Evaluate `key` for `context`
    ///
    /// An unmapped key, a dangling root or an empty selection is not an
    /// error; the result is then an empty or partial [`KeyNode`].
    ///
    /// # Errors
    ///
    /// Only store failures.
    pub fn evaluate(&self, key: &str, context: &dyn Context) -> Result<KeyNode> {
        tracing::debug!(key, trace_id = %context.trace_id(), "evaluate");
        let mut session = Session::default();
        self.resolve_key(key, context, &mut session, 0)
    }

    fn resolve_key(
        &self,
        key: &str,
        context: &dyn Context,
        session: &mut Session,
        depth: usize,
    ) -> Result<KeyNode> {
        if let Some(done) = session.memo.get(key) {
            return Ok(done.clone());
        }
        if session.active.contains(key) {
            tracing::warn!(key, trace_id = %context.trace_id(), "key re-entered during its own resolution");
            return Ok(KeyNode::empty(key));
        }
        if depth > self.max_depth {
            tracing::warn!(key, depth, "evaluation depth limit reached");
            return Ok(KeyNode::empty(key));
        }

        session.active.insert(key.to_string());
        let resolved = self.resolve_mapped(key, context, session, depth);
        session.active.remove(key);

        let resolved = resolved?;
        session.memo.insert(key.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn resolve_mapped(
        &self,
        key: &str,
        context: &dyn Context,
        session: &mut Session,
        depth: usize,
    ) -> Result<KeyNode> {
        let Some(root_id) = self.keys.get(key)? else {
            tracing::debug!(key, "key not mapped");
            return Ok(KeyNode::empty(key));
        };
        let Some(root) = self.knots.get(&root_id)? else {
            tracing::warn!(key, knot_id = %root_id, "key maps to a missing knot");
            return Ok(KeyNode::empty(key));
        };
        let Some((knot, path)) = self.descend(root, context)? else {
            return Ok(KeyNode::empty(key));
        };

        let node = match &knot.data {
            KnotData::Valued(value) => Node::Value {
                id: knot.id.clone(),
                version: knot.version,
                value: value.clone(),
            },
            KnotData::Multi(keys) => {
                let mut children = Vec::with_capacity(keys.len());
                for child in keys {
                    children.push(self.resolve_key(child, context, session, depth + 1)?);
                }
                Node::List {
                    id: knot.id.clone(),
                    version: knot.version,
                    children,
                }
            }
            KnotData::Map(entries) => {
                let mut children = BTreeMap::new();
                for (name, child) in entries {
                    let resolved = self.resolve_key(child, context, session, depth + 1)?;
                    children.insert(name.clone(), resolved);
                }
                Node::Map {
                    id: knot.id.clone(),
                    version: knot.version,
                    children,
                }
            }
        };

        Ok(KeyNode {
            key: key.to_string(),
            node: Some(node),
            path,
        })
    }

    /// Follow matching edges until none match; `None` if a knot repeats
    fn descend(&self, root: Knot, context: &dyn Context) -> Result<Option<(Knot, Vec<usize>)>> {
        let mut knot = root;
        let mut path = Vec::new();
        let mut seen: HashSet<String> = HashSet::from([knot.id.clone()]);

        while path.len() < self.max_depth {
            let Some((index, edge)) = select_edge(self.edges, &self.filters, &knot, context)? else {
                break;
            };
            if !seen.insert(edge.target.clone()) {
                tracing::warn!(
                    knot_id = %edge.target,
                    trace_id = %context.trace_id(),
                    "knot revisited during descent"
                );
                return Ok(None);
            }
            let Some(next) = self.knots.get(&edge.target)? else {
                tracing::warn!(edge_id = edge.id(), target = %edge.target, "edge targets a missing knot");
                break;
            };
            path.push(index);
            knot = next;
        }
        Ok(Some((knot, path)))
    }
}
