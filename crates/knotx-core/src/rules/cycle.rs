//! Cycle detection over edge targets and key dereferences

use std::collections::HashMap;

use crate::errors::{KnotXError, Result};
use crate::model::{Edge, EdgeId, Knot, KnotId, TreeEdge, TreeKnot};
use crate::store::{EdgeStore, KeyTreeStore, KnotStore};

/// Outgoing neighbours of a knot in the reachability graph
///
/// Neighbours are edge targets plus the roots of keys a `Multi`/`Map` payload
/// names.
pub trait Successors {
    fn successors(&self, knot_id: &str) -> Result<Vec<KnotId>>;
}

/// Persisted graph seen through an overlay of uncommitted records
///
/// Overlay entries shadow the stores. A `None` overlay entry shadows the
/// stored record with "nothing here" (a placeholder or an unmapped key).
pub struct StoreGraph<'a> {
    keys: &'a dyn KeyTreeStore,
    knots: &'a dyn KnotStore,
    edges: &'a dyn EdgeStore,
    knot_overlay: HashMap<KnotId, Option<Knot>>,
    target_overlay: HashMap<EdgeId, Option<KnotId>>,
    key_overlay: HashMap<String, Option<KnotId>>,
}

impl<'a> StoreGraph<'a> {
    pub fn new(
        keys: &'a dyn KeyTreeStore,
        knots: &'a dyn KnotStore,
        edges: &'a dyn EdgeStore,
    ) -> Self {
        Self {
            keys,
            knots,
            edges,
            knot_overlay: HashMap::new(),
            target_overlay: HashMap::new(),
            key_overlay: HashMap::new(),
        }
    }

    pub fn with_knot(mut self, knot: &Knot) -> Self {
        self.knot_overlay.insert(knot.id.clone(), Some(knot.clone()));
        self
    }

    pub fn with_edge(mut self, edge: &Edge) -> Self {
        self.target_overlay
            .insert(edge.identifier.id.clone(), Some(edge.target.clone()));
        self
    }

    pub fn with_key(mut self, key: &str, knot_id: Option<&str>) -> Self {
        self.key_overlay
            .insert(key.to_string(), knot_id.map(str::to_string));
        self
    }

    /// Overlay every node of a snapshot; placeholders shadow with nothing
    pub fn with_tree(mut self, tree: &TreeKnot) -> Self {
        let mut knots = Vec::new();
        let mut targets = Vec::new();
        tree.walk(
            &mut |knot: &TreeKnot| knots.push((knot.id.clone(), knot.to_knot())),
            &mut |edge: &TreeEdge| {
                targets.push((
                    edge.edge_identifier.id.clone(),
                    edge.target().map(str::to_string),
                ))
            },
        );
        for (id, knot) in knots {
            // a repeated id keeps its first complete record
            let entry = self.knot_overlay.entry(id).or_insert(None);
            if entry.is_none() {
                *entry = knot;
            }
        }
        self.target_overlay.extend(targets);
        self
    }

    fn knot(&self, id: &str) -> Result<Option<Knot>> {
        match self.knot_overlay.get(id) {
            Some(overlaid) => Ok(overlaid.clone()),
            None => self.knots.get(id),
        }
    }

    fn target(&self, edge_id: &str) -> Result<Option<KnotId>> {
        match self.target_overlay.get(edge_id) {
            Some(overlaid) => Ok(overlaid.clone()),
            None => Ok(self.edges.get(edge_id)?.map(|edge| edge.target)),
        }
    }

    fn root(&self, key: &str) -> Result<Option<KnotId>> {
        match self.key_overlay.get(key) {
            Some(overlaid) => Ok(overlaid.clone()),
            None => self.keys.get(key),
        }
    }
}

impl Successors for StoreGraph<'_> {
    fn successors(&self, knot_id: &str) -> Result<Vec<KnotId>> {
        let Some(knot) = self.knot(knot_id)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for identifier in &knot.edges {
            if let Some(target) = self.target(&identifier.id)? {
                out.push(target);
            }
        }
        for key in knot.data.referenced_keys() {
            if let Some(root) = self.root(key)? {
                out.push(root);
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the active path
    Open,
    Done,
}

/// Rejects graphs where a knot can reach itself
pub struct CycleDetector;

impl CycleDetector {
    /// Depth-first search from `start` with an explicit stack
    ///
    /// Meeting an open node is a back-edge and fails; meeting a finished node
    /// is a shared sub-DAG and is allowed.
    ///
    /// # Errors
    ///
    /// `CycleDetected` naming the knot the back-edge points to, or any error
    /// the graph raises while fetching successors.
    pub fn check(start: &str, graph: &dyn Successors) -> Result<()> {
        let mut marks: HashMap<KnotId, Mark> = HashMap::new();
        let mut stack: Vec<(KnotId, std::vec::IntoIter<KnotId>)> = Vec::new();

        marks.insert(start.to_string(), Mark::Open);
        stack.push((start.to_string(), graph.successors(start)?.into_iter()));

        while let Some(frame) = stack.last_mut() {
            match frame.1.next() {
                Some(next) => match marks.get(&next) {
                    Some(Mark::Open) => {
                        return Err(KnotXError::CycleDetected { knot_id: next });
                    }
                    Some(Mark::Done) => {}
                    None => {
                        let successors = graph.successors(&next)?;
                        marks.insert(next.clone(), Mark::Open);
                        stack.push((next, successors.into_iter()));
                    }
                },
                None => {
                    if let Some((finished, _)) = stack.pop() {
                        marks.insert(finished, Mark::Done);
                    }
                }
            }
        }
        Ok(())
    }
}
