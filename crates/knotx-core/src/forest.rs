//! Public operation surface over a key store, knot store and edge store
//!
//! Every mutating operation is bracketed by `log_op_start!` and exactly one
//! of `log_op_end!`/`log_op_error!`, with the elapsed time in `duration_ms`.
//! All validation runs before the first store write.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use crate::config::ForestConfig;
use crate::delta::{calculate_delta_operations, DeltaEngine, DeltaMode};
use crate::errors::{KnotXError, Result};
use crate::eval::{flatten, Evaluator, FlatTree};
use crate::filter::{Context, Filter};
use crate::model::{
    DeltaOperation, Edge, EdgeIdentifier, KeyNode, Knot, KnotData, KnotId, Properties, TreeKnot,
};
use crate::rules::constraints::{
    check_version, validate_edge, validate_edge_count, validate_pivots,
};
use crate::rules::{CycleDetector, StoreGraph};
use crate::snapshot::{load_tree, persist_snapshot, validate_snapshot};
use crate::store::{
    EdgeStore, KeyTreeStore, KnotStore, MemoryEdgeStore, MemoryKeyTreeStore, MemoryKnotStore,
};
use crate::{log_op_end, log_op_error, log_op_start};

/// Where a new variation points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariationTarget {
    Existing { knot_id: KnotId },
    New { data: KnotData, properties: Properties },
}

/// Authoring-time edge plus its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub priority: i32,
    pub filters: Vec<Filter>,
    pub percentage: u8,
    pub live: bool,
    pub properties: Properties,
    pub target: VariationTarget,
}

impl Variation {
    /// Live, 100%, unfiltered, priority 0
    pub fn new(target: VariationTarget) -> Self {
        Self {
            priority: 0,
            filters: Vec::new(),
            percentage: 100,
            live: true,
            properties: Properties::new(),
            target,
        }
    }

    /// Variation onto a fresh knot holding `data`
    pub fn onto_new(data: KnotData) -> Self {
        Self::new(VariationTarget::New {
            data,
            properties: Properties::new(),
        })
    }

    pub fn onto_existing(knot_id: impl Into<KnotId>) -> Self {
        Self::new(VariationTarget::Existing {
            knot_id: knot_id.into(),
        })
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_percentage(mut self, percentage: u8) -> Self {
        self.percentage = percentage;
        self
    }
}

/// A forest of knots and edges behind three stores
pub struct Forest<K, N, E> {
    keys: K,
    knots: N,
    edges: E,
    config: ForestConfig,
}

pub type MemoryForest = Forest<MemoryKeyTreeStore, MemoryKnotStore, MemoryEdgeStore>;

impl MemoryForest {
    pub fn in_memory(config: ForestConfig) -> Self {
        Forest::new(
            MemoryKeyTreeStore::new(),
            MemoryKnotStore::new(),
            MemoryEdgeStore::new(),
            config,
        )
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

impl<K, N, E> Forest<K, N, E>
where
    K: KeyTreeStore,
    N: KnotStore,
    E: EdgeStore,
{
    pub fn new(keys: K, knots: N, edges: E, config: ForestConfig) -> Self {
        Self {
            keys,
            knots,
            edges,
            config,
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn key_store(&self) -> &K {
        &self.keys
    }

    pub fn knot_store(&self) -> &N {
        &self.knots
    }

    pub fn edge_store(&self) -> &E {
        &self.edges
    }

    pub fn into_stores(self) -> (K, N, E) {
        (self.keys, self.knots, self.edges)
    }

    fn graph(&self) -> StoreGraph<'_> {
        StoreGraph::new(&self.keys, &self.knots, &self.edges)
    }

    // ===== Knots =====

    pub fn contains_knot(&self, id: &str) -> Result<bool> {
        self.knots.contains(id)
    }

    pub fn get_knot(&self, id: &str) -> Result<Option<Knot>> {
        self.knots.get(id)
    }

    /// Create a knot under a generated id
    pub fn create_knot(&mut self, data: KnotData, properties: Properties) -> Result<Knot> {
        log_op_start!("create_knot");
        let start = Instant::now();

        let knot = Knot::new(self.config.ids.next_id(), data).with_properties(properties);
        let result = self.insert_knot_impl(knot).map_err(|e| {
            log_op_error!("create_knot", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!(
            "create_knot",
            duration_ms = elapsed_ms(start),
            knot_id = %result.id
        );
        Ok(result)
    }

    /// Insert a pre-populated knot; its listed edges must already exist
    pub fn insert_knot(&mut self, knot: Knot) -> Result<Knot> {
        log_op_start!("insert_knot", knot_id = %knot.id);
        let start = Instant::now();

        let result = self.insert_knot_impl(knot).map_err(|e| {
            log_op_error!("insert_knot", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!("insert_knot", duration_ms = elapsed_ms(start));
        Ok(result)
    }

    fn insert_knot_impl(&mut self, mut knot: Knot) -> Result<Knot> {
        if knot.id.is_empty() {
            return Err(KnotXError::invalid("knot id must not be empty"));
        }
        if self.knots.contains(&knot.id)? {
            return Err(KnotXError::invalid(format!("knot {} already exists", knot.id)));
        }
        self.validate_knot(&knot)?;
        knot.version = 0;
        self.knots.put(knot.clone())?;
        Ok(knot)
    }

    /// Replace a knot; `version` must match the stored one or be unconditional
    pub fn update_knot(&mut self, knot: Knot) -> Result<Knot> {
        log_op_start!("update_knot", knot_id = %knot.id);
        let start = Instant::now();

        let result = self.update_knot_impl(knot).map_err(|e| {
            log_op_error!("update_knot", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!(
            "update_knot",
            duration_ms = elapsed_ms(start),
            version = result.version
        );
        Ok(result)
    }

    fn update_knot_impl(&mut self, mut knot: Knot) -> Result<Knot> {
        let stored = self
            .knots
            .get(&knot.id)?
            .ok_or_else(|| KnotXError::KnotNotFound {
                knot_id: knot.id.clone(),
            })?;
        check_version(&knot.id, knot.version, stored.version)?;
        self.validate_knot(&knot)?;
        knot.version = stored.version + 1;
        self.knots.put(knot.clone())?;
        Ok(knot)
    }

    fn validate_knot(&self, knot: &Knot) -> Result<()> {
        let settings = &self.config.settings;
        validate_edge_count(settings, &knot.id, knot.edges.len())?;

        let records = self.edges.get_all(&knot.edges.ids())?;
        let mut siblings = Vec::with_capacity(records.len());
        for (identifier, record) in knot.edges.iter().zip(records) {
            siblings.push(record.ok_or_else(|| KnotXError::EdgeNotFound {
                edge_id: identifier.id.clone(),
            })?);
        }
        validate_pivots(
            settings,
            &knot.id,
            siblings.iter().map(|edge| edge.filters.as_slice()),
        )?;

        let graph = self.graph().with_knot(knot);
        CycleDetector::check(&knot.id, &graph)
    }

    /// Delete a knot and its edge records; `recursive` also deletes targets
    ///
    /// Returns the number of records removed.
    pub fn delete_knot(&mut self, id: &str, recursive: bool) -> Result<usize> {
        log_op_start!("delete_knot", knot_id = id, recursive = recursive);
        let start = Instant::now();

        let result = self.delete_knot_impl(id, recursive).map_err(|e| {
            log_op_error!("delete_knot", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!("delete_knot", duration_ms = elapsed_ms(start), removed = result);
        Ok(result)
    }

    fn delete_knot_impl(&mut self, id: &str, recursive: bool) -> Result<usize> {
        let knot = self
            .knots
            .get(id)?
            .ok_or_else(|| KnotXError::KnotNotFound {
                knot_id: id.to_string(),
            })?;
        if recursive {
            return self.delete_subtree(id, &mut HashSet::new());
        }
        let mut removed = 0;
        for identifier in &knot.edges {
            if self.edges.remove(&identifier.id)? {
                removed += 1;
            }
        }
        if self.knots.remove(id)? {
            removed += 1;
        }
        Ok(removed)
    }

    fn delete_subtree(&mut self, id: &str, visited: &mut HashSet<KnotId>) -> Result<usize> {
        if !visited.insert(id.to_string()) {
            return Ok(0);
        }
        let Some(knot) = self.knots.get(id)? else {
            return Ok(0);
        };
        let mut removed = 0;
        for identifier in &knot.edges {
            if let Some(edge) = self.edges.get(&identifier.id)? {
                self.edges.remove(&identifier.id)?;
                removed += 1 + self.delete_subtree(&edge.target, visited)?;
            }
        }
        if self.knots.remove(id)? {
            removed += 1;
        }
        Ok(removed)
    }

    // ===== Edges =====

    pub fn contains_edge(&self, id: &str) -> Result<bool> {
        self.edges.contains(id)
    }

    pub fn get_edge(&self, id: &str) -> Result<Option<Edge>> {
        self.edges.get(id)
    }

    /// Bulk fetch, positionally aligned with `ids`
    pub fn get_edges(&self, ids: &[String]) -> Result<Vec<Option<Edge>>> {
        self.edges.get_all(ids)
    }

    /// Replace an edge; the owning knot is found by a parent scan
    pub fn update_edge(&mut self, edge: Edge) -> Result<Edge> {
        log_op_start!("update_edge", edge_id = edge.id());
        let start = Instant::now();

        let result = self.update_edge_impl(None, edge).map_err(|e| {
            log_op_error!("update_edge", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!(
            "update_edge",
            duration_ms = elapsed_ms(start),
            version = result.version
        );
        Ok(result)
    }

    /// Replace an edge known to hang off `knot_id`
    pub fn update_variation(&mut self, knot_id: &str, edge: Edge) -> Result<Edge> {
        log_op_start!("update_variation", knot_id = knot_id, edge_id = edge.id());
        let start = Instant::now();

        let result = self.update_edge_impl(Some(knot_id), edge).map_err(|e| {
            log_op_error!("update_variation", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!(
            "update_variation",
            duration_ms = elapsed_ms(start),
            version = result.version
        );
        Ok(result)
    }

    fn update_edge_impl(&mut self, knot_id: Option<&str>, mut edge: Edge) -> Result<Edge> {
        let settings = &self.config.settings;
        let stored = self
            .edges
            .get(edge.id())?
            .ok_or_else(|| KnotXError::EdgeNotFound {
                edge_id: edge.id().to_string(),
            })?;
        check_version(edge.id(), edge.version, stored.version)?;

        let mut owner = match knot_id {
            Some(id) => {
                let owner = self
                    .knots
                    .get(id)?
                    .ok_or_else(|| KnotXError::KnotNotFound {
                        knot_id: id.to_string(),
                    })?;
                if !owner.edges.contains(edge.id()) {
                    return Err(KnotXError::EdgeNotFound {
                        edge_id: edge.id().to_string(),
                    });
                }
                owner
            }
            None => self.knots.owner_of(edge.id())?.ok_or_else(|| {
                KnotXError::invalid(format!("edge {} is not attached to any knot", edge.id()))
            })?,
        };

        validate_edge(settings, &edge)?;
        if !self.knots.contains(&edge.target)? {
            return Err(KnotXError::KnotNotFound {
                knot_id: edge.target.clone(),
            });
        }

        // a priority change re-enters the order behind its new equals
        let previous = owner.edges.get(edge.id()).cloned();
        let reordered = previous.as_ref().map(|p| p.priority) != Some(edge.identifier.priority);
        let sequence = match previous {
            Some(p) if !reordered => p.sequence,
            _ => 0,
        };
        edge.identifier.sequence = owner.edges.insert(EdgeIdentifier {
            sequence,
            ..edge.identifier.clone()
        });

        let ids = owner.edges.ids();
        let records = self.edges.get_all(&ids)?;
        let siblings: Vec<Edge> = ids
            .iter()
            .zip(records)
            .filter_map(|(id, record)| {
                if id == edge.id() {
                    Some(edge.clone())
                } else {
                    record
                }
            })
            .collect();
        validate_pivots(
            settings,
            &owner.id,
            siblings.iter().map(|e| e.filters.as_slice()),
        )?;

        CycleDetector::check(&owner.id, &self.graph().with_knot(&owner).with_edge(&edge))?;

        edge.version = stored.version + 1;
        self.edges.put(edge.clone())?;
        if reordered {
            owner.version += 1;
            self.knots.put(owner)?;
        }
        Ok(edge)
    }

    /// Detach an edge from its owner and delete the record
    pub fn delete_edge(&mut self, edge_id: &str) -> Result<Edge> {
        log_op_start!("delete_edge", edge_id = edge_id);
        let start = Instant::now();

        let result = self.delete_edge_impl(edge_id).map_err(|e| {
            log_op_error!("delete_edge", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!("delete_edge", duration_ms = elapsed_ms(start));
        Ok(result)
    }

    fn delete_edge_impl(&mut self, edge_id: &str) -> Result<Edge> {
        let edge = self
            .edges
            .get(edge_id)?
            .ok_or_else(|| KnotXError::EdgeNotFound {
                edge_id: edge_id.to_string(),
            })?;
        if let Some(mut owner) = self.knots.owner_of(edge_id)? {
            owner.edges.remove(edge_id);
            owner.version += 1;
            self.knots.put(owner)?;
        }
        self.edges.remove(edge_id)?;
        Ok(edge)
    }

    /// Attach a new prioritized edge to `knot_id`
    ///
    /// Returns the stored edge, carrying its assigned id and sequence.
    pub fn add_variation(&mut self, knot_id: &str, variation: Variation) -> Result<Edge> {
        log_op_start!("add_variation", knot_id = knot_id);
        let start = Instant::now();

        let result = self.add_variation_impl(knot_id, variation).map_err(|e| {
            log_op_error!("add_variation", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!(
            "add_variation",
            duration_ms = elapsed_ms(start),
            edge_id = result.id(),
            target = %result.target
        );
        Ok(result)
    }

    fn add_variation_impl(&mut self, knot_id: &str, variation: Variation) -> Result<Edge> {
        let settings = &self.config.settings;
        let mut owner = self
            .knots
            .get(knot_id)?
            .ok_or_else(|| KnotXError::KnotNotFound {
                knot_id: knot_id.to_string(),
            })?;
        validate_edge_count(settings, knot_id, owner.edges.len() + 1)?;

        let (target_id, new_target) = match variation.target {
            VariationTarget::Existing { knot_id: target } => {
                if !self.knots.contains(&target)? {
                    return Err(KnotXError::KnotNotFound { knot_id: target });
                }
                (target, None)
            }
            VariationTarget::New { data, properties } => {
                let knot = Knot::new(self.config.ids.next_id(), data).with_properties(properties);
                (knot.id.clone(), Some(knot))
            }
        };

        let mut edge = Edge {
            identifier: EdgeIdentifier::new(self.config.ids.next_id(), variation.priority),
            target: target_id,
            filters: variation.filters,
            live: variation.live,
            percentage: variation.percentage,
            properties: variation.properties,
            version: 0,
        };
        validate_edge(settings, &edge)?;
        edge.identifier.sequence = owner.edges.insert(edge.identifier.clone());

        let records = self.edges.get_all(&owner.edges.ids())?;
        let siblings: Vec<Edge> = owner
            .edges
            .iter()
            .zip(records)
            .filter_map(|(identifier, record)| {
                if identifier.id == edge.identifier.id {
                    Some(edge.clone())
                } else {
                    record
                }
            })
            .collect();
        validate_pivots(
            settings,
            knot_id,
            siblings.iter().map(|e| e.filters.as_slice()),
        )?;

        {
            let mut graph = self.graph().with_knot(&owner).with_edge(&edge);
            if let Some(target) = &new_target {
                graph = graph.with_knot(target);
            }
            CycleDetector::check(knot_id, &graph)?;
        }

        if let Some(target) = new_target {
            self.knots.put(target)?;
        }
        self.edges.put(edge.clone())?;
        owner.version += 1;
        self.knots.put(owner)?;
        Ok(edge)
    }

    /// Detach an edge and delete its record, keeping the target knot
    pub fn unlink_variation(&mut self, knot_id: &str, edge_id: &str) -> Result<Edge> {
        log_op_start!("unlink_variation", knot_id = knot_id, edge_id = edge_id);
        let start = Instant::now();

        let result = self.unlink_variation_impl(knot_id, edge_id).map_err(|e| {
            log_op_error!("unlink_variation", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!("unlink_variation", duration_ms = elapsed_ms(start));
        Ok(result)
    }

    fn unlink_variation_impl(&mut self, knot_id: &str, edge_id: &str) -> Result<Edge> {
        let mut owner = self
            .knots
            .get(knot_id)?
            .ok_or_else(|| KnotXError::KnotNotFound {
                knot_id: knot_id.to_string(),
            })?;
        let missing = || KnotXError::EdgeNotFound {
            edge_id: edge_id.to_string(),
        };
        let edge = self.edges.get(edge_id)?.ok_or_else(missing)?;
        owner.edges.remove(edge_id).ok_or_else(missing)?;

        self.edges.remove(edge_id)?;
        owner.version += 1;
        self.knots.put(owner)?;
        Ok(edge)
    }

    /// Detach an edge and delete it together with its target subtree
    pub fn delete_variation(&mut self, knot_id: &str, edge_id: &str) -> Result<Edge> {
        log_op_start!("delete_variation", knot_id = knot_id, edge_id = edge_id);
        let start = Instant::now();

        let result = self
            .unlink_variation_impl(knot_id, edge_id)
            .and_then(|edge| {
                self.delete_subtree(&edge.target, &mut HashSet::new())?;
                Ok(edge)
            })
            .map_err(|e| {
                log_op_error!("delete_variation", e.clone(), duration_ms = elapsed_ms(start));
                e
            })?;

        log_op_end!("delete_variation", duration_ms = elapsed_ms(start));
        Ok(result)
    }

    // ===== Keys =====

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        self.keys.contains(key)
    }

    pub fn get_key(&self, key: &str) -> Result<Option<KnotId>> {
        self.keys.get(key)
    }

    /// Map `key` onto an existing knot
    pub fn map_key(&mut self, key: &str, knot_id: &str) -> Result<()> {
        log_op_start!("map_key", key = key, knot_id = knot_id);
        let start = Instant::now();

        self.map_key_impl(key, knot_id).map_err(|e| {
            log_op_error!("map_key", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!("map_key", duration_ms = elapsed_ms(start));
        Ok(())
    }

    fn map_key_impl(&mut self, key: &str, knot_id: &str) -> Result<()> {
        if key.is_empty() {
            return Err(KnotXError::invalid("key must not be empty"));
        }
        if !self.knots.contains(knot_id)? {
            return Err(KnotXError::KnotNotFound {
                knot_id: knot_id.to_string(),
            });
        }
        CycleDetector::check(knot_id, &self.graph().with_key(key, Some(knot_id)))?;
        self.keys.put(key, knot_id)
    }

    pub fn unmap_key(&mut self, key: &str) -> Result<bool> {
        log_op_start!("unmap_key", key = key);
        let start = Instant::now();

        let result = self.keys.remove(key).map_err(|e| {
            log_op_error!("unmap_key", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!("unmap_key", duration_ms = elapsed_ms(start), removed = result);
        Ok(result)
    }

    // ===== Trees =====

    pub fn get_complete_tree(&self, key: &str) -> Result<Option<TreeKnot>> {
        load_tree(&self.keys, &self.knots, &self.edges, key)
    }

    /// Import a complete snapshot under `key`
    ///
    /// Changed records are written with a version bump. Records of the
    /// previous tree that the snapshot no longer contains are removed unless
    /// another key still maps to or reaches them.
    pub fn create_complete_tree(&mut self, key: &str, tree: &TreeKnot) -> Result<TreeKnot> {
        log_op_start!("create_complete_tree", key = key, knot_id = %tree.id);
        let start = Instant::now();

        let result = self.create_complete_tree_impl(key, tree, &[]).map_err(|e| {
            log_op_error!("create_complete_tree", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!("create_complete_tree", duration_ms = elapsed_ms(start));
        Ok(result)
    }

    fn create_complete_tree_impl(
        &mut self,
        key: &str,
        tree: &TreeKnot,
        detached: &[TreeKnot],
    ) -> Result<TreeKnot> {
        validate_snapshot(
            &self.config.settings,
            &self.keys,
            &self.knots,
            &self.edges,
            key,
            tree,
        )?;
        let previous = self.get_complete_tree(key)?;
        let summary = persist_snapshot(
            &mut self.keys,
            &mut self.knots,
            &mut self.edges,
            key,
            tree,
            previous.as_ref(),
            detached,
        )?;
        tracing::debug!(
            key,
            written = summary.written,
            pruned = summary.pruned,
            "snapshot persisted"
        );
        self.get_complete_tree(key)?
            .ok_or_else(|| KnotXError::Internal {
                message: format!("tree for {} vanished after persisting", key),
            })
    }

    /// Dry-run `operations`; returns the would-be tree and its revert list
    pub fn get_complete_tree_with_delta_operations(
        &self,
        key: &str,
        operations: Vec<DeltaOperation>,
    ) -> Result<(Option<TreeKnot>, Vec<DeltaOperation>)> {
        log_op_start!(
            "preview_delta",
            key = key,
            op_count = operations.len()
        );
        let start = Instant::now();

        let result = self
            .run_delta(key, operations, DeltaMode::Preview)
            .map(|(tree, reverts, _)| (tree, reverts))
            .map_err(|e| {
                log_op_error!("preview_delta", e.clone(), duration_ms = elapsed_ms(start));
                e
            })?;

        log_op_end!(
            "preview_delta",
            duration_ms = elapsed_ms(start),
            revert_count = result.1.len()
        );
        Ok(result)
    }

    /// Apply `operations` and persist the resulting tree
    pub fn apply_delta_operations(
        &mut self,
        key: &str,
        operations: Vec<DeltaOperation>,
    ) -> Result<Option<TreeKnot>> {
        log_op_start!(
            "apply_delta",
            key = key,
            op_count = operations.len()
        );
        let start = Instant::now();

        let result = self
            .run_delta(key, operations, DeltaMode::Commit)
            .and_then(|(tree, _, detached)| match tree {
                Some(tree) => self.create_complete_tree_impl(key, &tree, &detached).map(Some),
                None => Ok(None),
            })
            .map_err(|e| {
                log_op_error!("apply_delta", e.clone(), duration_ms = elapsed_ms(start));
                e
            })?;

        log_op_end!("apply_delta", duration_ms = elapsed_ms(start));
        Ok(result)
    }

    fn run_delta(
        &self,
        key: &str,
        operations: Vec<DeltaOperation>,
        mode: DeltaMode,
    ) -> Result<(Option<TreeKnot>, Vec<DeltaOperation>, Vec<TreeKnot>)> {
        let mut engine = DeltaEngine::begin(
            key,
            &self.keys,
            &self.knots,
            &self.edges,
            &self.config.settings,
            mode,
        )?;
        engine.apply_all(operations)?;
        let detached = engine.detached();
        let (tree, reverts) = engine.finish();
        Ok((tree, reverts, detached))
    }

    /// Operations that would make the persisted tree of `key` equal `target`
    pub fn calculate_delta_operations(
        &self,
        key: &str,
        target: &TreeKnot,
    ) -> Result<Vec<DeltaOperation>> {
        calculate_delta_operations(&self.keys, &self.knots, &self.edges, key, target)
    }

    // ===== Evaluation =====

    /// Resolve `key` for `context`; unmapped keys give an empty node
    pub fn evaluate(&self, key: &str, context: &dyn Context) -> Result<KeyNode> {
        Evaluator::new(
            &self.keys,
            &self.knots,
            &self.edges,
            self.config.filter_evaluator(),
            self.config.settings.max_depth,
        )
        .evaluate(key, context)
    }

    pub fn evaluate_flat(&self, key: &str, context: &dyn Context) -> Result<FlatTree> {
        Ok(flatten(&self.evaluate(key, context)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::JsonContext;
    use crate::model::UNCONDITIONAL_VERSION;
    use crate::ids::SequentialIdGenerator;
    use serde_json::json;
    use std::sync::Arc;

    fn forest() -> MemoryForest {
        MemoryForest::in_memory(
            ForestConfig::default().with_id_generator(Arc::new(SequentialIdGenerator::new("id"))),
        )
    }

    #[test]
    fn test_update_knot_version_check() {
        let mut forest = forest();
        let knot = forest
            .create_knot(KnotData::valued("base"), Properties::new())
            .unwrap();
        assert_eq!(knot.version, 0);

        let mut stale = knot.clone();
        stale.version = 7;
        assert!(matches!(
            forest.update_knot(stale),
            Err(KnotXError::VersionConflict { expected: 7, actual: 0, .. })
        ));

        let mut blind = knot.clone();
        blind.version = UNCONDITIONAL_VERSION;
        blind.data = KnotData::valued("changed");
        assert_eq!(forest.update_knot(blind).unwrap().version, 1);
    }

    #[test]
    fn test_insert_knot_requires_listed_edges() {
        let mut forest = forest();
        let mut knot = Knot::new("k", KnotData::valued("v"));
        knot.edges.insert(EdgeIdentifier::new("ghost", 0));
        assert!(matches!(
            forest.insert_knot(knot),
            Err(KnotXError::EdgeNotFound { .. })
        ));
        assert!(!forest.contains_knot("k").unwrap());
    }

    #[test]
    fn test_priority_change_reorders_owner() {
        let mut forest = forest();
        let root = forest
            .create_knot(KnotData::valued("base"), Properties::new())
            .unwrap();
        let first = forest
            .add_variation(&root.id, Variation::onto_new(KnotData::valued("one")))
            .unwrap();
        let second = forest
            .add_variation(&root.id, Variation::onto_new(KnotData::valued("two")))
            .unwrap();
        assert_eq!(
            forest.get_knot(&root.id).unwrap().unwrap().edges.ids(),
            vec![first.id().to_string(), second.id().to_string()]
        );

        let mut bumped = first.clone();
        bumped.identifier.priority = 5;
        forest.update_edge(bumped).unwrap();
        assert_eq!(
            forest.get_knot(&root.id).unwrap().unwrap().edges.ids(),
            vec![second.id().to_string(), first.id().to_string()]
        );

        // same priority keeps its place among equals
        let third = forest
            .add_variation(&root.id, Variation::onto_new(KnotData::valued("three")))
            .unwrap();
        let mut relabelled = second.clone();
        relabelled.identifier.sequence = 0;
        relabelled.live = false;
        forest.update_edge(relabelled).unwrap();
        assert_eq!(
            forest.get_knot(&root.id).unwrap().unwrap().edges.ids(),
            vec![
                second.id().to_string(),
                third.id().to_string(),
                first.id().to_string()
            ]
        );
    }

    #[test]
    fn test_unlink_keeps_target_delete_removes_it() {
        let mut forest = forest();
        let root = forest
            .create_knot(KnotData::valued("base"), Properties::new())
            .unwrap();
        let a = forest
            .add_variation(&root.id, Variation::onto_new(KnotData::valued("a")))
            .unwrap();
        let b = forest
            .add_variation(&root.id, Variation::onto_new(KnotData::valued("b")))
            .unwrap();

        forest.unlink_variation(&root.id, a.id()).unwrap();
        assert!(!forest.contains_edge(a.id()).unwrap());
        assert!(forest.contains_knot(&a.target).unwrap());

        forest.delete_variation(&root.id, b.id()).unwrap();
        assert!(!forest.contains_edge(b.id()).unwrap());
        assert!(!forest.contains_knot(&b.target).unwrap());
        assert!(!forest.get_knot(&root.id).unwrap().unwrap().has_edges());

        assert!(matches!(
            forest.unlink_variation(&root.id, "nope"),
            Err(KnotXError::EdgeNotFound { .. })
        ));
    }

    #[test]
    fn test_edge_surface() {
        let mut forest = forest();
        let root = forest
            .create_knot(KnotData::valued("base"), Properties::new())
            .unwrap();
        let edge = forest
            .add_variation(&root.id, Variation::onto_new(KnotData::valued("v")))
            .unwrap();

        let fetched = forest
            .get_edges(&[edge.id().to_string(), "absent".to_string()])
            .unwrap();
        assert_eq!(fetched[0].as_ref(), Some(&edge));
        assert!(fetched[1].is_none());

        let updated = forest
            .update_variation(&root.id, edge.clone().with_percentage(30))
            .unwrap();
        assert_eq!(updated.percentage, 30);
        assert!(matches!(
            forest.update_variation(&edge.target, updated.clone()),
            Err(KnotXError::EdgeNotFound { .. })
        ));

        forest.delete_edge(edge.id()).unwrap();
        assert!(!forest.contains_edge(edge.id()).unwrap());
        assert!(!forest.get_knot(&root.id).unwrap().unwrap().has_edges());
    }

    #[test]
    fn test_map_and_unmap_key() {
        let mut forest = forest();
        assert!(matches!(
            forest.map_key("k", "ghost"),
            Err(KnotXError::KnotNotFound { .. })
        ));
        let knot = forest
            .create_knot(KnotData::valued("v"), Properties::new())
            .unwrap();
        forest.map_key("k", &knot.id).unwrap();
        assert_eq!(forest.get_key("k").unwrap(), Some(knot.id.clone()));
        assert!(forest.unmap_key("k").unwrap());
        assert!(!forest.unmap_key("k").unwrap());
    }

    #[test]
    fn test_evaluate_flat() {
        let mut forest = forest();
        let root = forest
            .create_knot(KnotData::valued("base"), Properties::new())
            .unwrap();
        forest.map_key("greeting", &root.id).unwrap();
        let flat = forest
            .evaluate_flat("greeting", &JsonContext::new(json!({})))
            .unwrap();
        assert_eq!(flat.root_id.as_deref(), Some(root.id.as_str()));
        assert_eq!(flat.nodes.len(), 1);
    }
}
