use std::collections::{HashMap, HashSet};

use crate::config::ForestSettings;
use crate::errors::{KnotXError, Result};
use crate::model::{
    DeltaOperation, Edge, EdgeId, EdgeIdentifier, Knot, KnotId, TreeEdge, TreeKnot,
    UNCONDITIONAL_VERSION,
};
use crate::rules::constraints::{
    check_version, validate_edge, validate_edge_count, validate_pivots,
};
use crate::rules::{CycleDetector, StoreGraph};
use crate::snapshot::{load_subtree, load_tree};
use crate::store::{EdgeStore, KeyTreeStore, KnotStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaMode {
    /// Dry run that records reverts
    Preview,
    /// Working tree only; the caller persists it
    Commit,
}

/// Stored record captured before a transaction overwrote or detached it
#[derive(Debug, Clone)]
enum Captured {
    Knot(KnotId),
    Edge(EdgeId),
}

/// Copy an operation edits
#[derive(Debug, Clone, Copy)]
enum Scope {
    Working,
    /// Index into `detached`
    Detached(usize),
}

/// Applies delta operations to a working copy of one key's tree
///
/// The engine never writes to the stores. Every operation is validated
/// against a candidate copy first and only then swapped in, so a failed
/// operation leaves the working tree as it was.
///
/// Subtrees unhooked from the working tree, and persisted records edited
/// while outside it, are kept as detached copies. The caller writes those
/// whose root is still reachable from elsewhere.
pub struct DeltaEngine<'a> {
    key: String,
    keys: &'a dyn KeyTreeStore,
    knots: &'a dyn KnotStore,
    edges: &'a dyn EdgeStore,
    settings: &'a ForestSettings,
    mode: DeltaMode,
    original: Option<TreeKnot>,
    tree: Option<TreeKnot>,
    /// Newest last
    detached: Vec<TreeKnot>,
    captured_knots: HashMap<KnotId, Knot>,
    captured_edges: HashMap<EdgeId, Edge>,
    capture_order: Vec<Captured>,
}

impl<'a> DeltaEngine<'a> {
    /// Start a transaction on the persisted tree of `key`
    pub fn begin(
        key: &str,
        keys: &'a dyn KeyTreeStore,
        knots: &'a dyn KnotStore,
        edges: &'a dyn EdgeStore,
        settings: &'a ForestSettings,
        mode: DeltaMode,
    ) -> Result<Self> {
        let original = load_tree(keys, knots, edges, key)?;
        Ok(Self {
            key: key.to_string(),
            keys,
            knots,
            edges,
            settings,
            mode,
            tree: original.clone(),
            original,
            detached: Vec::new(),
            captured_knots: HashMap::new(),
            captured_edges: HashMap::new(),
            capture_order: Vec::new(),
        })
    }

    pub fn tree(&self) -> Option<&TreeKnot> {
        self.tree.as_ref()
    }

    /// Detached copies whose root the working tree no longer holds
    pub fn detached(&self) -> Vec<TreeKnot> {
        self.detached
            .iter()
            .filter(|subtree| {
                self.tree
                    .as_ref()
                    .map_or(true, |tree| tree.find_knot(&subtree.id).is_none())
            })
            .cloned()
            .collect()
    }

    pub fn apply_all<I>(&mut self, operations: I) -> Result<()>
    where
        I: IntoIterator<Item = DeltaOperation>,
    {
        for operation in operations {
            self.apply(operation)?;
        }
        Ok(())
    }

    pub fn apply(&mut self, operation: DeltaOperation) -> Result<()> {
        tracing::trace!(key = %self.key, op = operation.kind(), id = operation.target_id(), "delta op");
        match operation {
            DeltaOperation::KeyMapping { key, knot_id } => self.map_root(&key, &knot_id),
            DeltaOperation::Knot(knot) => self.apply_knot(knot),
            DeltaOperation::Edge(edge) => self.apply_edge(edge),
        }
    }

    /// Working tree plus, in preview mode, the revert list
    ///
    /// Records the transaction pulled in from outside the original tree come
    /// first, in pre-order of the final tree, so replay edits them while they
    /// are still attached. A pre-order walk of the original tree follows,
    /// which locates every parent before its children. Anything left over
    /// comes last in capture order.
    pub fn finish(self) -> (Option<TreeKnot>, Vec<DeltaOperation>) {
        let mut reverts = Vec::new();
        let inside_knots: HashSet<KnotId> =
            self.original.iter().flat_map(TreeKnot::knot_ids).collect();
        let inside_edges: HashSet<EdgeId> =
            self.original.iter().flat_map(TreeKnot::edge_ids).collect();

        // records of the original tree are held back for the second walk
        let mut emitted_knots = inside_knots.clone();
        let mut emitted_edges = inside_edges.clone();
        if let Some(tree) = &self.tree {
            self.emit_in_order(
                tree,
                &mut HashSet::new(),
                &mut emitted_knots,
                &mut emitted_edges,
                &mut reverts,
            );
        }
        emitted_knots.retain(|id| !inside_knots.contains(id));
        emitted_edges.retain(|id| !inside_edges.contains(id));

        if let Some(original) = &self.original {
            self.emit_in_order(
                original,
                &mut HashSet::new(),
                &mut emitted_knots,
                &mut emitted_edges,
                &mut reverts,
            );
        }
        for captured in &self.capture_order {
            match captured {
                Captured::Knot(id) if emitted_knots.insert(id.clone()) => {
                    if let Some(knot) = self.captured_knots.get(id) {
                        reverts.push(DeltaOperation::Knot(knot.clone()).unconditional());
                    }
                }
                Captured::Edge(id) if emitted_edges.insert(id.clone()) => {
                    if let Some(edge) = self.captured_edges.get(id) {
                        reverts.push(DeltaOperation::Edge(edge.clone()).unconditional());
                    }
                }
                _ => {}
            }
        }
        (self.tree, reverts)
    }

    fn emit_in_order(
        &self,
        knot: &TreeKnot,
        visited: &mut HashSet<KnotId>,
        emitted_knots: &mut HashSet<KnotId>,
        emitted_edges: &mut HashSet<EdgeId>,
        reverts: &mut Vec<DeltaOperation>,
    ) {
        if !visited.insert(knot.id.clone()) {
            return;
        }
        if let Some(stored) = self.captured_knots.get(&knot.id) {
            if emitted_knots.insert(knot.id.clone()) {
                reverts.push(DeltaOperation::Knot(stored.clone()).unconditional());
            }
        }
        for edge in &knot.children {
            let id = &edge.edge_identifier.id;
            if let Some(stored) = self.captured_edges.get(id) {
                if emitted_edges.insert(id.clone()) {
                    reverts.push(DeltaOperation::Edge(stored.clone()).unconditional());
                }
            }
            if let Some(child) = edge.child.as_deref() {
                self.emit_in_order(child, visited, emitted_knots, emitted_edges, reverts);
            }
        }
    }

    fn map_root(&mut self, key: &str, knot_id: &str) -> Result<()> {
        if key != self.key {
            return Err(KnotXError::invalid(format!(
                "key mapping for {} inside a transaction on {}",
                key, self.key
            )));
        }
        if self.tree.is_some() {
            return Err(KnotXError::TreeAlreadyExists {
                key: key.to_string(),
            });
        }
        let candidate = self.resolve_knot(knot_id)?;
        self.check_cycles(Scope::Working, &candidate)?;
        self.tree = Some(candidate);
        Ok(())
    }

    fn apply_knot(&mut self, knot: Knot) -> Result<()> {
        validate_edge_count(self.settings, &knot.id, knot.edges.len())?;
        if knot.version != UNCONDITIONAL_VERSION {
            if let Some(stored) = self.knots.get(&knot.id)? {
                check_version(&knot.id, knot.version, stored.version)?;
            }
        }
        let missing = || KnotXError::TreeDoesNotExist {
            id: knot.id.clone(),
        };
        let scope = self.knot_scope(&knot.id)?;
        let tree = self.scope_tree(scope).ok_or_else(missing)?;
        let current = tree.find_knot(&knot.id).ok_or_else(missing)?;

        let mut children = Vec::with_capacity(knot.edges.len());
        for identifier in &knot.edges {
            children.push(self.resolve_edge(tree, identifier)?);
        }
        let dropped: Vec<TreeEdge> = current
            .children
            .iter()
            .filter(|edge| !knot.edges.contains(&edge.edge_identifier.id))
            .cloned()
            .collect();

        validate_pivots(
            self.settings,
            &knot.id,
            children
                .iter()
                .filter(|edge| !edge.is_placeholder())
                .map(|edge| edge.filters.as_slice()),
        )?;

        let mut candidate = tree.clone();
        candidate.update_knots(&knot.id, &mut |target: &mut TreeKnot| {
            target.knot_data = Some(knot.data.clone());
            target.version = knot.version;
            target.properties = knot.properties.clone();
            target.children = children.clone();
            target.sort_children();
        });
        self.check_cycles(scope, &candidate)?;

        if self.mode == DeltaMode::Preview {
            self.capture_knot(&knot.id)?;
            for edge in &dropped {
                self.capture_edge_subtree(&edge.edge_identifier.id, &mut HashSet::new())?;
            }
        }
        self.replace(scope, candidate);
        for edge in dropped {
            if let Some(child) = edge.child {
                self.detach(*child);
            }
        }
        Ok(())
    }

    fn apply_edge(&mut self, edge: Edge) -> Result<()> {
        validate_edge(self.settings, &edge)?;
        if edge.version != UNCONDITIONAL_VERSION {
            if let Some(stored) = self.edges.get(edge.id())? {
                check_version(edge.id(), edge.version, stored.version)?;
            }
        }
        let missing = || KnotXError::TreeDoesNotExist {
            id: edge.id().to_string(),
        };
        let scope = self.edge_scope(edge.id())?;
        let tree = self.scope_tree(scope).ok_or_else(missing)?;
        let current = tree.find_edge(edge.id()).ok_or_else(missing)?;
        let owner = tree.find_edge_owner(edge.id()).ok_or_else(missing)?;

        validate_pivots(
            self.settings,
            &owner.id,
            owner.children.iter().filter_map(|sibling| {
                if sibling.edge_identifier.id == edge.identifier.id {
                    Some(edge.filters.as_slice())
                } else if sibling.is_placeholder() {
                    None
                } else {
                    Some(sibling.filters.as_slice())
                }
            }),
        )?;

        let retargeted = current.target() != Some(edge.target.as_str());
        let previous_child = current.child.clone();
        let child = if retargeted {
            Some(Box::new(self.resolve_knot(&edge.target)?))
        } else {
            current.child.clone()
        };

        let mut candidate = tree.clone();
        candidate.update_edges(edge.id(), &mut |target: &mut TreeEdge| {
            let sequence = target.edge_identifier.sequence;
            target.overwrite_from(&edge);
            if edge.identifier.sequence == 0 {
                target.edge_identifier.sequence = sequence;
            }
            target.child = child.clone();
        });
        self.check_cycles(scope, &candidate)?;

        if self.mode == DeltaMode::Preview {
            self.capture_edge(edge.id())?;
            if let Some(old) = previous_child.as_deref().filter(|_| retargeted) {
                self.capture_knot_subtree(&old.id, &mut HashSet::new())?;
            }
        }
        self.replace(scope, candidate);
        if let Some(old) = previous_child.filter(|_| retargeted) {
            self.detach(*old);
        }
        Ok(())
    }

    /// Working tree, then detached copies newest first, then the stores
    fn knot_scope(&mut self, id: &str) -> Result<Scope> {
        let missing = || KnotXError::TreeDoesNotExist { id: id.to_string() };
        let tree = self.tree.as_ref().ok_or_else(missing)?;
        if tree.find_knot(id).is_some() {
            return Ok(Scope::Working);
        }
        if let Some(index) = self
            .detached
            .iter()
            .rposition(|subtree| subtree.find_knot(id).is_some())
        {
            return Ok(Scope::Detached(index));
        }
        let subtree = load_subtree(self.knots, self.edges, id)?.ok_or_else(missing)?;
        self.detached.push(subtree);
        Ok(Scope::Detached(self.detached.len() - 1))
    }

    fn edge_scope(&mut self, id: &str) -> Result<Scope> {
        let missing = || KnotXError::TreeDoesNotExist { id: id.to_string() };
        let tree = self.tree.as_ref().ok_or_else(missing)?;
        if tree.find_edge(id).is_some() {
            return Ok(Scope::Working);
        }
        if let Some(index) = self
            .detached
            .iter()
            .rposition(|subtree| subtree.find_edge(id).is_some())
        {
            return Ok(Scope::Detached(index));
        }
        let owner = self.knots.owner_of(id)?.ok_or_else(missing)?;
        let subtree = load_subtree(self.knots, self.edges, &owner.id)?.ok_or_else(missing)?;
        self.detached.push(subtree);
        Ok(Scope::Detached(self.detached.len() - 1))
    }

    fn scope_tree(&self, scope: Scope) -> Option<&TreeKnot> {
        match scope {
            Scope::Working => self.tree.as_ref(),
            Scope::Detached(index) => self.detached.get(index),
        }
    }

    fn replace(&mut self, scope: Scope, candidate: TreeKnot) {
        match scope {
            Scope::Working => self.tree = Some(candidate),
            Scope::Detached(index) => {
                if let Some(slot) = self.detached.get_mut(index) {
                    *slot = candidate;
                }
            }
        }
    }

    fn detach(&mut self, subtree: TreeKnot) {
        if subtree.is_placeholder() {
            return;
        }
        self.detached.retain(|kept| kept.id != subtree.id);
        self.detached.push(subtree);
    }

    /// Working copy of an edge, else its persisted subtree, else a placeholder
    fn resolve_edge(&self, tree: &TreeKnot, identifier: &EdgeIdentifier) -> Result<TreeEdge> {
        let working = tree
            .find_edge(&identifier.id)
            .or_else(|| self.working_copies().find_map(|t| t.find_edge(&identifier.id)));
        if let Some(working) = working {
            let mut kept = working.clone();
            kept.edge_identifier = identifier.clone();
            return Ok(kept);
        }
        match self.edges.get(&identifier.id)? {
            Some(mut stored) => {
                stored.identifier = identifier.clone();
                let child = match load_subtree(self.knots, self.edges, &stored.target)? {
                    Some(subtree) => subtree,
                    None => TreeKnot::placeholder(stored.target.clone()),
                };
                Ok(TreeEdge::from_edge(&stored, child))
            }
            None => Ok(TreeEdge::placeholder(identifier.clone())),
        }
    }

    /// Working copy of a knot, else its persisted subtree, else a placeholder
    fn resolve_knot(&self, knot_id: &str) -> Result<TreeKnot> {
        if let Some(working) = self.working_copies().find_map(|t| t.find_knot(knot_id)) {
            return Ok(working.clone());
        }
        Ok(load_subtree(self.knots, self.edges, knot_id)?
            .unwrap_or_else(|| TreeKnot::placeholder(knot_id)))
    }

    /// The working tree, then detached copies newest first
    fn working_copies(&self) -> impl Iterator<Item = &TreeKnot> + '_ {
        self.tree.iter().chain(self.detached.iter().rev())
    }

    fn check_cycles(&self, scope: Scope, candidate: &TreeKnot) -> Result<()> {
        match (scope, self.tree.as_ref()) {
            (Scope::Detached(_), Some(tree)) => CycleDetector::check(
                &candidate.id,
                &StoreGraph::new(self.keys, self.knots, self.edges)
                    .with_key(&self.key, Some(&tree.id))
                    .with_tree(tree)
                    .with_tree(candidate),
            ),
            _ => CycleDetector::check(
                &candidate.id,
                &StoreGraph::new(self.keys, self.knots, self.edges)
                    .with_key(&self.key, Some(&candidate.id))
                    .with_tree(candidate),
            ),
        }
    }

    fn capture_knot(&mut self, id: &str) -> Result<Option<Knot>> {
        if let Some(known) = self.captured_knots.get(id) {
            return Ok(Some(known.clone()));
        }
        let Some(stored) = self.knots.get(id)? else {
            return Ok(None);
        };
        self.captured_knots.insert(id.to_string(), stored.clone());
        self.capture_order.push(Captured::Knot(id.to_string()));
        Ok(Some(stored))
    }

    fn capture_edge(&mut self, id: &str) -> Result<Option<Edge>> {
        if let Some(known) = self.captured_edges.get(id) {
            return Ok(Some(known.clone()));
        }
        let Some(stored) = self.edges.get(id)? else {
            return Ok(None);
        };
        self.captured_edges.insert(id.to_string(), stored.clone());
        self.capture_order.push(Captured::Edge(id.to_string()));
        Ok(Some(stored))
    }

    /// Stored edge, then its stored target, then that target's edges
    fn capture_edge_subtree(&mut self, id: &str, visited: &mut HashSet<String>) -> Result<()> {
        if !visited.insert(format!("e:{}", id)) {
            return Ok(());
        }
        if let Some(edge) = self.capture_edge(id)? {
            self.capture_knot_subtree(&edge.target, visited)?;
        }
        Ok(())
    }

    fn capture_knot_subtree(&mut self, id: &str, visited: &mut HashSet<String>) -> Result<()> {
        if !visited.insert(format!("k:{}", id)) {
            return Ok(());
        }
        if let Some(knot) = self.capture_knot(id)? {
            for identifier in &knot.edges {
                self.capture_edge_subtree(&identifier.id, visited)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::model::{KnotData, UNCONDITIONAL_VERSION};
    use crate::store::{MemoryEdgeStore, MemoryKeyTreeStore, MemoryKnotStore};

    struct Stores {
        keys: MemoryKeyTreeStore,
        knots: MemoryKnotStore,
        edges: MemoryEdgeStore,
        settings: ForestSettings,
    }

    impl Stores {
        fn empty() -> Self {
            Self {
                keys: MemoryKeyTreeStore::new(),
                knots: MemoryKnotStore::new(),
                edges: MemoryEdgeStore::new(),
                settings: ForestSettings::default(),
            }
        }

        /// greeting -> a("base") --e1[lang=fr]--> b("bonjour")
        fn greeting() -> Self {
            let mut stores = Self::empty();
            let mut a = Knot::new("a", KnotData::valued("base"));
            a.edges.insert(EdgeIdentifier::new("e1", 0));
            stores.knots.put(a).unwrap();
            stores
                .knots
                .put(Knot::new("b", KnotData::valued("bonjour")))
                .unwrap();
            stores
                .edges
                .put(
                    Edge::new(EdgeIdentifier::new("e1", 0), "b")
                        .with_filter(Filter::equals("$.lang", "fr")),
                )
                .unwrap();
            stores.keys.put("greeting", "a").unwrap();
            stores
        }

        fn engine(&self, key: &str, mode: DeltaMode) -> DeltaEngine<'_> {
            DeltaEngine::begin(key, &self.keys, &self.knots, &self.edges, &self.settings, mode)
                .unwrap()
        }
    }

    #[test]
    fn test_key_mapping_only_on_missing_tree() {
        let stores = Stores::greeting();
        let mut engine = stores.engine("greeting", DeltaMode::Commit);
        let err = engine
            .apply(DeltaOperation::KeyMapping {
                key: "greeting".into(),
                knot_id: "a".into(),
            })
            .unwrap_err();
        assert!(matches!(err, KnotXError::TreeAlreadyExists { .. }));

        let mut fresh = stores.engine("fresh", DeltaMode::Commit);
        fresh
            .apply(DeltaOperation::KeyMapping {
                key: "fresh".into(),
                knot_id: "new-root".into(),
            })
            .unwrap();
        assert!(fresh.tree().map(TreeKnot::is_placeholder).unwrap_or(false));
    }

    #[test]
    fn test_ops_before_root_fail() {
        let stores = Stores::empty();
        let mut engine = stores.engine("fresh", DeltaMode::Commit);
        let err = engine
            .apply(DeltaOperation::Knot(Knot::new("x", KnotData::valued("v"))))
            .unwrap_err();
        assert_eq!(err, KnotXError::TreeDoesNotExist { id: "x".into() });
    }

    #[test]
    fn test_build_new_tree_from_ops() {
        let stores = Stores::empty();
        let mut engine = stores.engine("page", DeltaMode::Commit);

        let mut root = Knot::new("root", KnotData::valued("base"));
        root.edges.insert(EdgeIdentifier::new("e1", 0));
        engine
            .apply_all(vec![
                DeltaOperation::KeyMapping {
                    key: "page".into(),
                    knot_id: "root".into(),
                },
                DeltaOperation::Knot(root),
                DeltaOperation::Edge(Edge::new(EdgeIdentifier::new("e1", 0), "leaf")),
                DeltaOperation::Knot(Knot::new("leaf", KnotData::valued("leaf"))),
            ])
            .unwrap();

        let (tree, reverts) = engine.finish();
        let tree = tree.unwrap();
        assert!(reverts.is_empty());
        assert_eq!(tree.knot_ids(), vec!["root", "leaf"]);
        assert!(!tree.find_knot("leaf").unwrap().is_placeholder());
    }

    #[test]
    fn test_preview_captures_overwritten_and_dropped_records() {
        let stores = Stores::greeting();
        let mut engine = stores.engine("greeting", DeltaMode::Preview);

        // drop e1 (and with it b)
        engine
            .apply(DeltaOperation::Knot(Knot::new("a", KnotData::valued("hello"))))
            .unwrap();
        let (tree, reverts) = engine.finish();

        assert!(tree.unwrap().children.is_empty());
        let order: Vec<(&str, &str)> = reverts.iter().map(|op| (op.kind(), op.target_id())).collect();
        assert_eq!(order, vec![("knot", "a"), ("edge", "e1"), ("knot", "b")]);
        for op in &reverts {
            match op {
                DeltaOperation::Knot(knot) => assert_eq!(knot.version, UNCONDITIONAL_VERSION),
                DeltaOperation::Edge(edge) => assert_eq!(edge.version, UNCONDITIONAL_VERSION),
                DeltaOperation::KeyMapping { .. } => panic!("no key mapping expected"),
            }
        }
    }

    #[test]
    fn test_retarget_attaches_persisted_subtree_and_captures_old() {
        let mut stores = Stores::greeting();
        stores
            .knots
            .put(Knot::new("c", KnotData::valued("salut")))
            .unwrap();
        let mut engine = stores.engine("greeting", DeltaMode::Preview);

        let retarget = Edge::new(EdgeIdentifier::new("e1", 0), "c")
            .with_filter(Filter::equals("$.lang", "fr"));
        engine.apply(DeltaOperation::Edge(retarget)).unwrap();
        let (tree, reverts) = engine.finish();

        let tree = tree.unwrap();
        assert_eq!(tree.children[0].target(), Some("c"));
        assert!(!tree.children[0].child.as_ref().unwrap().is_placeholder());
        let ids: Vec<&str> = reverts.iter().map(DeltaOperation::target_id).collect();
        assert_eq!(ids, vec!["e1", "b"]);
    }

    #[test]
    fn test_failed_op_leaves_working_tree() {
        let mut stores = Stores::greeting();
        stores.settings.mutual_exclusivity = true;
        let mut engine = stores.engine("greeting", DeltaMode::Preview);
        let before = engine.tree().cloned();

        let mut a = Knot::new("a", KnotData::valued("base"));
        a.edges.insert(EdgeIdentifier::new("e1", 0));
        a.edges.insert(EdgeIdentifier::new("e2", 1));
        engine.apply(DeltaOperation::Knot(a)).unwrap();

        let country = Edge::new(EdgeIdentifier::new("e2", 1), "b")
            .with_filter(Filter::equals("$.country", "BE"));
        let err = engine.apply(DeltaOperation::Edge(country)).unwrap_err();
        assert!(matches!(err, KnotXError::EdgePivotConstraintViolation { .. }));
        assert!(engine.tree().unwrap().find_edge("e2").unwrap().is_placeholder());
        assert_ne!(engine.tree().cloned(), before);
    }

    #[test]
    fn test_cycle_through_edge_rejected() {
        let stores = Stores::greeting();
        let mut engine = stores.engine("greeting", DeltaMode::Commit);
        let mut b = Knot::new("b", KnotData::valued("bonjour"));
        b.edges.insert(EdgeIdentifier::new("back", 0));
        engine.apply(DeltaOperation::Knot(b)).unwrap();

        let back = Edge::new(EdgeIdentifier::new("back", 0), "a");
        let err = engine.apply(DeltaOperation::Edge(back)).unwrap_err();
        assert!(matches!(err, KnotXError::CycleDetected { .. }));
    }

    #[test]
    fn test_stale_versions_rejected() {
        let stores = Stores::greeting();
        let mut engine = stores.engine("greeting", DeltaMode::Commit);

        let mut a = Knot::new("a", KnotData::valued("hello"));
        a.version = 42;
        let err = engine.apply(DeltaOperation::Knot(a)).unwrap_err();
        assert_eq!(
            err,
            KnotXError::VersionConflict {
                id: "a".into(),
                expected: 42,
                actual: 0,
            }
        );

        let mut e1 = Edge::new(EdgeIdentifier::new("e1", 0), "b");
        e1.version = 3;
        let err = engine.apply(DeltaOperation::Edge(e1)).unwrap_err();
        assert!(matches!(err, KnotXError::VersionConflict { expected: 3, .. }));

        let blind = Knot::new("a", KnotData::valued("hello"));
        engine
            .apply(DeltaOperation::Knot(blind).unconditional())
            .unwrap();
    }

    #[test]
    fn test_edit_outside_working_tree_is_detached() {
        let mut stores = Stores::greeting();
        stores
            .knots
            .put(Knot::new("c", KnotData::valued("salut")))
            .unwrap();
        stores.keys.put("other", "c").unwrap();
        let mut engine = stores.engine("greeting", DeltaMode::Commit);

        engine
            .apply(DeltaOperation::Knot(Knot::new("c", KnotData::valued("hallo"))))
            .unwrap();

        assert!(engine.tree().unwrap().find_knot("c").is_none());
        let detached = engine.detached();
        assert_eq!(detached.len(), 1);
        assert_eq!(detached[0].knot_data, Some(KnotData::valued("hallo")));
    }

    #[test]
    fn test_reverts_lead_with_records_pulled_in_from_outside() {
        let mut stores = Stores::greeting();
        stores
            .knots
            .put(Knot::new("c", KnotData::valued("salut")))
            .unwrap();
        let mut engine = stores.engine("greeting", DeltaMode::Preview);

        let retarget = Edge::new(EdgeIdentifier::new("e1", 0), "c")
            .with_filter(Filter::equals("$.lang", "fr"));
        engine.apply(DeltaOperation::Edge(retarget)).unwrap();
        engine
            .apply(DeltaOperation::Knot(Knot::new("c", KnotData::valued("hallo"))))
            .unwrap();
        let (_, reverts) = engine.finish();

        let order: Vec<(&str, &str)> = reverts.iter().map(|op| (op.kind(), op.target_id())).collect();
        assert_eq!(order, vec![("knot", "c"), ("edge", "e1"), ("knot", "b")]);
    }
}
