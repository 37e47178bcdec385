//! Loading, validating and persisting [`TreeKnot`] snapshots

use std::collections::HashSet;

use crate::config::ForestSettings;
use crate::errors::{KnotXError, Result};
use crate::model::{Edge, Knot, KnotId, TreeEdge, TreeKnot};
use crate::rules::constraints::{validate_edge_count, validate_edge_parts, validate_pivots};
use crate::rules::{CycleDetector, StoreGraph};
use crate::store::{EdgeStore, KeyTreeStore, KnotStore};

/// Dereference a persisted knot and everything below it
///
/// Edge ids without a stored record are skipped; an edge whose target is
/// missing gets a placeholder child.
///
/// # Errors
///
/// `CycleDetected` if the persisted graph loops back onto the path being
/// loaded, or any store failure.
pub fn load_subtree(
    knots: &dyn KnotStore,
    edges: &dyn EdgeStore,
    knot_id: &str,
) -> Result<Option<TreeKnot>> {
    let Some(knot) = knots.get(knot_id)? else {
        return Ok(None);
    };
    let mut path = HashSet::new();
    build(knots, edges, knot, &mut path).map(Some)
}

fn build(
    knots: &dyn KnotStore,
    edges: &dyn EdgeStore,
    knot: Knot,
    path: &mut HashSet<KnotId>,
) -> Result<TreeKnot> {
    path.insert(knot.id.clone());
    let mut tree = TreeKnot::from_knot(&knot);
    let records = edges.get_all(&knot.edges.ids())?;
    for (identifier, record) in knot.edges.iter().zip(records) {
        let Some(mut edge) = record else {
            tracing::warn!(knot_id = %knot.id, edge_id = %identifier.id, "dangling edge id skipped");
            continue;
        };
        // the owning knot's identifier is authoritative for ordering
        edge.identifier = identifier.clone();
        if path.contains(&edge.target) {
            return Err(KnotXError::CycleDetected {
                knot_id: edge.target,
            });
        }
        let child = match knots.get(&edge.target)? {
            Some(target) => build(knots, edges, target, path)?,
            None => TreeKnot::placeholder(edge.target.clone()),
        };
        tree.children.push(TreeEdge::from_edge(&edge, child));
    }
    path.remove(&knot.id);
    Ok(tree)
}

/// Persisted tree rooted at `key`, if the key is mapped
pub fn load_tree(
    keys: &dyn KeyTreeStore,
    knots: &dyn KnotStore,
    edges: &dyn EdgeStore,
    key: &str,
) -> Result<Option<TreeKnot>> {
    match keys.get(key)? {
        Some(root) => load_subtree(knots, edges, &root),
        None => Ok(None),
    }
}

/// Reject snapshots that are incomplete or break a structural rule
///
/// Checks placeholders, limits, pivots and, with the snapshot overlaid on the
/// stores and `key` mapped to its root, cycles.
pub fn validate_snapshot(
    settings: &ForestSettings,
    keys: &dyn KeyTreeStore,
    knots: &dyn KnotStore,
    edges: &dyn EdgeStore,
    key: &str,
    tree: &TreeKnot,
) -> Result<()> {
    check_complete(settings, tree)?;
    let graph = StoreGraph::new(keys, knots, edges)
        .with_key(key, Some(&tree.id))
        .with_tree(tree);
    CycleDetector::check(&tree.id, &graph)
}

fn check_complete(settings: &ForestSettings, knot: &TreeKnot) -> Result<()> {
    if knot.is_placeholder() {
        return Err(KnotXError::invalid(format!(
            "knot {} has no data; the snapshot is incomplete",
            knot.id
        )));
    }
    validate_edge_count(settings, &knot.id, knot.children.len())?;
    validate_pivots(
        settings,
        &knot.id,
        knot.children.iter().map(|edge| edge.filters.as_slice()),
    )?;
    for edge in &knot.children {
        validate_edge_parts(
            settings,
            &edge.edge_identifier.id,
            &edge.filters,
            edge.percentage,
        )?;
        let child = edge.child.as_deref().ok_or_else(|| {
            KnotXError::invalid(format!(
                "edge {} has no target; the snapshot is incomplete",
                edge.edge_identifier.id
            ))
        })?;
        check_complete(settings, child)?;
    }
    Ok(())
}

/// Counts of records a [`persist_snapshot`] call touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub written: usize,
    pub pruned: usize,
}

/// Write a validated snapshot and map `key` to its root
///
/// New records start at version 0, changed records get the stored version
/// plus one, and unchanged records are left alone. Records of `previous`
/// that no longer occur in `tree` are removed, except where another key
/// still reaches them: a knot some other key maps to, or one that a
/// surviving edge targets, is kept along with everything below it.
///
/// `detached` holds subtrees a transaction edited after they left `tree`.
/// Those whose root is persisted and outlives the prune are written too;
/// nodes that also occur in `tree` are taken from `tree`.
pub fn persist_snapshot(
    keys: &mut dyn KeyTreeStore,
    knots: &mut dyn KnotStore,
    edges: &mut dyn EdgeStore,
    key: &str,
    tree: &TreeKnot,
    previous: Option<&TreeKnot>,
    detached: &[TreeKnot],
) -> Result<PersistSummary> {
    let mut knot_records = Vec::new();
    let mut edge_records = Vec::new();
    let mut knot_ids = HashSet::new();
    let mut edge_ids = HashSet::new();
    collect(tree, &mut knot_ids, &mut edge_ids, &mut knot_records, &mut edge_records);

    let (mut doomed_knots, mut doomed_edges) = match previous {
        Some(previous) => plan_prune(&*keys, &*edges, key, previous, &knot_ids, &edge_ids)?,
        None => (HashSet::new(), HashSet::new()),
    };

    let mut seen_knots = knot_ids.clone();
    let mut seen_edges = edge_ids.clone();
    for subtree in detached {
        if seen_knots.contains(&subtree.id)
            || doomed_knots.contains(&subtree.id)
            || !knots.contains(&subtree.id)?
        {
            continue;
        }
        check_attached(subtree)?;
        collect(
            subtree,
            &mut seen_knots,
            &mut seen_edges,
            &mut knot_records,
            &mut edge_records,
        );
    }
    doomed_knots.retain(|id| !seen_knots.contains(id));
    doomed_edges.retain(|id| !seen_edges.contains(id));

    let mut summary = PersistSummary::default();
    for record in edge_records {
        if write_edge(edges, record)? {
            summary.written += 1;
        }
    }
    for record in knot_records {
        if write_knot(knots, record)? {
            summary.written += 1;
        }
    }
    keys.put(key, &tree.id)?;

    for id in &doomed_edges {
        if edges.remove(id)? {
            summary.pruned += 1;
        }
    }
    for id in &doomed_knots {
        if knots.remove(id)? {
            summary.pruned += 1;
        }
    }
    Ok(summary)
}

/// Records of `previous` that `tree` dropped and nothing else reaches
fn plan_prune(
    keys: &dyn KeyTreeStore,
    edges: &dyn EdgeStore,
    key: &str,
    previous: &TreeKnot,
    knot_ids: &HashSet<KnotId>,
    edge_ids: &HashSet<String>,
) -> Result<(HashSet<KnotId>, HashSet<String>)> {
    let mut doomed_knots: HashSet<KnotId> = previous
        .knot_ids()
        .into_iter()
        .filter(|id| !knot_ids.contains(id))
        .collect();
    let mut doomed_edges: HashSet<String> = previous
        .edge_ids()
        .into_iter()
        .filter(|id| !edge_ids.contains(id))
        .collect();

    let mut spared = Vec::new();
    for id in &doomed_knots {
        let mapped = keys.keys_for(id)?.iter().any(|other| other != key);
        let targeted = edges
            .targeting(id)?
            .iter()
            .any(|edge| !doomed_edges.contains(edge) && !edge_ids.contains(edge));
        if mapped || targeted {
            spared.push(id.clone());
        }
    }
    while let Some(id) = spared.pop() {
        if !doomed_knots.remove(&id) {
            continue;
        }
        let Some(knot) = previous.find_knot(&id) else {
            continue;
        };
        for edge in &knot.children {
            doomed_edges.remove(&edge.edge_identifier.id);
            if let Some(target) = edge.target() {
                spared.push(target.to_string());
            }
        }
    }
    Ok((doomed_knots, doomed_edges))
}

fn check_attached(knot: &TreeKnot) -> Result<()> {
    if knot.is_placeholder() {
        return Err(KnotXError::invalid(format!(
            "detached knot {} has no data",
            knot.id
        )));
    }
    for edge in &knot.children {
        let child = edge.child.as_deref().ok_or_else(|| {
            KnotXError::invalid(format!(
                "detached edge {} has no target",
                edge.edge_identifier.id
            ))
        })?;
        check_attached(child)?;
    }
    Ok(())
}

fn collect(
    knot: &TreeKnot,
    knot_ids: &mut HashSet<KnotId>,
    edge_ids: &mut HashSet<String>,
    knot_records: &mut Vec<Knot>,
    edge_records: &mut Vec<Edge>,
) {
    if !knot_ids.insert(knot.id.clone()) {
        return;
    }
    knot_records.extend(knot.to_knot());
    for edge in &knot.children {
        if edge_ids.insert(edge.edge_identifier.id.clone()) {
            edge_records.extend(edge.to_edge());
        }
        if let Some(child) = edge.child.as_deref() {
            collect(child, knot_ids, edge_ids, knot_records, edge_records);
        }
    }
}

fn write_knot(knots: &mut dyn KnotStore, mut record: Knot) -> Result<bool> {
    match knots.get(&record.id)? {
        Some(stored) if stored.same_content(&record) => return Ok(false),
        Some(stored) => record.version = stored.version + 1,
        None => record.version = 0,
    }
    knots.put(record)?;
    Ok(true)
}

fn write_edge(edges: &mut dyn EdgeStore, mut record: Edge) -> Result<bool> {
    match edges.get(record.id())? {
        Some(stored) if stored.same_content(&record) => return Ok(false),
        Some(stored) => record.version = stored.version + 1,
        None => record.version = 0,
    }
    edges.put(record)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::model::{EdgeIdentifier, KnotData};
    use crate::store::{MemoryEdgeStore, MemoryKeyTreeStore, MemoryKnotStore};

    fn snapshot() -> TreeKnot {
        let leaf = TreeKnot::from_knot(&Knot::new("b", KnotData::valued("bonjour")));
        let edge = Edge::new(EdgeIdentifier::new("e1", 0), "b")
            .with_filter(Filter::equals("$.lang", "fr"));
        TreeKnot::from_knot(&Knot::new("a", KnotData::valued("base")))
            .with_child(TreeEdge::from_edge(&edge, leaf))
    }

    #[test]
    fn test_persist_then_load() {
        let mut keys = MemoryKeyTreeStore::new();
        let mut knots = MemoryKnotStore::new();
        let mut edges = MemoryEdgeStore::new();
        let tree = snapshot();

        validate_snapshot(&ForestSettings::default(), &keys, &knots, &edges, "greeting", &tree)
            .unwrap();
        let summary =
            persist_snapshot(&mut keys, &mut knots, &mut edges, "greeting", &tree, None, &[])
            .unwrap();
        assert_eq!(summary, PersistSummary { written: 3, pruned: 0 });

        let loaded = load_tree(&keys, &knots, &edges, "greeting").unwrap().unwrap();
        assert_eq!(loaded.strip_versions(), tree.strip_versions());

        // unchanged rewrite touches nothing
        let again = persist_snapshot(
            &mut keys,
            &mut knots,
            &mut edges,
            "greeting",
            &loaded,
            Some(&loaded),
            &[],
        )
        .unwrap();
        assert_eq!(again, PersistSummary::default());
    }

    #[test]
    fn test_changed_records_bump_and_absent_records_prune() {
        let mut keys = MemoryKeyTreeStore::new();
        let mut knots = MemoryKnotStore::new();
        let mut edges = MemoryEdgeStore::new();
        let tree = snapshot();
        persist_snapshot(&mut keys, &mut knots, &mut edges, "greeting", &tree, None, &[]).unwrap();

        let mut trimmed = tree.clone();
        trimmed.children.clear();
        trimmed.knot_data = Some(KnotData::valued("hello"));
        let summary = persist_snapshot(
            &mut keys,
            &mut knots,
            &mut edges,
            "greeting",
            &trimmed,
            Some(&tree),
            &[],
        )
        .unwrap();
        assert_eq!(summary, PersistSummary { written: 1, pruned: 2 });
        assert_eq!(knots.get("a").unwrap().map(|k| k.version), Some(1));
        assert!(!knots.contains("b").unwrap());
        assert!(!edges.contains("e1").unwrap());
    }

    #[test]
    fn test_incomplete_snapshot_rejected() {
        let keys = MemoryKeyTreeStore::new();
        let knots = MemoryKnotStore::new();
        let edges = MemoryEdgeStore::new();
        let tree = TreeKnot::from_knot(&Knot::new("a", KnotData::valued("base")))
            .with_child(TreeEdge::placeholder(EdgeIdentifier::new("e1", 0)));
        assert!(matches!(
            validate_snapshot(&ForestSettings::default(), &keys, &knots, &edges, "k", &tree),
            Err(KnotXError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_prune_spares_records_other_keys_reach() {
        let mut keys = MemoryKeyTreeStore::new();
        let mut knots = MemoryKnotStore::new();
        let mut edges = MemoryEdgeStore::new();
        let tree = snapshot();
        persist_snapshot(&mut keys, &mut knots, &mut edges, "greeting", &tree, None, &[])
            .unwrap();

        // a second key reaches b through its own edge
        let via = Edge::new(EdgeIdentifier::new("e9", 0), "b");
        let other = TreeKnot::from_knot(&Knot::new("z", KnotData::valued("other"))).with_child(
            TreeEdge::from_edge(&via, TreeKnot::from_knot(&Knot::new("b", KnotData::valued("bonjour")))),
        );
        persist_snapshot(&mut keys, &mut knots, &mut edges, "other", &other, None, &[]).unwrap();

        let mut trimmed = tree.clone();
        trimmed.children.clear();
        let summary = persist_snapshot(
            &mut keys,
            &mut knots,
            &mut edges,
            "greeting",
            &trimmed,
            Some(&tree),
            &[],
        )
        .unwrap();

        assert_eq!(summary.pruned, 1);
        assert!(!edges.contains("e1").unwrap());
        assert!(knots.contains("b").unwrap());
        let loaded = load_tree(&keys, &knots, &edges, "other").unwrap().unwrap();
        assert_eq!(loaded.strip_versions(), other.strip_versions());
    }

    #[test]
    fn test_detached_edit_lands_on_surviving_root() {
        let mut keys = MemoryKeyTreeStore::new();
        let mut knots = MemoryKnotStore::new();
        let mut edges = MemoryEdgeStore::new();
        let tree = snapshot();
        persist_snapshot(&mut keys, &mut knots, &mut edges, "greeting", &tree, None, &[])
            .unwrap();
        keys.put("shared", "b").unwrap();

        let mut trimmed = tree.clone();
        trimmed.children.clear();
        let edited = TreeKnot::from_knot(&Knot::new("b", KnotData::valued("salut")));
        let orphan = TreeKnot::from_knot(&Knot::new("x", KnotData::valued("gone")));
        persist_snapshot(
            &mut keys,
            &mut knots,
            &mut edges,
            "greeting",
            &trimmed,
            Some(&tree),
            &[edited, orphan],
        )
        .unwrap();

        let b = knots.get("b").unwrap().unwrap();
        assert_eq!(b.data, KnotData::valued("salut"));
        assert_eq!(b.version, 1);
        assert!(!knots.contains("x").unwrap());
        assert!(!edges.contains("e1").unwrap());
    }

    #[test]
    fn test_incomplete_detached_subtree_rejected() {
        let mut keys = MemoryKeyTreeStore::new();
        let mut knots = MemoryKnotStore::new();
        let mut edges = MemoryEdgeStore::new();
        let tree = snapshot();
        persist_snapshot(&mut keys, &mut knots, &mut edges, "greeting", &tree, None, &[])
            .unwrap();
        keys.put("shared", "b").unwrap();

        let mut trimmed = tree.clone();
        trimmed.children.clear();
        let dangling = TreeKnot::from_knot(&Knot::new("b", KnotData::valued("bonjour")))
            .with_child(TreeEdge::placeholder(EdgeIdentifier::new("e2", 0)));
        let err = persist_snapshot(
            &mut keys,
            &mut knots,
            &mut edges,
            "greeting",
            &trimmed,
            Some(&tree),
            &[dangling],
        )
        .unwrap_err();

        assert!(matches!(err, KnotXError::InvalidInput { .. }));
        // nothing was written
        assert_eq!(knots.get("a").unwrap().map(|k| k.version), Some(0));
        assert!(edges.contains("e1").unwrap());
    }
}
