use std::collections::HashSet;

use crate::errors::{KnotXError, Result};
use crate::model::{DeltaOperation, TreeKnot};
use crate::store::{EdgeStore, KeyTreeStore, KnotStore};

/// Operations that turn the persisted tree of `key` into `target`
///
/// Emits a `KeyMapping` when the key is new, then walks `target` pre-order
/// and emits a `Knot` or `Edge` operation for every record whose stored
/// counterpart is absent or differs. All emitted versions are unconditional.
///
/// # Errors
///
/// `InvalidInput` if `target` contains placeholders or would re-root an
/// already mapped key; store failures otherwise.
pub fn calculate_delta_operations(
    keys: &dyn KeyTreeStore,
    knots: &dyn KnotStore,
    edges: &dyn EdgeStore,
    key: &str,
    target: &TreeKnot,
) -> Result<Vec<DeltaOperation>> {
    let mut operations = Vec::new();
    match keys.get(key)? {
        None => operations.push(DeltaOperation::KeyMapping {
            key: key.to_string(),
            knot_id: target.id.clone(),
        }),
        Some(root) if root != target.id => {
            return Err(KnotXError::invalid(format!(
                "key {} is rooted at {}; a delta cannot re-root it to {}",
                key, root, target.id
            )));
        }
        Some(_) => {}
    }

    let mut diff = Diff {
        knots,
        edges,
        seen_knots: HashSet::new(),
        seen_edges: HashSet::new(),
        operations,
    };
    diff.knot(target)?;
    Ok(diff.operations)
}

struct Diff<'a> {
    knots: &'a dyn KnotStore,
    edges: &'a dyn EdgeStore,
    seen_knots: HashSet<String>,
    seen_edges: HashSet<String>,
    operations: Vec<DeltaOperation>,
}

impl Diff<'_> {
    fn knot(&mut self, knot: &TreeKnot) -> Result<()> {
        if !self.seen_knots.insert(knot.id.clone()) {
            return Ok(());
        }
        let record = knot.to_knot().ok_or_else(|| {
            KnotXError::invalid(format!("knot {} in target snapshot has no data", knot.id))
        })?;
        let unchanged = self
            .knots
            .get(&record.id)?
            .is_some_and(|stored| stored.same_content(&record));
        if !unchanged {
            self.operations
                .push(DeltaOperation::Knot(record).unconditional());
        }

        for edge in &knot.children {
            let id = &edge.edge_identifier.id;
            if !self.seen_edges.insert(id.clone()) {
                continue;
            }
            let record = edge.to_edge().ok_or_else(|| {
                KnotXError::invalid(format!("edge {} in target snapshot has no target", id))
            })?;
            let unchanged = self
                .edges
                .get(id)?
                .is_some_and(|stored| stored.same_content(&record));
            if !unchanged {
                self.operations
                    .push(DeltaOperation::Edge(record).unconditional());
            }
            if let Some(child) = edge.child.as_deref() {
                self.knot(child)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, EdgeIdentifier, Knot, KnotData, TreeEdge};
    use crate::store::{MemoryEdgeStore, MemoryKeyTreeStore, MemoryKnotStore};

    #[test]
    fn test_new_key_emits_everything_in_pre_order() {
        let keys = MemoryKeyTreeStore::new();
        let knots = MemoryKnotStore::new();
        let edges = MemoryEdgeStore::new();

        let leaf = TreeKnot::from_knot(&Knot::new("leaf", KnotData::valued("x")));
        let edge = Edge::new(EdgeIdentifier::new("e1", 0), "leaf");
        let root = TreeKnot::from_knot(&Knot::new("root", KnotData::valued("base")))
            .with_child(TreeEdge::from_edge(&edge, leaf));

        let ops = calculate_delta_operations(&keys, &knots, &edges, "k", &root).unwrap();
        let shape: Vec<(&str, &str)> = ops.iter().map(|op| (op.kind(), op.target_id())).collect();
        assert_eq!(
            shape,
            vec![
                ("key_mapping", "root"),
                ("knot", "root"),
                ("edge", "e1"),
                ("knot", "leaf")
            ]
        );
    }

    #[test]
    fn test_unchanged_records_are_skipped() {
        let mut keys = MemoryKeyTreeStore::new();
        let mut knots = MemoryKnotStore::new();
        let edges = MemoryEdgeStore::new();
        knots.put(Knot::new("root", KnotData::valued("base"))).unwrap();
        keys.put("k", "root").unwrap();

        let same = TreeKnot::from_knot(&Knot::new("root", KnotData::valued("base")));
        assert!(calculate_delta_operations(&keys, &knots, &edges, "k", &same)
            .unwrap()
            .is_empty());

        let other_root = TreeKnot::from_knot(&Knot::new("elsewhere", KnotData::valued("base")));
        assert!(calculate_delta_operations(&keys, &knots, &edges, "k", &other_root).is_err());
    }
}
