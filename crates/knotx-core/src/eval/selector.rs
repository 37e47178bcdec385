use crate::errors::Result;
use crate::filter::{Context, FilterEvaluator};
use crate::model::{Edge, Knot};
use crate::store::EdgeStore;

/// First edge of `knot`, in priority order, that matches `context`
///
/// Returns the edge together with its index in the knot's edge order. The
/// knot's edges are fetched in one bulk call; ids without a stored record are
/// skipped.
pub fn select_edge(
    edges: &dyn EdgeStore,
    filters: &FilterEvaluator,
    knot: &Knot,
    context: &dyn Context,
) -> Result<Option<(usize, Edge)>> {
    if !knot.has_edges() {
        return Ok(None);
    }
    let records = edges.get_all(&knot.edges.ids())?;
    for (index, record) in records.into_iter().enumerate() {
        let Some(edge) = record else {
            tracing::warn!(
                knot_id = %knot.id,
                trace_id = %context.trace_id(),
                index,
                "knot lists an edge with no stored record"
            );
            continue;
        };
        if filters.edge_matches(&edge, context) {
            tracing::trace!(
                knot_id = %knot.id,
                edge_id = edge.id(),
                index,
                "edge selected"
            );
            return Ok(Some((index, edge)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, JsonContext};
    use crate::model::{EdgeIdentifier, KnotData};
    use crate::store::MemoryEdgeStore;
    use serde_json::json;

    #[test]
    fn test_first_match_in_priority_order() {
        let mut store = MemoryEdgeStore::new();
        let mut knot = Knot::new("root", KnotData::valued("base"));

        for (id, priority, lang) in [("late", 20, "fr"), ("early", 10, "fr"), ("other", 5, "de")] {
            let identifier = EdgeIdentifier::new(id, priority);
            knot.edges.insert(identifier.clone());
            store
                .put(
                    Edge::new(identifier, format!("{}-target", id))
                        .with_filter(Filter::equals("$.lang", lang)),
                )
                .unwrap();
        }

        let ctx = JsonContext::new(json!({"lang": "fr"}));
        let (index, edge) = select_edge(&store, &FilterEvaluator::default(), &knot, &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(edge.id(), "early");
        assert_eq!(index, 1);

        let none = JsonContext::new(json!({"lang": "it"}));
        assert!(select_edge(&store, &FilterEvaluator::default(), &knot, &none)
            .unwrap()
            .is_none());
    }
}
