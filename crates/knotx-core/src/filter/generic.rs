use super::context::Context;
use crate::model::Edge;

/// Predicate for [`Filter::Generic`](super::Filter::Generic) payloads
pub trait GenericFilterHandler: Send + Sync {
    fn matches(&self, payload: &serde_json::Value, context: &dyn Context, entity: Option<&Edge>)
        -> bool;
}

/// Default handler: no generic filter ever matches
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectingGenericHandler;

impl GenericFilterHandler for RejectingGenericHandler {
    fn matches(
        &self,
        payload: &serde_json::Value,
        context: &dyn Context,
        entity: Option<&Edge>,
    ) -> bool {
        tracing::warn!(
            trace_id = %context.trace_id(),
            edge_id = entity.map(Edge::id),
            payload = %payload,
            "generic filter has no handler configured; rejecting"
        );
        false
    }
}
