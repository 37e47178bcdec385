use knotx_core_types::TraceId;

use super::path::PathDocument;

/// Per-evaluation input that filters are matched against
pub trait Context {
    fn document(&self) -> &dyn PathDocument;

    fn trace_id(&self) -> &TraceId;
}

/// Context backed by a parsed JSON document
#[derive(Debug, Clone)]
pub struct JsonContext {
    document: serde_json::Value,
    trace_id: TraceId,
}

impl JsonContext {
    /// Wrap a document under a fresh trace id
    pub fn new(document: serde_json::Value) -> Self {
        Self {
            document,
            trace_id: TraceId::new(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn from_json_str(raw: &str) -> crate::errors::Result<Self> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }
}

impl Context for JsonContext {
    fn document(&self) -> &dyn PathDocument {
        &self.document
    }

    fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_exposes_document_and_trace() {
        let ctx = JsonContext::new(json!({"lang": "fr"})).with_trace_id(TraceId::from("t-1"));
        assert_eq!(ctx.trace_id().as_str(), "t-1");
        assert_eq!(ctx.document().query("$.lang"), vec![json!("fr")]);
    }

    #[test]
    fn test_from_json_str_rejects_garbage() {
        assert!(JsonContext::from_json_str("{not json").is_err());
    }
}
