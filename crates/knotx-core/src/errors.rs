use knotx_core_types::TraceId;
use thiserror::Error;

/// Result type alias using KnotXError
pub type Result<T> = std::result::Result<T, KnotXError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Stable classification of every failure the engine can surface. Each kind
/// maps to a stable error code usable by callers, tests, and log pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Structural/Validation
    InvalidInput,
    NotFound,
    CycleDetected,
    EdgePivotConstraintViolation,

    // Delta ordering
    TreeAlreadyExists,
    TreeDoesNotExist,

    // Integration/IO
    Concurrency,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::CycleDetected => "ERR_CYCLE_DETECTED",
            ExErrorKind::EdgePivotConstraintViolation => "ERR_EDGE_PIVOT_CONSTRAINT_VIOLATION",
            ExErrorKind::TreeAlreadyExists => "ERR_TREE_ALREADY_EXISTS",
            ExErrorKind::TreeDoesNotExist => "ERR_TREE_DOES_NOT_EXIST",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification plus whatever context the failing operation
/// could attach. Built from [`KnotXError`] at API and logging boundaries.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    key: Option<String>,
    trace_id: Option<TraceId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            key: None,
            trace_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add knot or edge id context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add logical key context
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Add trace ID context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(key) = &self.key {
            write!(f, " (key: {})", key)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for forest operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KnotXError {
    // ===== Structural Errors =====
    /// The mutation would make a knot reachable from itself
    #[error("Cycle detected: knot {knot_id} would become reachable from itself")]
    CycleDetected { knot_id: String },

    /// Sibling edges of a mutually-exclusive knot disagree on their pivot field
    #[error("Edge pivot constraint violated on knot {knot_id}: expected pivot {expected:?}, found {found:?}")]
    EdgePivotConstraintViolation {
        knot_id: String,
        expected: Option<String>,
        found: Option<String>,
    },

    // ===== Validation Errors =====
    /// Malformed record or operation
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Knot would carry more edges than configured
    #[error("Knot {knot_id} has {count} edges, limit is {limit}")]
    TooManyEdges {
        knot_id: String,
        count: usize,
        limit: usize,
    },

    /// Edge would carry more filters than configured
    #[error("Edge {edge_id} has {count} filters, limit is {limit}")]
    TooManyFilters {
        edge_id: String,
        count: usize,
        limit: usize,
    },

    // ===== Delta Ordering Errors =====
    /// KeyMapping operation arrived after the tree was already rooted
    #[error("Tree already exists for key {key}")]
    TreeAlreadyExists { key: String },

    /// Knot/Edge operation arrived before anything referenced its id
    #[error("No tree node with id {id} exists yet")]
    TreeDoesNotExist { id: String },

    // ===== Lookup Errors =====
    #[error("Knot not found: {knot_id}")]
    KnotNotFound { knot_id: String },

    #[error("Edge not found: {edge_id}")]
    EdgeNotFound { edge_id: String },

    #[error("Key not mapped: {key}")]
    KeyNotFound { key: String },

    // ===== Concurrency Errors =====
    /// Optimistic version check failed on update
    #[error("Version conflict on {id}: expected {expected}, stored {actual}")]
    VersionConflict {
        id: String,
        expected: i64,
        actual: i64,
    },

    // ===== Generic Errors =====
    /// Serialization error (JSON or TOML encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Storage adapter failure
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KnotXError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        KnotXError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ExErrorKind {
        ExError::from(self.clone()).kind()
    }
}

/// Conversion from KnotXError to ExError
impl From<KnotXError> for ExError {
    fn from(err: KnotXError) -> Self {
        match err {
            KnotXError::CycleDetected { knot_id } => ExError::new(ExErrorKind::CycleDetected)
                .with_entity_id(knot_id)
                .with_message("Mutation would create a cycle"),

            KnotXError::EdgePivotConstraintViolation {
                knot_id,
                expected,
                found,
            } => ExError::new(ExErrorKind::EdgePivotConstraintViolation)
                .with_entity_id(knot_id)
                .with_message(format!(
                    "Sibling edges must share pivot {:?}, found {:?}",
                    expected, found
                )),

            KnotXError::InvalidInput { reason } => {
                ExError::new(ExErrorKind::InvalidInput).with_message(reason)
            }

            KnotXError::TooManyEdges {
                knot_id,
                count,
                limit,
            } => ExError::new(ExErrorKind::InvalidInput)
                .with_entity_id(knot_id)
                .with_message(format!("{} edges exceeds limit {}", count, limit)),

            KnotXError::TooManyFilters {
                edge_id,
                count,
                limit,
            } => ExError::new(ExErrorKind::InvalidInput)
                .with_entity_id(edge_id)
                .with_message(format!("{} filters exceeds limit {}", count, limit)),

            KnotXError::TreeAlreadyExists { key } => ExError::new(ExErrorKind::TreeAlreadyExists)
                .with_key(key)
                .with_op("delta_key_mapping")
                .with_message("Tree already exists"),

            KnotXError::TreeDoesNotExist { id } => ExError::new(ExErrorKind::TreeDoesNotExist)
                .with_entity_id(id)
                .with_message("Operation references a node that is not in the tree yet"),

            KnotXError::KnotNotFound { knot_id } => ExError::new(ExErrorKind::NotFound)
                .with_entity_id(knot_id)
                .with_message("Knot not found"),

            KnotXError::EdgeNotFound { edge_id } => ExError::new(ExErrorKind::NotFound)
                .with_entity_id(edge_id)
                .with_message("Edge not found"),

            KnotXError::KeyNotFound { key } => ExError::new(ExErrorKind::NotFound)
                .with_key(key)
                .with_message("Key not mapped"),

            KnotXError::VersionConflict {
                id,
                expected,
                actual,
            } => ExError::new(ExErrorKind::Concurrency)
                .with_entity_id(id)
                .with_message(format!("Expected version {}, stored {}", expected, actual)),

            KnotXError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            KnotXError::Persistence { message } => {
                ExError::new(ExErrorKind::Persistence).with_message(message)
            }

            KnotXError::Internal { message } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for KnotXError {
    fn from(err: serde_json::Error) -> Self {
        KnotXError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for KnotXError {
    fn from(err: toml::de::Error) -> Self {
        KnotXError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_errors_classify_as_invalid_input() {
        let err = KnotXError::TooManyEdges {
            knot_id: "k1".into(),
            count: 3,
            limit: 2,
        };
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);

        let err = KnotXError::TooManyFilters {
            edge_id: "e1".into(),
            count: 2,
            limit: 1,
        };
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    }

    #[test]
    fn test_delta_ordering_codes() {
        let cases = [
            (ExErrorKind::TreeAlreadyExists, "ERR_TREE_ALREADY_EXISTS"),
            (ExErrorKind::TreeDoesNotExist, "ERR_TREE_DOES_NOT_EXIST"),
            (ExErrorKind::CycleDetected, "ERR_CYCLE_DETECTED"),
        ];
        for (kind, expected_code) in cases {
            assert_eq!(kind.code(), expected_code, "Wrong code for {:?}", kind);
        }
    }

    #[test]
    fn test_ex_error_display_includes_context() {
        let ex: ExError = KnotXError::KeyNotFound {
            key: "greeting".into(),
        }
        .into();
        let rendered = ex.to_string();
        assert!(rendered.starts_with("[ERR_NOT_FOUND]"));
        assert!(rendered.contains("key: greeting"));
    }

    #[test]
    fn test_ex_error_source_chain() {
        let inner = ExError::new(ExErrorKind::Persistence).with_message("disk");
        let outer = ExError::new(ExErrorKind::Internal).with_source(inner);
        assert_eq!(
            outer.source_error().map(|e| e.kind()),
            Some(ExErrorKind::Persistence)
        );
        assert!(std::error::Error::source(&outer).is_some());
    }
}
