//! KnotX Core - dynamic configuration forest
//!
//! Configuration values live in a forest of knots (values or composites) joined
//! by prioritized, filtered edges (variations). This crate provides:
//! - Knot, edge and snapshot models with an ordered edge container
//! - Storage contracts with in-memory implementations
//! - Structural rules: cycle detection, edge limits, pivot exclusivity
//! - A filter engine over JSON-path contexts with percentage gating
//! - Context-dependent evaluation of keys into resolved node trees
//! - Transactional delta application with revert operations
//! - Flattening of evaluated trees into id-keyed node maps

pub mod config;
pub mod delta;
pub mod errors;
pub mod eval;
pub mod filter;
pub mod forest;
pub mod ids;
pub mod logging_facility;
pub mod model;
pub mod rules;
pub mod snapshot;
pub mod store;

// Used from the exported logging macros
pub use knotx_core_types;
#[doc(hidden)]
pub use tracing;

// Re-export commonly used types
pub use config::{ForestConfig, ForestSettings};
pub use delta::{DeltaEngine, DeltaMode};
pub use errors::{ExError, ExErrorKind, KnotXError, Result};
pub use eval::{FlatEntry, FlatNode, FlatTree};
pub use filter::{Context, Filter, JsonContext, PercentageSampler, SeededSampler};
pub use forest::{Forest, MemoryForest, Variation, VariationTarget};
pub use ids::{IdGenerator, SequentialIdGenerator, UuidV7Generator};
pub use model::{
    DeltaOperation, Edge, EdgeIdentifier, KeyNode, Knot, KnotData, KnotId, Node, Properties,
    TreeEdge, TreeKnot, Value, UNCONDITIONAL_VERSION,
};
pub use store::{EdgeStore, KeyTreeStore, KnotStore};
