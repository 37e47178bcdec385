pub mod delta;
pub mod edge;
pub mod knot;
pub mod node;
pub mod ordered;
pub mod properties;
pub mod tree;
pub mod value;

pub use delta::DeltaOperation;
pub use edge::{Edge, EdgeIdentifier};
pub use knot::{Knot, KnotData};
pub use node::{KeyNode, Node};
pub use ordered::OrderedEdges;
pub use properties::Properties;
pub use tree::{TreeEdge, TreeKnot};
pub use value::Value;

/// Identifier of a knot
pub type KnotId = String;

/// Identifier of an edge
pub type EdgeId = String;

/// Version sentinel meaning "overwrite or restore without a version check"
pub const UNCONDITIONAL_VERSION: i64 = -1;
