//! Request-time resolution: edge selection, recursive evaluation, flattening

pub mod evaluator;
pub mod flatten;
pub mod selector;

pub use evaluator::Evaluator;
pub use flatten::{flatten, FlatEntry, FlatNode, FlatTree};
pub use selector::select_edge;
