//! Delta transactions over tree snapshots
//!
//! A transaction replays [`DeltaOperation`](crate::model::DeltaOperation)s
//! against a working copy of one key's tree. Preview runs also produce the
//! revert list that undoes the transaction once it has been committed.

pub mod calculate;
pub mod engine;

pub use calculate::calculate_delta_operations;
pub use engine::{DeltaEngine, DeltaMode};
