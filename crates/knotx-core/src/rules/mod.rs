pub mod constraints;
pub mod cycle;

pub use cycle::{CycleDetector, StoreGraph, Successors};
