//! Core types shared across KnotX facilities
//!
//! - **Correlation types**: `TraceId` carried by evaluation contexts
//!   and errors
//! - **Schema constants**: canonical field keys and event names used by the
//!   logging macros

pub mod correlation;
pub mod schema;

pub use correlation::TraceId;
