//! KnotX Store - SQLite persistence for the configuration forest
//!
//! Provides:
//! - SQLite schema with a checksummed migrations framework
//! - Key, knot and edge stores implementing the `knotx-core` storage traits
//! - A [`SqliteForest`] alias wiring the three stores into a forest

pub mod db;
pub mod errors;
pub mod migrations;
pub mod repo;

pub use errors::Result;
pub use repo::{sqlite_forest, SqliteEdgeStore, SqliteForest, SqliteKeyTreeStore, SqliteKnotStore};
