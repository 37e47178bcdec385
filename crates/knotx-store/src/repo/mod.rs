//! SQLite-backed storage for keys, knots and edges

mod sqlite_repo;

pub use sqlite_repo::{SqliteEdgeStore, SqliteKeyTreeStore, SqliteKnotStore};

use knotx_core::{Forest, ForestConfig};
use rusqlite::Connection;

/// Forest whose three stores share one connection
pub type SqliteForest<'c> =
    Forest<SqliteKeyTreeStore<'c>, SqliteKnotStore<'c>, SqliteEdgeStore<'c>>;

/// Build a forest over a migrated connection
pub fn sqlite_forest(conn: &Connection, config: ForestConfig) -> SqliteForest<'_> {
    Forest::new(
        SqliteKeyTreeStore::new(conn),
        SqliteKnotStore::new(conn),
        SqliteEdgeStore::new(conn),
        config,
    )
}
