use knotx_store::db;
use knotx_store::migrations::apply_migrations;
use rusqlite::Connection;

/// Fresh in-memory database with the schema applied
#[allow(dead_code)]
pub fn migrated() -> Connection {
    let mut conn = db::open_in_memory().unwrap();
    apply_migrations(&mut conn).unwrap();
    conn
}
