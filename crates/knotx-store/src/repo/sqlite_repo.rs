//! Store trait implementations over a borrowed connection
//!
//! Records are kept as JSON bodies; ids, versions and edge targets are also
//! broken out into columns. `knot_edges` indexes edge ownership so the
//! parent scan is a lookup.

use crate::errors::{corrupt_record, from_rusqlite, Result};
use knotx_core::model::{Edge, Knot, KnotId};
use knotx_core::store::{EdgeStore, KeyTreeStore, KnotStore};
use knotx_core::KnotXError;
use rusqlite::{Connection, OptionalExtension};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn encode<T: serde::Serialize>(record: &T) -> Result<String> {
    serde_json::to_string(record).map_err(KnotXError::from)
}

fn exists(conn: &Connection, sql: &str, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(sql, [id], |row| row.get(0))
        .optional()
        .map_err(from_rusqlite)?;
    Ok(found.is_some())
}

pub struct SqliteKeyTreeStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteKeyTreeStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl KeyTreeStore for SqliteKeyTreeStore<'_> {
    fn contains(&self, key: &str) -> Result<bool> {
        exists(self.conn, "SELECT 1 FROM tree_keys WHERE key = ?1", key)
    }

    fn put(&mut self, key: &str, knot_id: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO tree_keys (key, knot_id, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    knot_id = excluded.knot_id,
                    updated_at = excluded.updated_at",
                rusqlite::params![key, knot_id, now()],
            )
            .map_err(from_rusqlite)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<KnotId>> {
        self.conn
            .query_row(
                "SELECT knot_id FROM tree_keys WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM tree_keys WHERE key = ?1", [key])
            .map_err(from_rusqlite)?;
        Ok(removed > 0)
    }

    fn keys_for(&self, knot_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key FROM tree_keys WHERE knot_id = ?1 ORDER BY key")
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([knot_id], |row| row.get::<_, String>(0))
            .map_err(from_rusqlite)?;
        let keys = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(keys)
    }
}

pub struct SqliteKnotStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteKnotStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn decode(id: &str, body: &str) -> Result<Knot> {
        serde_json::from_str(body).map_err(|e| corrupt_record("knot", id, e))
    }
}

impl KnotStore for SqliteKnotStore<'_> {
    fn contains(&self, id: &str) -> Result<bool> {
        exists(self.conn, "SELECT 1 FROM knots WHERE id = ?1", id)
    }

    /// Upserts the record and rewrites its owner index rows atomically
    fn put(&mut self, knot: Knot) -> Result<()> {
        let body = encode(&knot)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(from_rusqlite)?;
        tx.execute(
            "INSERT INTO knots (id, version, body, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                body = excluded.body,
                updated_at = excluded.updated_at",
            rusqlite::params![knot.id, knot.version, body, now()],
        )
        .map_err(from_rusqlite)?;
        tx.execute("DELETE FROM knot_edges WHERE knot_id = ?1", [&knot.id])
            .map_err(from_rusqlite)?;
        for (position, identifier) in knot.edges.iter().enumerate() {
            tx.execute(
                "INSERT INTO knot_edges (knot_id, edge_id, position) VALUES (?1, ?2, ?3)",
                rusqlite::params![knot.id, identifier.id, position as i64],
            )
            .map_err(from_rusqlite)?;
        }
        tx.commit().map_err(from_rusqlite)
    }

    fn get(&self, id: &str) -> Result<Option<Knot>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM knots WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(from_rusqlite)?;
        body.map(|body| Self::decode(id, &body)).transpose()
    }

    fn remove(&mut self, id: &str) -> Result<bool> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(from_rusqlite)?;
        tx.execute("DELETE FROM knot_edges WHERE knot_id = ?1", [id])
            .map_err(from_rusqlite)?;
        let removed = tx
            .execute("DELETE FROM knots WHERE id = ?1", [id])
            .map_err(from_rusqlite)?;
        tx.commit().map_err(from_rusqlite)?;
        Ok(removed > 0)
    }

    fn owner_of(&self, edge_id: &str) -> Result<Option<Knot>> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT knot_id FROM knot_edges WHERE edge_id = ?1 ORDER BY knot_id LIMIT 1",
                [edge_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        match owner {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }
}

pub struct SqliteEdgeStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteEdgeStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl EdgeStore for SqliteEdgeStore<'_> {
    fn contains(&self, id: &str) -> Result<bool> {
        exists(self.conn, "SELECT 1 FROM edges WHERE id = ?1", id)
    }

    fn put(&mut self, edge: Edge) -> Result<()> {
        let body = encode(&edge)?;
        self.conn
            .execute(
                "INSERT INTO edges (id, target, version, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    target = excluded.target,
                    version = excluded.version,
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                rusqlite::params![edge.id(), edge.target, edge.version, body, now()],
            )
            .map_err(from_rusqlite)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Edge>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM edges WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(from_rusqlite)?;
        body.map(|body| serde_json::from_str(&body).map_err(|e| corrupt_record("edge", id, e)))
            .transpose()
    }

    fn remove(&mut self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM edges WHERE id = ?1", [id])
            .map_err(from_rusqlite)?;
        Ok(removed > 0)
    }

    fn targeting(&self, knot_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM edges WHERE target = ?1 ORDER BY id")
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([knot_id], |row| row.get::<_, String>(0))
            .map_err(from_rusqlite)?;
        let ids = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(ids)
    }

    /// One cached statement reused across the batch
    fn get_all(&self, ids: &[String]) -> Result<Vec<Option<Edge>>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT body FROM edges WHERE id = ?1")
            .map_err(from_rusqlite)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let body: Option<String> = stmt
                .query_row([id], |row| row.get(0))
                .optional()
                .map_err(from_rusqlite)?;
            out.push(
                body.map(|body| {
                    serde_json::from_str(&body).map_err(|e| corrupt_record("edge", id, e))
                })
                .transpose()?,
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::migrations::apply_migrations;
    use knotx_core::model::{EdgeIdentifier, KnotData};

    fn migrated() -> Connection {
        let mut conn = open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_knot_round_trip_and_owner_index() {
        let conn = migrated();
        let mut knots = SqliteKnotStore::new(&conn);
        let mut knot = Knot::new("k1", KnotData::valued("base"));
        knot.edges.insert(EdgeIdentifier::new("e1", 0));
        knots.put(knot.clone()).unwrap();

        assert_eq!(knots.get("k1").unwrap(), Some(knot.clone()));
        assert_eq!(knots.owner_of("e1").unwrap().map(|k| k.id), Some("k1".to_string()));

        knot.edges.remove("e1");
        knots.put(knot).unwrap();
        assert!(knots.owner_of("e1").unwrap().is_none());

        assert!(knots.remove("k1").unwrap());
        assert!(!knots.remove("k1").unwrap());
    }

    #[test]
    fn test_reverse_lookups() {
        let conn = migrated();
        let mut keys = SqliteKeyTreeStore::new(&conn);
        let mut edges = SqliteEdgeStore::new(&conn);
        keys.put("greeting", "k1").unwrap();
        edges
            .put(Edge::new(EdgeIdentifier::new("e2", 0), "k2"))
            .unwrap();
        edges
            .put(Edge::new(EdgeIdentifier::new("e1", 0), "k2"))
            .unwrap();

        assert_eq!(keys.keys_for("k1").unwrap(), vec!["greeting"]);
        assert!(keys.keys_for("k2").unwrap().is_empty());
        assert_eq!(edges.targeting("k2").unwrap(), vec!["e1", "e2"]);
        assert!(edges.targeting("k1").unwrap().is_empty());
    }

    #[test]
    fn test_edge_bulk_fetch_is_aligned() {
        let conn = migrated();
        let mut edges = SqliteEdgeStore::new(&conn);
        edges
            .put(Edge::new(EdgeIdentifier::new("e1", 0), "k2"))
            .unwrap();

        let fetched = edges
            .get_all(&["missing".to_string(), "e1".to_string()])
            .unwrap();
        assert!(fetched[0].is_none());
        assert_eq!(fetched[1].as_ref().map(|e| e.target.as_str()), Some("k2"));
    }

    #[test]
    fn test_corrupt_body_is_persistence_error() {
        let conn = migrated();
        conn.execute(
            "INSERT INTO edges (id, target, version, body, updated_at) VALUES ('bad', 'x', 0, '{', 0)",
            [],
        )
        .unwrap();
        let edges = SqliteEdgeStore::new(&conn);
        assert!(matches!(
            edges.get("bad"),
            Err(KnotXError::Persistence { .. })
        ));
    }
}
