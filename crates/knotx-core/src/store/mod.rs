//! Storage contracts
//!
//! Minimal key-value surfaces the forest is written against. Absence is
//! `Ok(None)`, never an error; `Err` means the backend itself failed.

pub mod memory;

pub use memory::{MemoryEdgeStore, MemoryKeyTreeStore, MemoryKnotStore};

use crate::errors::Result;
use crate::model::{Edge, Knot, KnotId};

/// Key → root knot mapping
pub trait KeyTreeStore {
    fn contains(&self, key: &str) -> Result<bool>;

    fn put(&mut self, key: &str, knot_id: &str) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<KnotId>>;

    /// Returns whether the key was mapped
    fn remove(&mut self, key: &str) -> Result<bool>;

    /// Keys mapped to `knot_id`, sorted
    fn keys_for(&self, knot_id: &str) -> Result<Vec<String>>;
}

pub trait KnotStore {
    fn contains(&self, id: &str) -> Result<bool>;

    fn put(&mut self, knot: Knot) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Knot>>;

    fn remove(&mut self, id: &str) -> Result<bool>;

    /// Parent scan: the knot whose edge list holds `edge_id`
    fn owner_of(&self, edge_id: &str) -> Result<Option<Knot>>;
}

pub trait EdgeStore {
    fn contains(&self, id: &str) -> Result<bool>;

    fn put(&mut self, edge: Edge) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Edge>>;

    fn remove(&mut self, id: &str) -> Result<bool>;

    /// Ids of the edges whose target is `knot_id`
    fn targeting(&self, knot_id: &str) -> Result<Vec<String>>;

    /// Bulk fetch; the output is positionally aligned with `ids`
    fn get_all(&self, ids: &[String]) -> Result<Vec<Option<Edge>>> {
        ids.iter().map(|id| self.get(id)).collect()
    }
}
