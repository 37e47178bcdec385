use std::collections::HashMap;

use super::{EdgeStore, KeyTreeStore, KnotStore};
use crate::errors::Result;
use crate::model::{Edge, Knot, KnotId};

/// In-memory key mapping
///
/// HashMap-backed and not thread-safe; wrap the owning `Forest` if sharing
/// across threads.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyTreeStore {
    keys: HashMap<String, KnotId>,
}

impl MemoryKeyTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyTreeStore for MemoryKeyTreeStore {
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.keys.contains_key(key))
    }

    fn put(&mut self, key: &str, knot_id: &str) -> Result<()> {
        self.keys.insert(key.to_string(), knot_id.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<KnotId>> {
        Ok(self.keys.get(key).cloned())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        Ok(self.keys.remove(key).is_some())
    }

    fn keys_for(&self, knot_id: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .keys
            .iter()
            .filter(|(_, root)| root.as_str() == knot_id)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// In-memory knot table
#[derive(Debug, Clone, Default)]
pub struct MemoryKnotStore {
    knots: HashMap<KnotId, Knot>,
}

impl MemoryKnotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.knots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }
}

impl KnotStore for MemoryKnotStore {
    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.knots.contains_key(id))
    }

    fn put(&mut self, knot: Knot) -> Result<()> {
        self.knots.insert(knot.id.clone(), knot);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Knot>> {
        Ok(self.knots.get(id).cloned())
    }

    fn remove(&mut self, id: &str) -> Result<bool> {
        Ok(self.knots.remove(id).is_some())
    }

    fn owner_of(&self, edge_id: &str) -> Result<Option<Knot>> {
        Ok(self
            .knots
            .values()
            .find(|knot| knot.edges.contains(edge_id))
            .cloned())
    }
}

/// In-memory edge table
#[derive(Debug, Clone, Default)]
pub struct MemoryEdgeStore {
    edges: HashMap<String, Edge>,
}

impl MemoryEdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl EdgeStore for MemoryEdgeStore {
    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.edges.contains_key(id))
    }

    fn put(&mut self, edge: Edge) -> Result<()> {
        self.edges.insert(edge.identifier.id.clone(), edge);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Edge>> {
        Ok(self.edges.get(id).cloned())
    }

    fn remove(&mut self, id: &str) -> Result<bool> {
        Ok(self.edges.remove(id).is_some())
    }

    fn targeting(&self, knot_id: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .edges
            .values()
            .filter(|edge| edge.target == knot_id)
            .map(|edge| edge.identifier.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
