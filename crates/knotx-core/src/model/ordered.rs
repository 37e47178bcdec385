use serde::{Deserialize, Serialize};

use super::edge::EdgeIdentifier;

/// Priority-ordered list of a knot's outgoing edge identifiers
///
/// Items are kept sorted by `(priority, sequence)`. A fresh identifier
/// (sequence 0) is stamped with the next sequence number, so it lands just
/// before the first item with a strictly greater priority and after every
/// equal-priority item already present.
///
/// There is deliberately no positional insert/prepend/append: the only ways
/// in are [`insert`](Self::insert) and [`extend`](Self::extend).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<EdgeIdentifier>", into = "Vec<EdgeIdentifier>")]
pub struct OrderedEdges {
    items: Vec<EdgeIdentifier>,
}

impl OrderedEdges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identifier at its priority position
    ///
    /// An identifier whose id is already present replaces the old entry.
    /// Returns the sequence number the identifier carries after insertion.
    pub fn insert(&mut self, mut identifier: EdgeIdentifier) -> u64 {
        self.remove(&identifier.id);
        if identifier.sequence == 0 {
            identifier.sequence = self.next_sequence();
        }
        let at = self
            .items
            .iter()
            .position(|existing| {
                existing.priority > identifier.priority
                    || (existing.priority == identifier.priority
                        && existing.sequence > identifier.sequence)
            })
            .unwrap_or(self.items.len());
        let sequence = identifier.sequence;
        self.items.insert(at, identifier);
        sequence
    }

    /// Bulk add, preserving the relative order of `identifiers` among ties
    pub fn extend<I>(&mut self, identifiers: I)
    where
        I: IntoIterator<Item = EdgeIdentifier>,
    {
        for identifier in identifiers {
            self.insert(identifier);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<EdgeIdentifier> {
        let at = self.position(id)?;
        Some(self.items.remove(at))
    }

    pub fn get(&self, id: &str) -> Option<&EdgeIdentifier> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Index of an edge in priority order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EdgeIdentifier> {
        self.items.iter()
    }

    /// Edge ids in priority order
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn next_sequence(&self) -> u64 {
        self.items
            .iter()
            .map(|item| item.sequence)
            .max()
            .unwrap_or(0)
            + 1
    }
}

impl From<Vec<EdgeIdentifier>> for OrderedEdges {
    /// Restores ordering for records that come from outside (storage, wire)
    fn from(items: Vec<EdgeIdentifier>) -> Self {
        let mut ordered = Self::new();
        ordered.extend(items);
        ordered
    }
}

impl From<OrderedEdges> for Vec<EdgeIdentifier> {
    fn from(edges: OrderedEdges) -> Self {
        edges.items
    }
}

impl<'a> IntoIterator for &'a OrderedEdges {
    type Item = &'a EdgeIdentifier;
    type IntoIter = std::slice::Iter<'a, EdgeIdentifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
