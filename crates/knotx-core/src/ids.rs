//! Identifier generation for knots and edges

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of fresh knot and edge ids
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Time-ordered UUIDv7 ids
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_id(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

/// Deterministic `prefix-1`, `prefix-2`, ... ids for tests
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_v7_ids_are_unique() {
        let ids = UuidV7Generator;
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert_eq!(Uuid::parse_str(&a).map(|u| u.get_version_num()).ok(), Some(7));
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIdGenerator::new("knot");
        assert_eq!(ids.next_id(), "knot-1");
        assert_eq!(ids.next_id(), "knot-2");
    }
}
