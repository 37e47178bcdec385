use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form property bag attached to knots and edges
///
/// Values are arbitrary JSON. Ordered by key so that two bags with the same
/// content compare and serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Properties {
    data: BTreeMap<String, serde_json::Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<BTreeMap<String, serde_json::Value>> for Properties {
    fn from(data: BTreeMap<String, serde_json::Value>) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_properties_roundtrip_as_plain_object() {
        let props = Properties::new()
            .with("owner", json!("growth-team"))
            .with("ticket", json!(1234));
        let encoded = serde_json::to_value(&props).unwrap();
        assert_eq!(encoded, json!({"owner": "growth-team", "ticket": 1234}));
        assert_eq!(props.len(), 2);
        assert!(props.contains_key("owner"));
    }
}
