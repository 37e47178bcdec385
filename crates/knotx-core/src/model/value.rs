use serde::{Deserialize, Serialize};

/// Terminal payload of a `Valued` knot
///
/// The coercion helpers (`bool_or`, `number_or`, ...) never fail: a value
/// that cannot be read as the requested type yields the caller's default, so
/// badly authored data cannot take down a serving path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Bytes(Vec<u8>),
    /// Opaque structured document
    Document(serde_json::Value),
    /// Generic object
    Object(serde_json::Value),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// JSON view of this value; non-finite numbers become `null`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Bytes(bytes) => serde_json::Value::Array(
                bytes.iter().map(|b| serde_json::Value::from(*b)).collect(),
            ),
            Value::Document(doc) | Value::Object(doc) => doc.clone(),
        }
    }

    pub fn bool_or(&self, default: bool) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => parse_bool(s).unwrap_or(default),
            Value::Document(doc) | Value::Object(doc) => match doc {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::String(s) => parse_bool(s).unwrap_or(default),
                _ => default,
            },
            Value::Bytes(_) => default,
        }
    }

    pub fn number_or(&self, default: f64) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::String(s) => s.trim().parse().unwrap_or(default),
            Value::Document(doc) | Value::Object(doc) => match doc {
                serde_json::Value::Number(n) => n.as_f64().unwrap_or(default),
                serde_json::Value::String(s) => s.trim().parse().unwrap_or(default),
                _ => default,
            },
            Value::Bytes(_) => default,
        }
    }

    pub fn string_or(&self, default: &str) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Bytes(bytes) => {
                String::from_utf8(bytes.clone()).unwrap_or_else(|_| default.to_string())
            }
            Value::Document(doc) | Value::Object(doc) => match doc {
                serde_json::Value::String(s) => s.clone(),
                _ => default.to_string(),
            },
        }
    }

    /// Structured view; strings holding a JSON object are parsed
    pub fn object_or(&self, default: serde_json::Value) -> serde_json::Value {
        match self {
            Value::Document(doc) | Value::Object(doc) if doc.is_object() => doc.clone(),
            Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(parsed) if parsed.is_object() => parsed,
                _ => default,
            },
            _ => default,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}
