//! Minimal JSONPath resolver for context documents
//!
//! Supported: `$`, `.name`, `['name']`, `[index]`, `[*]`, `.*`.
//! A path outside this subset resolves to nothing.

/// A document leaf filters can query
pub trait PathDocument {
    /// All values `path` resolves to; empty when nothing matches
    fn query(&self, path: &str) -> Vec<serde_json::Value>;
}

impl PathDocument for serde_json::Value {
    fn query(&self, path: &str) -> Vec<serde_json::Value> {
        let Some(segments) = parse(path) else {
            return Vec::new();
        };
        let mut current: Vec<&serde_json::Value> = vec![self];
        for segment in &segments {
            current = current
                .into_iter()
                .flat_map(|value| step(value, segment))
                .collect();
        }
        current.into_iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
}

fn step<'a>(value: &'a serde_json::Value, segment: &Segment) -> Vec<&'a serde_json::Value> {
    match (segment, value) {
        (Segment::Field(name), serde_json::Value::Object(map)) => map.get(name).into_iter().collect(),
        (Segment::Index(i), serde_json::Value::Array(items)) => items.get(*i).into_iter().collect(),
        (Segment::Wildcard, serde_json::Value::Object(map)) => map.values().collect(),
        (Segment::Wildcard, serde_json::Value::Array(items)) => items.iter().collect(),
        _ => Vec::new(),
    }
}

fn parse(path: &str) -> Option<Vec<Segment>> {
    let mut rest = path.trim().strip_prefix('$')?;
    let mut segments = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            if let Some(after) = after.strip_prefix('*') {
                segments.push(Segment::Wildcard);
                rest = after;
                continue;
            }
            let end = after.find(['.', '[']).unwrap_or(after.len());
            if end == 0 {
                return None;
            }
            segments.push(Segment::Field(after[..end].to_string()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']')?;
            let inner = after[..close].trim();
            segments.push(bracket(inner)?);
            rest = &after[close + 1..];
        } else {
            return None;
        }
    }
    Some(segments)
}

fn bracket(inner: &str) -> Option<Segment> {
    if inner == "*" {
        return Some(Segment::Wildcard);
    }
    for quote in ['\'', '"'] {
        if let Some(name) = inner
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return Some(Segment::Field(name.to_string()));
        }
    }
    inner.parse().ok().map(Segment::Index)
}
