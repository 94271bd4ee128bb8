use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Fingerprint of a framework's output for one job: hash digests and counts
/// keyed by metric name.
///
/// Two mappings match when they have the same keys and every pair of values
/// is strictly equal. Strings only equal strings, numbers only equal numbers
/// (compared exactly, no tolerance), and nested arrays or objects never
/// compare equal, since only top-level scalars are fingerprints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsMapping(BTreeMap<String, Value>);

impl MetricsMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn same_keys(&self, other: &MetricsMapping) -> bool {
        self.len() == other.len() && self.keys().all(|k| other.0.contains_key(k))
    }

    pub fn matches(&self, other: &MetricsMapping) -> bool {
        self.same_keys(other)
            && self
                .0
                .iter()
                .all(|(k, v)| other.0.get(k).is_some_and(|w| strict_eq(v, w)))
    }

    /// One `name: value` line per metric, indented by `indent` levels of four
    /// spaces.
    pub fn render(&self, indent: usize) -> String {
        let pad = " ".repeat(4 * indent);
        self.0
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}{}: {}", pad, k, s),
                other => format!("{}{}: {}", pad, k, other),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl PartialEq for MetricsMapping {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl FromIterator<(String, Value)> for MetricsMapping {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => number_eq(x, y),
        _ => false,
    }
}

fn number_eq(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    if x.is_f64() || y.is_f64() {
        return matches!((x.as_f64(), y.as_f64()), (Some(a), Some(b)) if a == b);
    }
    false
}
