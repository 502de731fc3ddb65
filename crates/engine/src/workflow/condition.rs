//! Condition evaluation for branch steps and trigger filters.
//!
//! Conditions are structured (field, op, value) rather than a template
//! language, so they round-trip through JSONB untouched. Fields are
//! dotted paths into a JSON document: `booking.status`, `steps.remind`.

use serde::{Deserialize, Serialize};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
    Exists,
}

/// A single condition over a JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Dotted path into the document.
    pub field: String,

    /// Comparison operator.
    pub op: CompareOp,

    /// Right-hand side; ignored for `exists`.
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Condition {
    /// Evaluate the condition against a document.
    ///
    /// A missing field matches only `ne` (the value is absent, so it
    /// cannot equal anything) and fails every other operator.
    pub fn matches(&self, document: &serde_json::Value) -> bool {
        let found = lookup(document, &self.field);

        match self.op {
            CompareOp::Exists => found.map(|v| !v.is_null()).unwrap_or(false),
            CompareOp::Eq => found.map(|v| v == &self.value).unwrap_or(false),
            CompareOp::Ne => found.map(|v| v != &self.value).unwrap_or(true),
            CompareOp::Gt => compare_numbers(found, &self.value)
                .map(|(a, b)| a > b)
                .unwrap_or(false),
            CompareOp::Lt => compare_numbers(found, &self.value)
                .map(|(a, b)| a < b)
                .unwrap_or(false),
            CompareOp::Contains => found.map(|v| contains(v, &self.value)).unwrap_or(false),
        }
    }
}

/// Evaluate a conjunction of conditions. Empty slices match everything.
pub fn all_match(conditions: &[Condition], document: &serde_json::Value) -> bool {
    conditions.iter().all(|c| c.matches(document))
}

/// Resolve a dotted path inside a JSON document.
fn lookup<'a>(document: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = document;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn compare_numbers(found: Option<&serde_json::Value>, expected: &serde_json::Value) -> Option<(f64, f64)> {
    Some((found?.as_f64()?, expected.as_f64()?))
}

fn contains(haystack: &serde_json::Value, needle: &serde_json::Value) -> bool {
    match haystack {
        serde_json::Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        serde_json::Value::Array(items) => items.contains(needle),
        _ => false,
    }
}
