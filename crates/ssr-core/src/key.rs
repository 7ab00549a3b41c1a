//! Query keys identifying cache entries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key of a query cache entry.
///
/// A key is an ordered list of JSON values, e.g. `["home"]` or
/// `["product", {"id": 7}]`. Two keys address the same entry when their
/// hashes are equal; object members are compared independent of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<Value>);

impl QueryKey {
    /// Create a key from its parts.
    pub fn new(parts: Vec<Value>) -> Self {
        Self(parts)
    }

    /// Create a single-segment string key.
    pub fn named(name: impl Into<String>) -> Self {
        Self(vec![Value::String(name.into())])
    }

    /// Append a part to the key.
    pub fn with(mut self, part: impl Into<Value>) -> Self {
        self.0.push(part.into());
        self
    }

    /// Get the key parts.
    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    /// Stable hash used to index the cache.
    ///
    /// `serde_json` keeps object members sorted, so the canonical JSON text
    /// is independent of member insertion order.
    pub fn hash(&self) -> String {
        Value::Array(self.0.clone()).to_string()
    }
}

impl From<&str> for QueryKey {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash())
    }
}
