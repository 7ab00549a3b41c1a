//! Query cache entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ssr_core::QueryKey;

/// Status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// Loader started, not settled.
    Pending,
    /// Loader returned data.
    Success,
    /// Loader failed.
    Error,
}

/// State of a single cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    /// Last successful data. `Some(Value::Null)` is a loader that returned
    /// `null` and is distinct from no data.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub data: Option<Value>,
    /// Last error message.
    pub error: Option<String>,
    /// Entry status.
    pub status: QueryStatus,
    /// Milliseconds since the epoch of the last successful update.
    #[serde(default)]
    pub data_updated_at: i64,
    /// Milliseconds since the epoch of the last failure.
    #[serde(default)]
    pub error_updated_at: i64,
    /// Failed attempts of the last fetch.
    #[serde(default)]
    pub failure_count: u32,
}

impl QueryState {
    /// A pending entry with no data.
    pub fn pending() -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Pending,
            data_updated_at: 0,
            error_updated_at: 0,
            failure_count: 0,
        }
    }

    /// Whether the loader has settled (success or error).
    pub fn is_settled(&self) -> bool {
        self.status != QueryStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }
}

/// A present `data` field, `null` included, is `Some`; only an absent field
/// falls back to `None` through `#[serde(default)]`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Key the entry was stored under.
    pub key: QueryKey,
    /// Current state.
    pub state: QueryState,
}

/// Map of key hash to entry.
#[derive(Debug, Clone, Default)]
pub struct QueryCache {
    queries: BTreeMap<String, Query>,
}

impl QueryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry.
    pub fn get(&self, key: &QueryKey) -> Option<&Query> {
        self.queries.get(&key.hash())
    }

    /// Mark an entry as pending, keeping previous data.
    pub fn set_pending(&mut self, key: &QueryKey) {
        self.entry(key).state.status = QueryStatus::Pending;
    }

    /// Store successful data.
    pub fn set_data(&mut self, key: &QueryKey, data: Value, updated_at: i64) {
        let state = &mut self.entry(key).state;
        state.data = Some(data);
        state.error = None;
        state.status = QueryStatus::Success;
        state.data_updated_at = updated_at;
        state.failure_count = 0;
    }

    /// Store a failure. Previous data is kept, as a consumer may still show it.
    pub fn set_error(&mut self, key: &QueryKey, error: String, failure_count: u32, updated_at: i64) {
        let state = &mut self.entry(key).state;
        state.error = Some(error);
        state.status = QueryStatus::Error;
        state.error_updated_at = updated_at;
        state.failure_count = failure_count;
    }

    /// Replace an entry wholesale.
    pub fn insert(&mut self, key: QueryKey, state: QueryState) {
        self.queries.insert(key.hash(), Query { key, state });
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &QueryKey) -> Option<Query> {
        self.queries.remove(&key.hash())
    }

    /// Iterate entries in key-hash order.
    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.queries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.queries.clear();
    }

    fn entry(&mut self, key: &QueryKey) -> &mut Query {
        self.queries.entry(key.hash()).or_insert_with(|| Query {
            key: key.clone(),
            state: QueryState::pending(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_data_then_error_keeps_data() {
        let key = QueryKey::named("home");
        let mut cache = QueryCache::new();

        cache.set_data(&key, json!([1, 2]), 10);
        cache.set_error(&key, "boom".to_string(), 1, 20);

        let state = &cache.get(&key).unwrap().state;
        assert_eq!(state.status, QueryStatus::Error);
        assert_eq!(state.data, Some(json!([1, 2])));
        assert_eq!(state.error.as_deref(), Some("boom"));
        assert_eq!(state.failure_count, 1);
    }

    #[test]
    fn test_pending_is_not_settled() {
        let key = QueryKey::named("home");
        let mut cache = QueryCache::new();
        cache.set_pending(&key);

        assert!(!cache.get(&key).unwrap().state.is_settled());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_null_data_is_kept_apart_from_no_data() {
        let mut state = QueryState::pending();
        state.status = QueryStatus::Success;
        state.data = Some(Value::Null);

        let text = serde_json::to_string(&state).unwrap();
        assert!(text.contains(r#""data":null"#));
        let back: QueryState = serde_json::from_str(&text).unwrap();
        assert_eq!(back.data, Some(Value::Null));

        let text = serde_json::to_string(&QueryState::pending()).unwrap();
        assert!(!text.contains("\"data\""));
        let back: QueryState = serde_json::from_str(&text).unwrap();
        assert_eq!(back.data, None);
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let mut state = QueryState::pending();
        state.status = QueryStatus::Success;
        state.data = Some(json!("x"));
        state.data_updated_at = 5;

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["dataUpdatedAt"], 5);
        assert_eq!(value["failureCount"], 0);
    }
}
