//! Request-scoped query client.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use ssr_core::QueryKey;

use crate::cache::{Query, QueryCache, QueryState};
use crate::dehydrate::DehydratedState;

/// Default query behavior for a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientQueryOptions {
    /// Retries after a failed fetch.
    pub retry: u32,
    /// Delay between retries.
    pub retry_delay: Duration,
    /// Refetch queries when the window regains focus.
    pub refetch_on_window_focus: bool,
}

impl ClientQueryOptions {
    /// Server-side defaults: fail fast, the render deadline is the budget.
    pub fn server() -> Self {
        Self {
            retry: 0,
            retry_delay: Duration::ZERO,
            refetch_on_window_focus: false,
        }
    }

    /// Browser-side defaults.
    pub fn browser() -> Self {
        Self {
            retry: 1,
            retry_delay: Duration::from_millis(1000),
            refetch_on_window_focus: false,
        }
    }
}

impl Default for ClientQueryOptions {
    fn default() -> Self {
        Self::server()
    }
}

/// Handle to a query cache.
///
/// Cloning the handle shares the cache. Create one client per request on the
/// server (and one per page load in the browser); a client must never be
/// stored in a process-wide static or handed to another request.
#[derive(Debug, Clone, Default)]
pub struct QueryClient {
    cache: Arc<Mutex<QueryCache>>,
    options: ClientQueryOptions,
}

impl QueryClient {
    /// Create a client with an empty cache and server defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client with custom default options.
    pub fn with_options(options: ClientQueryOptions) -> Self {
        Self {
            cache: Arc::default(),
            options,
        }
    }

    /// Create a client seeded from a dehydrated snapshot.
    pub fn from_dehydrated(state: &DehydratedState, options: ClientQueryOptions) -> Self {
        let client = Self::with_options(options);
        client.hydrate(state);
        client
    }

    /// Default options of this client.
    pub fn options(&self) -> &ClientQueryOptions {
        &self.options
    }

    /// Get the data stored under a key.
    pub fn get_query_data(&self, key: &QueryKey) -> Option<Value> {
        self.cache().get(key).and_then(|q| q.state.data.clone())
    }

    /// Get the data stored under a key, deserialized.
    pub fn get_query_data_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        self.get_query_data(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Get the full state of an entry.
    pub fn get_query_state(&self, key: &QueryKey) -> Option<QueryState> {
        self.cache().get(key).map(|q| q.state.clone())
    }

    /// Store data under a key.
    pub fn set_query_data(&self, key: &QueryKey, data: Value) {
        self.cache().set_data(key, data, now_millis());
    }

    /// Record a failed fetch under a key.
    pub fn set_query_error(&self, key: &QueryKey, error: impl std::fmt::Display, failure_count: u32) {
        self.cache()
            .set_error(key, error.to_string(), failure_count, now_millis());
    }

    /// Mark a key as being fetched.
    pub fn mark_pending(&self, key: &QueryKey) {
        self.cache().set_pending(key);
    }

    /// Copy of every entry, in key-hash order.
    pub fn snapshot(&self) -> Vec<Query> {
        self.cache().iter().cloned().collect()
    }

    /// Snapshot the successful entries.
    ///
    /// Failed and pending keys are left out; the browser fetches them itself,
    /// and loader error text never reaches the document.
    pub fn dehydrate(&self) -> DehydratedState {
        self.dehydrate_with(|q| q.state.is_success())
    }

    /// Snapshot the entries accepted by `filter`.
    pub fn dehydrate_with(&self, filter: impl Fn(&Query) -> bool) -> DehydratedState {
        DehydratedState::from_queries(self.cache().iter().filter(|q| filter(q)))
    }

    /// Merge a snapshot into the cache.
    ///
    /// An existing entry is only replaced when the snapshot's data is at
    /// least as recent as the local data.
    pub fn hydrate(&self, state: &DehydratedState) {
        let mut cache = self.cache();
        for query in &state.queries {
            let newer_locally = cache
                .get(&query.query_key)
                .is_some_and(|q| q.state.data_updated_at > query.state.data_updated_at);
            if !newer_locally {
                cache.insert(query.query_key.clone(), query.state.clone());
            }
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.cache().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cache().clear();
    }

    fn cache(&self) -> MutexGuard<'_, QueryCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryStatus;
    use serde_json::json;

    #[test]
    fn test_clones_share_cache() {
        let client = QueryClient::new();
        let handle = client.clone();
        handle.set_query_data(&QueryKey::named("a"), json!(1));

        assert_eq!(client.get_query_data(&QueryKey::named("a")), Some(json!(1)));
    }

    #[test]
    fn test_separate_clients_are_isolated() {
        let a = QueryClient::new();
        let b = QueryClient::new();
        a.set_query_data(&QueryKey::named("home"), json!("a"));

        assert!(b.get_query_data(&QueryKey::named("home")).is_none());
        assert!(b.is_empty());
    }

    #[test]
    fn test_typed_lookup() {
        let client = QueryClient::new();
        client.set_query_data(&QueryKey::named("n"), json!([1, 2, 3]));

        let values: Option<Vec<u32>> = client.get_query_data_as(&QueryKey::named("n"));
        assert_eq!(values, Some(vec![1, 2, 3]));
        let wrong: Option<String> = client.get_query_data_as(&QueryKey::named("n"));
        assert!(wrong.is_none());
    }

    #[test]
    fn test_dehydrate_ships_only_successful_entries() {
        let client = QueryClient::new();
        client.mark_pending(&QueryKey::named("slow"));
        client.set_query_data(&QueryKey::named("fast"), json!(true));
        client.set_query_error(&QueryKey::named("bad"), "connect refused", 1);

        let state = client.dehydrate();
        let keys: Vec<String> = state.queries.iter().map(|q| q.query_hash.clone()).collect();
        assert_eq!(keys, vec![r#"["fast"]"#]);
        assert!(!serde_json::to_string(&state).unwrap().contains("connect refused"));

        let all = client.dehydrate_with(|q| q.state.is_settled());
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_hydrate_keeps_newer_local_data() {
        let key = QueryKey::named("home");
        let server = QueryClient::new();
        server.set_query_data(&key, json!("server"));
        let snapshot = server.dehydrate();

        let client = QueryClient::with_options(ClientQueryOptions::browser());
        let mut newer = QueryState::pending();
        newer.status = QueryStatus::Success;
        newer.data = Some(json!("local"));
        newer.data_updated_at = i64::MAX;
        client.cache().insert(key.clone(), newer);

        client.hydrate(&snapshot);
        assert_eq!(client.get_query_data(&key), Some(json!("local")));
    }

    #[test]
    fn test_browser_defaults() {
        let options = ClientQueryOptions::browser();
        assert_eq!(options.retry, 1);
        assert_eq!(options.retry_delay, Duration::from_millis(1000));
        assert!(!options.refetch_on_window_focus);
    }
}
