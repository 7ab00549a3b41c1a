//! Serializable snapshot of a query cache.

use serde::{Deserialize, Serialize};
use ssr_core::QueryKey;

use crate::cache::{Query, QueryState};

/// One dehydrated cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DehydratedQuery {
    /// The entry's key.
    pub query_key: QueryKey,
    /// Hash of the key at dehydration time.
    pub query_hash: String,
    /// Entry state.
    pub state: QueryState,
}

/// Snapshot of a query cache, embedded in the document by the server and
/// used by the browser to seed its own cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DehydratedState {
    /// Dehydrated entries.
    #[serde(default)]
    pub queries: Vec<DehydratedQuery>,
}

impl DehydratedState {
    /// An empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from cache entries.
    pub fn from_queries<'a>(queries: impl IntoIterator<Item = &'a Query>) -> Self {
        Self {
            queries: queries
                .into_iter()
                .map(|q| DehydratedQuery {
                    query_key: q.key.clone(),
                    query_hash: q.key.hash(),
                    state: q.state.clone(),
                })
                .collect(),
        }
    }

    /// Look up an entry's state by key.
    pub fn get(&self, key: &QueryKey) -> Option<&QueryState> {
        let hash = key.hash();
        self.queries
            .iter()
            .find(|q| q.query_key.hash() == hash)
            .map(|q| &q.state)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientQueryOptions, QueryClient};
    use crate::embed::{parse_script_json, to_script_json};
    use serde_json::json;

    #[test]
    fn test_cache_survives_server_to_client_trip() {
        let server = QueryClient::new();
        server.set_query_data(
            &QueryKey::named("home"),
            json!([{"key": 1, "content": "BTC"}, {"key": 2, "content": "</script><b>"}]),
        );
        server.set_query_data(
            &QueryKey::named("product").with(json!({"id": 7})),
            json!({"price": 1.5, "tags": [null, true, "x\u{2028}y"]}),
        );

        let embedded = to_script_json(&server.dehydrate()).unwrap();
        let restored: DehydratedState = parse_script_json(&embedded).unwrap();
        let client = QueryClient::from_dehydrated(&restored, ClientQueryOptions::browser());

        assert_eq!(client.snapshot(), server.snapshot());
    }

    #[test]
    fn test_null_result_survives_server_to_client_trip() {
        let server = QueryClient::new();
        server.set_query_data(&QueryKey::named("n"), serde_json::Value::Null);
        server.set_query_data(&QueryKey::named("list"), json!([null]));

        let embedded = to_script_json(&server.dehydrate()).unwrap();
        let restored: DehydratedState = parse_script_json(&embedded).unwrap();
        let client = QueryClient::from_dehydrated(&restored, ClientQueryOptions::browser());

        assert_eq!(client.get_query_data(&QueryKey::named("n")), Some(serde_json::Value::Null));
        assert_eq!(client.snapshot(), server.snapshot());
    }

    #[test]
    fn test_failed_entry_is_not_embedded() {
        let server = QueryClient::new();
        server.set_query_data(&QueryKey::named("home"), json!([]));
        server.set_query_error(&QueryKey::named("reviews"), "upstream down", 1);

        let embedded = to_script_json(&server.dehydrate()).unwrap();
        assert!(!embedded.contains("upstream down"));

        let restored: DehydratedState = parse_script_json(&embedded).unwrap();
        let client = QueryClient::from_dehydrated(&restored, ClientQueryOptions::browser());
        assert!(client.get_query_state(&QueryKey::named("reviews")).is_none());
        assert_eq!(client.len(), 1);
    }

    #[test]
    fn test_missing_queries_field_is_empty() {
        let state: DehydratedState = serde_json::from_str("{}").unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_get_by_key() {
        let server = QueryClient::new();
        server.set_query_data(&QueryKey::named("home"), json!(1));
        let state = server.dehydrate();

        assert_eq!(state.get(&QueryKey::named("home")).unwrap().data, Some(json!(1)));
        assert!(state.get(&QueryKey::named("other")).is_none());
    }
}
