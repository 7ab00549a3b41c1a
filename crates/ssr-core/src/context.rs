//! Request context with typed parameters.

use std::collections::HashMap;

use http::Method;

use crate::lifecycle::TimingContext;

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create from an existing ID string (e.g. an inbound `x-request-id`).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extracted route parameters (e.g., `:id` from `/products/:id`).
pub type RouteParams = HashMap<String, String>;

/// Query string parameters.
pub type QueryParams = HashMap<String, String>;

/// HTTP headers.
pub type Headers = HashMap<String, String>;

/// Request context created once per incoming request.
///
/// Everything request-scoped hangs off this value; nothing in it is shared
/// with another request.
#[derive(Debug)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Request path, without the query string.
    pub path: String,
    /// Query string parameters.
    pub query: QueryParams,
    /// HTTP headers.
    pub headers: Headers,
    /// Timing context for observability.
    pub timing: TimingContext,
}

impl RequestContext {
    /// Create a new request context from a path that may carry a query string.
    pub fn new(method: Method, path_and_query: impl AsRef<str>) -> Self {
        let (path, query) = split_path_and_query(path_and_query.as_ref());
        Self {
            request_id: RequestId::generate(),
            method,
            path,
            query,
            headers: HashMap::new(),
            timing: TimingContext::new(),
        }
    }

    /// Replace the generated request ID.
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Attach request headers.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Get a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(|s| s.as_str())
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn split_path_and_query(raw: &str) -> (String, QueryParams) {
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw, ""),
    };

    let path = if path.is_empty() { "/" } else { path };

    let query = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect();

    (path.to_string(), query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_context_splits_query_string() {
        let ctx = RequestContext::new(Method::GET, "/en/markets?sort=desc&flag");

        assert_eq!(ctx.path, "/en/markets");
        assert_eq!(ctx.query_param("sort"), Some("desc"));
        assert_eq!(ctx.query_param("flag"), Some(""));
        assert_eq!(ctx.query_param("missing"), None);
    }

    #[test]
    fn test_context_empty_path_is_root() {
        let ctx = RequestContext::new(Method::GET, "?a=1");
        assert_eq!(ctx.path, "/");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("X-Request-Id".to_string(), "abc".to_string());
        let ctx = RequestContext::new(Method::GET, "/").with_headers(headers);

        assert_eq!(ctx.header("x-request-id"), Some("abc"));
    }
}
