//! Renderer seam.

use futures::stream::BoxStream;
use ssr_core::{RouteMatch, RouteParams};
use ssr_data::QueryClient;

use crate::assets::ChunkCollector;
use crate::head::MetaContext;

/// Error reported by a renderer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RenderError(pub String);

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Progress signals emitted by a streaming renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderSignal {
    /// The synchronous shell is ready; carries its markup.
    ShellReady(String),
    /// Markup for a boundary that resolved after the shell.
    Chunk(String),
    /// Every boundary resolved.
    AllReady,
    /// Rendering failed.
    Error(RenderError),
}

/// Signal stream of one render. Dropping it cancels the render.
pub type RenderStream = BoxStream<'static, RenderSignal>;

/// Inputs handed to a renderer for one request.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Request path.
    pub path: String,
    /// Parameters of the deepest matched route.
    pub params: RouteParams,
    /// IDs of the matched routes, outermost first.
    pub route_ids: Vec<String>,
    /// Request-scoped cache, already prefetched.
    pub client: QueryClient,
    /// Head metadata collector.
    pub head: MetaContext,
    /// Code-split chunk collector.
    pub chunks: ChunkCollector,
}

impl RenderContext {
    /// Create a context with no matched routes.
    pub fn new(path: impl Into<String>, client: QueryClient) -> Self {
        Self {
            path: path.into(),
            params: RouteParams::new(),
            route_ids: Vec::new(),
            client,
            head: MetaContext::default(),
            chunks: ChunkCollector::new(),
        }
    }

    /// Take params and route IDs from a matched branch.
    pub fn with_matches(mut self, matches: &[RouteMatch<'_>]) -> Self {
        if let Some(leaf) = matches.last() {
            self.params = leaf.params.clone();
        }
        self.route_ids = matches
            .iter()
            .filter_map(|m| m.route.id.clone())
            .collect();
        self
    }

    /// Seed the head collector.
    pub fn with_head(mut self, head: MetaContext) -> Self {
        self.head = head;
        self
    }

    /// Whether a route with `id` matched.
    pub fn matched(&self, id: &str) -> bool {
        self.route_ids.iter().any(|r| r == id)
    }
}

/// A streaming page renderer.
pub trait PageRenderer: Send + Sync {
    /// Start rendering. The returned stream must emit `ShellReady` before any
    /// `Chunk`, and end with `AllReady` or `Error`.
    fn render(&self, ctx: RenderContext) -> RenderStream;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssr_core::{RouteDescriptor, RouteTable};

    #[test]
    fn test_context_from_matches() {
        let table = RouteTable::new(vec![RouteDescriptor::new("/:locale?")
            .with_id("layout")
            .child(RouteDescriptor::new("coin/:symbol").with_id("coin"))])
        .unwrap();
        let matches = table.match_path("/en/coin/btc").unwrap();

        let ctx = RenderContext::new("/en/coin/btc", QueryClient::new()).with_matches(&matches);

        assert_eq!(ctx.route_ids, vec!["layout", "coin"]);
        assert_eq!(ctx.params.get("symbol").map(String::as_str), Some("btc"));
        assert_eq!(ctx.params.get("locale").map(String::as_str), Some("en"));
        assert!(ctx.matched("coin"));
        assert!(!ctx.matched("home"));
    }
}
