//! Public SDK for the streaming SSR pipeline.
//!
//! This crate re-exports all platform functionality:
//!
//! ```ignore
//! use ssr_sdk::prelude::*;
//!
//! let table = RouteTable::new(vec![RouteDescriptor::new("/:locale?")
//!     .child(RouteDescriptor::index().with_data("home", loader_fn(load_coins)))])?;
//!
//! let client = QueryClient::new();
//! let report = prefetch(&table, ctx.path.as_str(), &client, &PrefetchOptions::default()).await;
//!
//! let render = RenderContext::new(ctx.path.clone(), client);
//! let stream = renderer.render(render.clone());
//! let outcome = coordinator.run(&render, stream, writer, &observer).await;
//! ```

pub use ssr_core;
pub use ssr_data;
pub use ssr_hydrate;
pub use ssr_observability;
pub use ssr_streaming;

/// Prelude for convenient imports.
pub mod prelude {
    pub use ssr_core::*;
    pub use ssr_data::*;
    pub use ssr_hydrate::*;
    pub use ssr_observability::*;
    pub use ssr_streaming::*;
}
