//! Core abstractions for the streaming SSR pipeline.
//!
//! This crate provides the fundamental types and traits:
//! - `RequestContext` - Per-request identity, path and timing
//! - `RouteTable` / `RouteDescriptor` - Nested route matching with typed data bindings
//! - `Loader` trait - Route-level data loading
//! - `QueryKey` - Cache keys shared by loaders and the query cache
//! - `RenderPhase` - Streaming render state machine

mod context;
mod key;
mod lifecycle;
mod loader;
mod route;

pub use context::*;
pub use key::*;
pub use lifecycle::*;
pub use loader::*;
pub use route::*;
