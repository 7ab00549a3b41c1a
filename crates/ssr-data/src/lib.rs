//! Data layer for the streaming SSR pipeline.
//!
//! This crate provides:
//! - `QueryClient` - Request-scoped handle to a query cache
//! - `DehydratedState` - JSON snapshot of a cache, embedded in the document
//! - `prefetch` - Route-matched loader fan-out before rendering
//! - `RetryPolicy` - Retry strategies for loaders
//! - Embedded script helpers (`AppFlag`, element IDs, script-safe JSON)

mod cache;
mod client;
mod dehydrate;
mod embed;
mod prefetch;
mod retry;

pub use cache::*;
pub use client::*;
pub use dehydrate::*;
pub use embed::*;
pub use prefetch::*;
pub use retry::*;
