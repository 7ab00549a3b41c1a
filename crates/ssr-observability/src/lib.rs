//! Observability for the streaming SSR pipeline.
//!
//! This crate provides:
//! - `RequestLogger` - Per-request log records emitted through `tracing`
//! - `PerformanceMonitor` - Prefetch / shell / render timings for one request
//! - `RequestObserver` - Lifecycle observer feeding both

mod logging;
mod metrics;
mod observer;

pub use logging::*;
pub use metrics::*;
pub use observer::*;

// Re-export RequestId from ssr-core for convenience
pub use ssr_core::RequestId;
