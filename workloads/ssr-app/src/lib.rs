//! Streaming SSR demo server.
//!
//! Serves the demo pages through the full pipeline: per-request prefetch,
//! streamed render under a deadline, and the hydration bootstrap blobs.

pub mod config;
pub mod pages;
pub mod server;

pub use config::ServerConfig;
pub use server::{build_router, render_handler, shutdown_signal, AppState};
