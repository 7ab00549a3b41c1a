//! Client bootstrap for server-rendered documents.
//!
//! This crate provides:
//! - `Document` - Lookup of elements by ID (`StaticDocument`, or `BrowserDocument` with the `browser` feature)
//! - `EmbeddedState` - Tolerant reading of the render flag and dehydrated state
//! - `bootstrap` - Restores the query cache and hydrates or mounts the app

mod bootstrap;
#[cfg(feature = "browser")]
mod browser;
mod document;
mod state;

pub use bootstrap::*;
#[cfg(feature = "browser")]
pub use browser::*;
pub use document::*;
pub use state::*;
