//! Streaming primitives for shell-first SSR.
//!
//! This crate enforces shell-first streaming patterns:
//! - `render_head` / `render_tail` - Document template fragments
//! - `DocumentHead` / `MetaContext` - Per-request document metadata
//! - `AssetManifest` / `ChunkCollector` - Code-split asset resolution
//! - `ResponseWriter` - Transport the response is written to
//! - `StreamingSink` - State-machine guarded writes
//! - `StreamCoordinator` - Drives a renderer under a wall-clock deadline

mod assets;
mod coordinator;
mod flush;
mod head;
mod renderer;
mod sink;
mod template;
mod writer;

pub use assets::*;
pub use coordinator::*;
pub use flush::*;
pub use head::*;
pub use renderer::*;
pub use sink::*;
pub use template::*;
pub use writer::*;
