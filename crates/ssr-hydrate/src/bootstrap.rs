//! Client startup: restore the cache, then hydrate or mount.

use std::future::Future;

use ssr_data::{ClientQueryOptions, QueryClient, ROOT_ID};

use crate::document::Document;
use crate::state::EmbeddedState;

/// Error raised by a [`Mounter`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MountError(pub String);

/// Fatal bootstrap errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("root element #{0} not found")]
    RootNotFound(String),

    #[error("mount failed: {0}")]
    Mount(#[from] MountError),
}

/// How the app was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// Attached to server-rendered markup.
    Hydrate,
    /// Rendered from scratch.
    Mount,
}

/// Result of a successful bootstrap.
#[derive(Debug, Clone)]
pub struct BootReport {
    pub mode: BootMode,
    /// Entries restored from the dehydrated state.
    pub restored_queries: usize,
    /// The page-load client handed to the app.
    pub client: QueryClient,
}

/// Attaches the application to the root element.
pub trait Mounter {
    /// Attach to existing server-rendered markup.
    fn hydrate(&mut self, root_id: &str, client: QueryClient) -> Result<(), MountError>;

    /// Render into an empty (or discarded) root.
    fn mount(&mut self, root_id: &str, client: QueryClient) -> Result<(), MountError>;
}

/// Start the client.
///
/// The embedded blobs are read before anything is awaited. A server-rendered
/// document waits for `assets_ready` (every referenced chunk loaded) before
/// hydrating; a client-rendered one mounts immediately. Only a missing root
/// element or a failing mounter is fatal.
pub async fn bootstrap<D, M, F>(
    doc: &D,
    mounter: &mut M,
    assets_ready: F,
) -> Result<BootReport, BootstrapError>
where
    D: Document,
    M: Mounter,
    F: Future<Output = ()>,
{
    let embedded = EmbeddedState::read(doc);
    let client = QueryClient::from_dehydrated(&embedded.state, ClientQueryOptions::browser());
    let restored_queries = client.len();

    if !doc.contains(ROOT_ID) {
        return Err(BootstrapError::RootNotFound(ROOT_ID.to_string()));
    }

    let mode = if embedded.flag.is_ssr {
        assets_ready.await;
        mounter.hydrate(ROOT_ID, client.clone())?;
        BootMode::Hydrate
    } else {
        mounter.mount(ROOT_ID, client.clone())?;
        BootMode::Mount
    };

    tracing::debug!(?mode, restored_queries, "client bootstrapped");

    Ok(BootReport {
        mode,
        restored_queries,
        client,
    })
}
