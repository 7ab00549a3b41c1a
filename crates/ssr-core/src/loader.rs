//! Route-level data loaders.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::context::RouteParams;

/// Error returned by a loader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    #[error("loader failed: {0}")]
    Failed(String),

    #[error("loader timed out after {0:?}")]
    Timeout(Duration),

    #[error("loader result is not JSON-representable: {0}")]
    Serialize(String),
}

impl LoaderError {
    /// Create a generic failure from any displayable error.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Loads the data a route needs, given the route's extracted parameters.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Run the loader.
    async fn load(&self, params: &RouteParams) -> Result<Value, LoaderError>;
}

/// Loader backed by an async function.
pub struct FnLoader<F>(F);

#[async_trait]
impl<F, Fut, T> Loader for FnLoader<F>
where
    F: Fn(RouteParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, LoaderError>> + Send,
    T: Serialize + Send,
{
    async fn load(&self, params: &RouteParams) -> Result<Value, LoaderError> {
        let data = (self.0)(params.clone()).await?;
        serde_json::to_value(data).map_err(|e| LoaderError::Serialize(e.to_string()))
    }
}

/// Wrap an async function as a [`Loader`].
///
/// ```rust,ignore
/// let loader = loader_fn(|params| async move {
///     Ok::<_, LoaderError>(vec![params.get("id").cloned()])
/// });
/// ```
pub fn loader_fn<F, Fut, T>(f: F) -> FnLoader<F>
where
    F: Fn(RouteParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, LoaderError>> + Send,
    T: Serialize + Send,
{
    FnLoader(f)
}
