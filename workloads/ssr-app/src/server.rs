//! HTTP server: per-request SSR pipeline.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use ssr_sdk::prelude::*;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::pages::{self, DemoRenderer};

/// Content type of rendered pages.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Request ID header, accepted from the client and echoed back.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Body chunks buffered between the render task and the connection.
const BODY_BUFFER: usize = 16;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub renderer: Arc<dyn PageRenderer>,
    pub coordinator: StreamCoordinator,
    pub prefetch: PrefetchOptions,
    /// Assets served under `(public_path, dir)`.
    pub static_files: Option<(String, PathBuf)>,
}

impl AppState {
    /// Create state with default pipeline options.
    pub fn new(
        routes: RouteTable,
        renderer: impl PageRenderer + 'static,
        coordinator: StreamCoordinator,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            renderer: Arc::new(renderer),
            coordinator,
            prefetch: PrefetchOptions::default(),
            static_files: None,
        }
    }

    /// Set prefetch options.
    pub fn with_prefetch(mut self, options: PrefetchOptions) -> Self {
        self.prefetch = options;
        self
    }

    /// Build the demo app from configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let manifest = match &config.assets.manifest_path {
            Some(path) => AssetManifest::load(path)
                .with_context(|| format!("Failed to load asset manifest: {}", path.display()))?,
            None => pages::default_manifest(&config.assets.public_path),
        };
        let coordinator = StreamCoordinator::new(Arc::new(manifest))
            .with_timeout(config.render_timeout())
            .with_flush_policy(config.render.flush_policy);

        let mut prefetch = PrefetchOptions::default();
        if let Some(timeout) = config.prefetch_timeout() {
            prefetch = prefetch.with_loader_timeout(timeout);
        }

        let routes = pages::routes().context("Invalid route table")?;
        let mut state = Self::new(routes, DemoRenderer, coordinator).with_prefetch(prefetch);
        state.static_files = config
            .assets
            .dir
            .clone()
            .map(|dir| (config.assets.public_path.clone(), dir));
        Ok(state)
    }
}

/// Build the router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(render_handler))
        .route("/{*path}", get(render_handler));

    if let Some((public_path, dir)) = &state.static_files {
        let mount = format!("/{}", public_path.trim_matches('/'));
        router = router.nest_service(&mount, ServeDir::new(dir));
    }

    router.with_state(state).layer(TraceLayer::new_for_http())
}

/// Render a page.
///
/// Prefetch runs to completion on the request task. The render itself runs
/// on a spawned task that writes into a channel; the response is returned as
/// soon as that task commits a status, and the body streams from the channel.
pub async fn render_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request_id = headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(RequestId::from_string)
        .unwrap_or_else(RequestId::generate);

    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let ctx = RequestContext::new(method, path_and_query)
        .with_request_id(request_id.clone())
        .with_headers(
            headers
                .iter()
                .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
                .collect(),
        );

    let logger = RequestLogger::new(request_id.clone()).with_route(ctx.path.clone());
    let mut monitor = PerformanceMonitor::new(request_id.clone());
    monitor.set_route(ctx.path.clone());
    let observer = Arc::new(RequestObserver::new(logger, monitor));
    observer.logger().debug("request started").emit();

    // One client per request; it is dropped with the render task.
    let client = QueryClient::new();
    let report = prefetch(&state.routes, &ctx.path, &client, &state.prefetch).await;
    observer.on_event(
        LifecycleEvent::PrefetchComplete {
            fetched: report.fetched,
            failed: report.failed,
        },
        ctx.timing.elapsed(),
    );

    let mut render_ctx = RenderContext::new(ctx.path.clone(), client);
    if let Some(matches) = state.routes.match_path(&ctx.path) {
        render_ctx = render_ctx.with_matches(&matches);
    }
    let stream = state.renderer.render(render_ctx.clone());

    let (writer, receiver) = response_channel(BODY_BUFFER);
    let coordinator = state.coordinator.clone();
    let task_observer = observer.clone();
    tokio::spawn(async move {
        let outcome = coordinator
            .run(&render_ctx, stream, writer, task_observer.as_ref())
            .await;
        task_observer.finish(Some(status_of(&outcome).as_u16()));
        render_ctx.client.clear();
    });

    let ResponseReceiver { head, body } = receiver;
    let status = match head.await {
        Ok(status) => status,
        Err(_) => {
            observer
                .logger()
                .error("render task ended without a response status")
                .emit();
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let body = Body::from_stream(body.map(Ok::<_, Infallible>));
    let mut response = (status, [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)], body).into_response();
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

/// Status line a render outcome committed.
pub fn status_of(outcome: &RenderOutcome) -> StatusCode {
    match outcome {
        RenderOutcome::Completed { .. } | RenderOutcome::StreamFailed(_) => StatusCode::OK,
        RenderOutcome::TimedOut { shell_sent: true } => StatusCode::OK,
        RenderOutcome::TimedOut { shell_sent: false } => StatusCode::REQUEST_TIMEOUT,
        RenderOutcome::ShellFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Resolve when the process is asked to stop.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
