//! `ssr-app` - streaming SSR server binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ssr_app::config::ServerConfig;
use ssr_app::server::{build_router, shutdown_signal, AppState};
use ssr_sdk::ssr_observability::LogFormat;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "ssr-app")]
#[command(about = "Streaming server-side rendering demo")]
#[command(version)]
struct Cli {
    /// Path to a TOML or JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket address to bind, overrides config and PORT
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    config.apply_env()?;
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    init_tracing(&config);
    tracing::info!("ssr-app v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.server.bind_address,
        render_timeout_ms = config.render.timeout_ms,
        flush_policy = ?config.render.flush_policy,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config)?;
    let app = build_router(state);

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));

    let (json, pretty) = match config.logging.format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
}
