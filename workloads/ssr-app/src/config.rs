//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use ssr_sdk::ssr_observability::LogFormat;
use ssr_sdk::ssr_streaming::{FlushPolicy, DEFAULT_RENDER_TIMEOUT};

/// Server configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub assets: AssetsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Load config from a file (TOML, or JSON by extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply a `PORT` value: the bind address keeps its host and takes the port.
    pub fn apply_port(&mut self, port: &str) -> Result<()> {
        let port: u16 = port
            .trim()
            .parse()
            .with_context(|| format!("Invalid PORT value: {:?}", port))?;
        let host = self
            .server
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or("0.0.0.0");
        self.server.bind_address = format!("{}:{}", host, port);
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.apply_port(&port)?;
        }
        Ok(())
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.render.timeout_ms == 0 {
            bail!("render.timeout_ms must be greater than zero");
        }
        if self.render.prefetch_timeout_ms == Some(0) {
            bail!("render.prefetch_timeout_ms must be greater than zero");
        }
        if self.server.bind_address.trim().is_empty() {
            bail!("server.bind_address must not be empty");
        }
        Ok(())
    }

    /// Render deadline.
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render.timeout_ms)
    }

    /// Per-loader deadline.
    pub fn prefetch_timeout(&self) -> Option<Duration> {
        self.render.prefetch_timeout_ms.map(Duration::from_millis)
    }

    /// Default `EnvFilter` directives when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> String {
        let level = &self.logging.level;
        format!("ssr_app={level},ssr={level},tower_http={level}")
    }
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

/// Render pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Wall-clock budget for one render, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// When post-shell chunks are flushed.
    #[serde(default)]
    pub flush_policy: FlushPolicy,

    /// Optional per-loader deadline, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefetch_timeout_ms: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            flush_policy: FlushPolicy::default(),
            prefetch_timeout_ms: None,
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_RENDER_TIMEOUT.as_millis() as u64
}

/// Client asset configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Build manifest (chunk name to files); a built-in one is used if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,

    /// URL prefix of the client assets.
    #[serde(default = "default_public_path")]
    pub public_path: String,

    /// Directory served under `public_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            manifest_path: None,
            public_path: default_public_path(),
            dir: None,
        }
    }
}

fn default_public_path() -> String {
    "/static/".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// Level used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
