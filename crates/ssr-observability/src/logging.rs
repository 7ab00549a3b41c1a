//! Per-request logging.
//!
//! A [`RequestLogger`] stamps every record with the request id, the route and
//! the time since the request started, then hands it to `tracing` under the
//! `ssr` target. Filtering and output format belong to the process
//! subscriber.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ssr_core::RequestId;

/// Tracing target of request records.
pub const LOG_TARGET: &str = "ssr";

/// Severity of a request record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of the process log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable lines.
    #[default]
    Pretty,
}

/// One request log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
    /// Microseconds since the logger was created.
    pub elapsed_us: u64,
}

impl LogRecord {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }

    /// Fields as space separated `key=value` pairs, strings unquoted.
    pub fn fields_logfmt(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            match value {
                Value::String(s) => out.push_str(&format!("{key}={s}")),
                other => out.push_str(&format!("{key}={other}")),
            }
        }
        out
    }

    fn dispatch(&self) {
        let route = self.route.as_deref().unwrap_or("-");
        let fields = self.fields_logfmt();
        let (request_id, message, elapsed_us) = (&self.request_id, &self.message, self.elapsed_us);

        macro_rules! at {
            ($level:expr) => {
                tracing::event!(
                    target: LOG_TARGET,
                    $level,
                    request_id = %request_id,
                    route,
                    elapsed_us,
                    fields = %fields,
                    "{}",
                    message
                )
            };
        }

        match self.severity {
            Severity::Trace => at!(tracing::Level::TRACE),
            Severity::Debug => at!(tracing::Level::DEBUG),
            Severity::Info => at!(tracing::Level::INFO),
            Severity::Warn => at!(tracing::Level::WARN),
            Severity::Error => at!(tracing::Level::ERROR),
        }
    }
}

/// Logger bound to one request.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    request_id: RequestId,
    route: Option<String>,
    started: Instant,
    threshold: Severity,
}

impl RequestLogger {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            route: None,
            started: Instant::now(),
            threshold: Severity::Trace,
        }
    }

    /// Attach the request route to every record.
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Drop records below `severity`.
    pub fn with_threshold(mut self, severity: Severity) -> Self {
        self.threshold = severity;
        self
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Start a record; nothing is logged until [`LogEvent::emit`].
    pub fn event(&self, severity: Severity, message: impl Into<String>) -> LogEvent<'_> {
        LogEvent {
            logger: self,
            severity,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn debug(&self, message: impl Into<String>) -> LogEvent<'_> {
        self.event(Severity::Debug, message)
    }

    pub fn info(&self, message: impl Into<String>) -> LogEvent<'_> {
        self.event(Severity::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> LogEvent<'_> {
        self.event(Severity::Warn, message)
    }

    pub fn error(&self, message: impl Into<String>) -> LogEvent<'_> {
        self.event(Severity::Error, message)
    }
}

/// A record being built.
#[must_use = "a log event does nothing until emitted"]
pub struct LogEvent<'a> {
    logger: &'a RequestLogger,
    severity: Severity,
    message: String,
    fields: BTreeMap<String, Value>,
}

impl LogEvent<'_> {
    /// Attach a field; a repeated key keeps the last value.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Attach a duration as fractional milliseconds.
    pub fn with_ms(self, key: &str, duration: Duration) -> Self {
        self.with(key, duration.as_micros() as f64 / 1000.0)
    }

    /// The record this event would emit, `None` below the logger threshold.
    pub fn record(self) -> Option<LogRecord> {
        if self.severity < self.logger.threshold {
            return None;
        }
        Some(LogRecord {
            severity: self.severity,
            message: self.message,
            request_id: self.logger.request_id.to_string(),
            route: self.logger.route.clone(),
            fields: self.fields,
            elapsed_us: self.logger.started.elapsed().as_micros() as u64,
        })
    }

    pub fn emit(self) {
        if let Some(record) = self.record() {
            record.dispatch();
        }
    }
}
