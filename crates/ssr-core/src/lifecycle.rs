//! Render lifecycle tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// States of a streaming render.
///
/// ```text
/// Idle -> ShellPending -> ShellSent -> Streaming -> Completed
///              |              |           |
///              +--------------+-----------+-----> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPhase {
    /// Nothing started yet.
    Idle,
    /// Render started, no byte written to the client.
    ShellPending,
    /// Head and shell markup flushed; status is committed.
    ShellSent,
    /// At least one chunk flushed after the shell.
    Streaming,
    /// Tail written and the response finished.
    Completed,
    /// Render ended without completing (shell error, stream error, timeout).
    Failed,
}

/// Error for a transition the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal render transition {from:?} -> {to:?}")]
pub struct PhaseError {
    pub from: RenderPhase,
    pub to: RenderPhase,
}

impl RenderPhase {
    /// Check whether `self -> to` is a legal transition.
    pub fn can_transition_to(self, to: RenderPhase) -> bool {
        use RenderPhase::*;
        matches!(
            (self, to),
            (Idle, ShellPending)
                | (Idle, Failed)
                | (ShellPending, ShellSent)
                | (ShellPending, Failed)
                | (ShellSent, Streaming)
                | (ShellSent, Completed)
                | (ShellSent, Failed)
                | (Streaming, Streaming)
                | (Streaming, Completed)
                | (Streaming, Failed)
        )
    }

    /// Move to `to`, or report the illegal transition.
    pub fn transition(self, to: RenderPhase) -> Result<RenderPhase, PhaseError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(PhaseError { from: self, to })
        }
    }

    /// Whether bytes (and therefore the status line) have reached the client.
    pub fn headers_committed(self) -> bool {
        matches!(self, Self::ShellSent | Self::Streaming | Self::Completed)
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Observable events of a request's render pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Route loaders settled.
    PrefetchComplete { fetched: usize, failed: usize },
    /// Head and shell flushed to the client.
    ShellSent,
    /// An incremental chunk was flushed.
    ChunkSent { bytes: usize },
    /// Tail written, response finished.
    Completed,
    /// The renderer failed before the shell; a 500 was returned.
    ShellError(String),
    /// The renderer failed after the shell; the stream was ended.
    StreamError(String),
    /// The render deadline passed.
    TimedOut { shell_sent: bool },
}

/// Timing context for observability.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark.
    pub fn mark(&mut self, name: &str) {
        self.marks.insert(name.to_string(), Instant::now());
    }

    /// Time from start to a recorded mark.
    pub fn since_start(&self, name: &str) -> Option<Duration> {
        self.marks
            .get(name)
            .map(|t| t.duration_since(self.start))
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get time to shell flush.
    pub fn time_to_shell(&self) -> Option<Duration> {
        self.since_start("shell_sent")
    }

    /// Get time until the prefetch phase settled.
    pub fn time_to_prefetch(&self) -> Option<Duration> {
        self.since_start("prefetch_complete")
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer trait for lifecycle events.
pub trait LifecycleObserver: Send + Sync {
    /// Called when a lifecycle event occurs.
    fn on_event(&self, event: LifecycleEvent, elapsed: Duration);
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LifecycleObserver for NoopObserver {
    fn on_event(&self, _event: LifecycleEvent, _elapsed: Duration) {}
}
