//! Explicit flush control for post-shell chunks.

use serde::{Deserialize, Serialize};

/// When markup produced after the shell reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlushPolicy {
    /// Flush the shell immediately, buffer later chunks until all-ready.
    #[default]
    AfterShell,
    /// Flush the shell and then every chunk as it arrives.
    AfterEachChunk,
}

impl FlushPolicy {
    /// Check if chunks are flushed before all-ready.
    pub fn flush_after_chunk(&self) -> bool {
        matches!(self, Self::AfterEachChunk)
    }
}

/// Controller for managing flush behavior.
#[derive(Debug)]
pub struct FlushController {
    policy: FlushPolicy,
    pending_bytes: usize,
    /// Minimum buffered bytes before an incremental flush (0 = every chunk).
    max_buffer: usize,
}

impl FlushController {
    /// Create a new flush controller with given policy.
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            pending_bytes: 0,
            max_buffer: 0,
        }
    }

    /// Set the buffer size that triggers an incremental flush.
    pub fn with_max_buffer(mut self, bytes: usize) -> Self {
        self.max_buffer = bytes;
        self
    }

    /// Record bytes added to buffer.
    pub fn add_bytes(&mut self, count: usize) {
        self.pending_bytes += count;
    }

    /// Check if the buffer should be flushed now.
    pub fn should_flush(&self) -> bool {
        self.policy.flush_after_chunk()
            && self.pending_bytes > 0
            && (self.max_buffer == 0 || self.pending_bytes >= self.max_buffer)
    }

    /// Reset pending byte count after flush.
    pub fn reset(&mut self) {
        self.pending_bytes = 0;
    }

    /// Get current policy.
    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }
}

impl Default for FlushController {
    fn default() -> Self {
        Self::new(FlushPolicy::default())
    }
}
