//! Per-request render timings.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use ssr_core::RequestId;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

const MIB: f64 = 1024.0 * 1024.0;

/// Memory held by the server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Resident set size.
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
}

impl MemoryUsage {
    /// Read the current process, `None` where the platform does not report it.
    pub fn sample() -> Option<Self> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        let process = system.process(pid)?;
        Some(Self {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        })
    }

    pub fn rss_mb(&self) -> f64 {
        self.rss_bytes as f64 / MIB
    }

    pub fn virtual_mb(&self) -> f64 {
        self.virtual_bytes as f64 / MIB
    }
}

/// Timings and counters of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Request ID for correlation.
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Request start to loaders settled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefetch_ms: Option<f64>,
    /// Request start to shell flushed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_ms: Option<f64>,
    /// Loaders settled to render finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_ms: Option<f64>,
    /// Request start to finalization.
    pub total_ms: f64,
    pub loaders_fetched: usize,
    pub loaders_failed: usize,
    /// Incremental chunks flushed after the shell.
    pub chunks: usize,
    /// Chunk bytes flushed after the shell.
    pub chunk_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Process memory when the request finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryUsage>,
}

impl PerformanceMetrics {
    /// Format as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Format as human-readable summary.
    pub fn to_summary(&self) -> String {
        let mut lines = vec![format!("Request: {}", self.request_id)];

        if let Some(ms) = self.prefetch_ms {
            lines.push(format!(
                "  Prefetch: {:.2}ms ({} fetched, {} failed)",
                ms, self.loaders_fetched, self.loaders_failed
            ));
        }
        if let Some(ms) = self.shell_ms {
            lines.push(format!("  Time to shell: {:.2}ms", ms));
        }
        if let Some(ms) = self.render_ms {
            lines.push(format!("  Render: {:.2}ms", ms));
        }
        lines.push(format!("  Total: {:.2}ms", self.total_ms));
        if let Some(memory) = self.memory {
            lines.push(format!(
                "  Memory: {:.0}MB resident, {:.0}MB virtual",
                memory.rss_mb(),
                memory.virtual_mb()
            ));
        }

        lines.join("\n")
    }
}

/// Collector for one request's timings.
#[derive(Debug)]
pub struct PerformanceMonitor {
    request_id: RequestId,
    route: Option<String>,
    start: Instant,
    prefetch_done: Option<Instant>,
    shell_sent: Option<Instant>,
    render_done: Option<Instant>,
    loaders_fetched: usize,
    loaders_failed: usize,
    chunks: usize,
    chunk_bytes: usize,
}

impl PerformanceMonitor {
    /// Start timing a request.
    pub fn new(request_id: RequestId) -> Self {
        Self::starting_at(request_id, Instant::now())
    }

    /// Start timing from an earlier instant.
    pub fn starting_at(request_id: RequestId, start: Instant) -> Self {
        Self {
            request_id,
            route: None,
            start,
            prefetch_done: None,
            shell_sent: None,
            render_done: None,
            loaders_fetched: 0,
            loaders_failed: 0,
            chunks: 0,
            chunk_bytes: 0,
        }
    }

    /// Set route path.
    pub fn set_route(&mut self, route: impl Into<String>) {
        self.route = Some(route.into());
    }

    /// Record that every loader settled.
    pub fn record_prefetch(&mut self, fetched: usize, failed: usize) {
        self.prefetch_done = Some(Instant::now());
        self.loaders_fetched = fetched;
        self.loaders_failed = failed;
    }

    /// Record shell sent.
    pub fn record_shell_sent(&mut self) {
        self.shell_sent = Some(Instant::now());
    }

    /// Record a flushed chunk.
    pub fn record_chunk(&mut self, bytes: usize) {
        self.chunks += 1;
        self.chunk_bytes += bytes;
    }

    /// Record that the render ended, successfully or not.
    pub fn record_render_done(&mut self) {
        if self.render_done.is_none() {
            self.render_done = Some(Instant::now());
        }
    }

    /// Time-to-shell so far.
    pub fn time_to_shell(&self) -> Option<Duration> {
        self.shell_sent.map(|t| t.duration_since(self.start))
    }

    /// Total elapsed time.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Produce the metrics snapshot.
    pub fn finalize(&self, status_code: Option<u16>) -> PerformanceMetrics {
        let now = Instant::now();
        let since_start = |t: Instant| ms(t.duration_since(self.start));

        let render_ms = self.render_done.map(|done| {
            let from = self.prefetch_done.unwrap_or(self.start);
            ms(done.duration_since(from))
        });

        PerformanceMetrics {
            request_id: self.request_id.to_string(),
            route: self.route.clone(),
            prefetch_ms: self.prefetch_done.map(since_start),
            shell_ms: self.shell_sent.map(since_start),
            render_ms,
            total_ms: ms(now.duration_since(self.start)),
            loaders_fetched: self.loaders_fetched,
            loaders_failed: self.loaders_failed,
            chunks: self.chunks,
            chunk_bytes: self.chunk_bytes,
            status_code,
            memory: MemoryUsage::sample(),
        }
    }
}

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_are_ordered() {
        let mut monitor = PerformanceMonitor::new(RequestId::from_string("r"));
        monitor.set_route("/");
        monitor.record_prefetch(2, 1);
        monitor.record_shell_sent();
        monitor.record_chunk(10);
        monitor.record_chunk(5);
        monitor.record_render_done();

        let metrics = monitor.finalize(Some(200));

        let prefetch = metrics.prefetch_ms.unwrap();
        let shell = metrics.shell_ms.unwrap();
        assert!(prefetch <= shell);
        assert!(shell <= metrics.total_ms);
        assert!(metrics.render_ms.unwrap() <= metrics.total_ms);
        assert_eq!((metrics.chunks, metrics.chunk_bytes), (2, 15));
        assert_eq!((metrics.loaders_fetched, metrics.loaders_failed), (2, 1));
        assert_eq!(metrics.status_code, Some(200));
    }

    #[test]
    fn test_unrecorded_phases_are_absent() {
        let monitor = PerformanceMonitor::new(RequestId::from_string("r"));
        let metrics = monitor.finalize(Some(408));

        assert_eq!(metrics.shell_ms, None);
        assert_eq!(metrics.render_ms, None);
        let json: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert!(json.get("shell_ms").is_none());
        assert_eq!(json["status_code"], 408);
    }

    #[test]
    fn test_memory_is_sampled_at_finalize() {
        let metrics = PerformanceMonitor::new(RequestId::from_string("r")).finalize(Some(200));

        if cfg!(target_os = "linux") {
            let memory = metrics.memory.unwrap();
            assert!(memory.rss_bytes > 0);
            assert!(memory.virtual_bytes >= memory.rss_bytes);

            let json: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
            assert_eq!(json["memory"]["rss_bytes"], memory.rss_bytes);
            assert!(metrics.to_summary().contains("MB resident"));
        }
    }

    #[test]
    fn test_summary_formats_memory_in_mb() {
        let mut metrics = PerformanceMonitor::new(RequestId::from_string("m")).finalize(None);
        metrics.memory = Some(MemoryUsage {
            rss_bytes: 48 * 1024 * 1024,
            virtual_bytes: 512 * 1024 * 1024,
        });

        assert!(metrics
            .to_summary()
            .ends_with("  Memory: 48MB resident, 512MB virtual"));
    }

    #[test]
    fn test_summary_lists_recorded_phases() {
        let mut monitor = PerformanceMonitor::new(RequestId::from_string("abc"));
        monitor.record_prefetch(1, 0);
        let summary = monitor.finalize(None).to_summary();

        assert!(summary.starts_with("Request: abc"));
        assert!(summary.contains("Prefetch:"));
        assert!(summary.contains("(1 fetched, 0 failed)"));
        assert!(!summary.contains("Time to shell"));
    }
}
