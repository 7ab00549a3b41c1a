//! Lifecycle observer backed by the logger and the performance monitor.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ssr_core::{LifecycleEvent, LifecycleObserver};

use crate::logging::RequestLogger;
use crate::metrics::{PerformanceMetrics, PerformanceMonitor};

/// Per-request observer that logs every lifecycle event and records timings.
#[derive(Debug)]
pub struct RequestObserver {
    logger: RequestLogger,
    monitor: Mutex<PerformanceMonitor>,
}

impl RequestObserver {
    pub fn new(logger: RequestLogger, monitor: PerformanceMonitor) -> Self {
        Self {
            logger,
            monitor: Mutex::new(monitor),
        }
    }

    /// Request logger.
    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }

    /// Finalize timings and log them.
    pub fn finish(&self, status_code: Option<u16>) -> PerformanceMetrics {
        let metrics = {
            let mut monitor = self.monitor();
            monitor.record_render_done();
            monitor.finalize(status_code)
        };

        let mut event = self
            .logger
            .info("request complete")
            .with("prefetch_ms", metrics.prefetch_ms)
            .with("shell_ms", metrics.shell_ms)
            .with("total_ms", metrics.total_ms);
        if let Some(status) = status_code {
            event = event.with("status", status);
        }
        if let Some(memory) = metrics.memory {
            event = event.with("rss_mb", memory.rss_mb().round());
        }
        event.emit();

        metrics
    }

    fn monitor(&self) -> MutexGuard<'_, PerformanceMonitor> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LifecycleObserver for RequestObserver {
    fn on_event(&self, event: LifecycleEvent, elapsed: Duration) {
        match event {
            LifecycleEvent::PrefetchComplete { fetched, failed } => {
                self.monitor().record_prefetch(fetched, failed);
                let event = if failed > 0 {
                    self.logger.warn("prefetch settled with loader errors")
                } else {
                    self.logger.debug("prefetch settled")
                };
                event.with("fetched", fetched).with("failed", failed).emit();
            }
            LifecycleEvent::ShellSent => {
                self.monitor().record_shell_sent();
                self.logger
                    .info("shell sent")
                    .with_ms("render_elapsed_ms", elapsed)
                    .emit();
            }
            LifecycleEvent::ChunkSent { bytes } => {
                self.monitor().record_chunk(bytes);
                self.logger
                    .debug("chunk flushed")
                    .with("bytes", bytes)
                    .emit();
            }
            LifecycleEvent::Completed => {
                self.monitor().record_render_done();
                self.logger
                    .debug("render complete")
                    .with_ms("render_elapsed_ms", elapsed)
                    .emit();
            }
            LifecycleEvent::ShellError(message) => {
                self.monitor().record_render_done();
                self.logger
                    .error("shell render failed")
                    .with("error", message)
                    .emit();
            }
            LifecycleEvent::StreamError(message) => {
                self.monitor().record_render_done();
                self.logger
                    .error("stream failed after shell")
                    .with("error", message)
                    .emit();
            }
            LifecycleEvent::TimedOut { shell_sent } => {
                self.monitor().record_render_done();
                self.logger
                    .warn("render timed out")
                    .with("shell_sent", shell_sent)
                    .with_ms("render_elapsed_ms", elapsed)
                    .emit();
            }
        }
    }
}
