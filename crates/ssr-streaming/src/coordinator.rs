//! Render coordination under a deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use http::StatusCode;
use ssr_core::{LifecycleEvent, LifecycleObserver, RenderPhase, TimingContext};
use ssr_data::AppFlag;
use tokio::time::timeout_at;

use crate::assets::AssetManifest;
use crate::flush::{FlushController, FlushPolicy};
use crate::renderer::{RenderContext, RenderError, RenderSignal, RenderStream};
use crate::sink::StreamingSink;
use crate::template::{render_head, render_tail};
use crate::writer::{ResponseWriter, StreamError};

/// Default wall-clock budget for one render.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_millis(5000);

/// Body of the response sent when the deadline passes before the shell.
pub const TIMEOUT_BODY: &str = "Rendering Timeout";

/// How a coordinated render ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Head, shell, chunks and tail were written with a 200.
    Completed { bytes: usize },
    /// The renderer failed before the shell; a 500 was written.
    ShellFailed(RenderError),
    /// The render or the transport failed after the shell; the body was ended.
    StreamFailed(String),
    /// The deadline passed; 408 if the shell was not sent yet.
    TimedOut { shell_sent: bool },
}

impl RenderOutcome {
    /// Whether the response completed normally.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Drives a [`RenderStream`] into a [`ResponseWriter`].
///
/// The coordinator owns every decision about the status line and the order
/// of writes: head fragment and shell first, post-shell chunks per the flush
/// policy, and the tail with the dehydrated cache last.
#[derive(Debug, Clone)]
pub struct StreamCoordinator {
    timeout: Duration,
    flush: FlushPolicy,
    manifest: Arc<AssetManifest>,
}

enum Exit {
    AllReady,
    ShellError(RenderError),
    StreamError(String),
    Deadline,
    Transport(StreamError),
}

impl StreamCoordinator {
    /// Create a coordinator using `manifest` for asset tags.
    pub fn new(manifest: Arc<AssetManifest>) -> Self {
        Self {
            timeout: DEFAULT_RENDER_TIMEOUT,
            flush: FlushPolicy::default(),
            manifest,
        }
    }

    /// Set the render deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the flush policy.
    pub fn with_flush_policy(mut self, flush: FlushPolicy) -> Self {
        self.flush = flush;
        self
    }

    /// Render deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Consume `stream` and write the response.
    ///
    /// The deadline covers the whole render, including every write to
    /// `writer`. When it passes the stream is dropped, which cancels the
    /// renderer, and a write still in flight is abandoned. Failures never
    /// escape as errors; they are reported through the outcome and `observer`.
    pub async fn run<W: ResponseWriter>(
        &self,
        ctx: &RenderContext,
        stream: RenderStream,
        writer: W,
        observer: &dyn LifecycleObserver,
    ) -> RenderOutcome {
        let started = Instant::now();
        let mut sink = StreamingSink::new(writer, TimingContext::new());
        if let Err(e) = sink.begin() {
            return RenderOutcome::StreamFailed(e.to_string());
        }

        let mut stream = stream;
        let mut flush = FlushController::new(self.flush);
        let mut buffer = String::new();
        let deadline = tokio::time::Instant::now() + self.timeout;
        let expired = tokio::time::sleep_until(deadline);
        tokio::pin!(expired);

        let exit = loop {
            let signal = tokio::select! {
                biased;
                _ = &mut expired => break Exit::Deadline,
                signal = stream.next() => signal,
            };

            match signal {
                Some(RenderSignal::ShellReady(markup)) => {
                    if sink.phase() != RenderPhase::ShellPending {
                        break Exit::StreamError("renderer emitted a second shell".to_string());
                    }
                    let assets = self.manifest.assets_for(&ctx.chunks.used());
                    let mut html = render_head(&ctx.head.snapshot(), &assets);
                    html.push_str(&markup);
                    html.push_str(&std::mem::take(&mut buffer));
                    flush.reset();

                    match timeout_at(deadline, sink.send_shell(&html)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => break Exit::Transport(e),
                        Err(_) => break Exit::Deadline,
                    }
                    observer.on_event(LifecycleEvent::ShellSent, started.elapsed());
                }
                Some(RenderSignal::Chunk(markup)) => {
                    flush.add_bytes(markup.len());
                    buffer.push_str(&markup);

                    if sink.head_sent() && flush.should_flush() {
                        let bytes = buffer.len();
                        let chunk = std::mem::take(&mut buffer);
                        match timeout_at(deadline, sink.send_chunk(&chunk)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => break Exit::Transport(e),
                            Err(_) => break Exit::Deadline,
                        }
                        flush.reset();
                        observer.on_event(LifecycleEvent::ChunkSent { bytes }, started.elapsed());
                    }
                }
                Some(RenderSignal::AllReady) => {
                    if sink.head_sent() {
                        break Exit::AllReady;
                    }
                    break Exit::ShellError(RenderError::new("render finished without a shell"));
                }
                Some(RenderSignal::Error(err)) => {
                    if sink.head_sent() {
                        break Exit::StreamError(err.to_string());
                    }
                    break Exit::ShellError(err);
                }
                None => {
                    if sink.head_sent() {
                        break Exit::AllReady;
                    }
                    break Exit::ShellError(RenderError::new("render ended without a shell"));
                }
            }
        };

        // Cancel the renderer before writing the final bytes.
        drop(stream);

        match exit {
            Exit::AllReady => match timeout_at(deadline, self.finish(ctx, &mut sink, buffer)).await {
                Ok(Ok(())) => {
                    observer.on_event(LifecycleEvent::Completed, started.elapsed());
                    RenderOutcome::Completed {
                        bytes: sink.bytes_sent(),
                    }
                }
                Ok(Err(e)) => end_stream(&mut sink, deadline, observer, started, e.to_string()).await,
                Err(_) => expire(&mut sink, deadline, observer, started).await,
            },
            Exit::ShellError(err) => {
                let _ = timeout_at(
                    deadline,
                    sink.fail_before_shell(StatusCode::INTERNAL_SERVER_ERROR, None),
                )
                .await;
                observer.on_event(LifecycleEvent::ShellError(err.to_string()), started.elapsed());
                RenderOutcome::ShellFailed(err)
            }
            Exit::StreamError(message) => end_stream(&mut sink, deadline, observer, started, message).await,
            Exit::Deadline => expire(&mut sink, deadline, observer, started).await,
            Exit::Transport(e) => end_stream(&mut sink, deadline, observer, started, e.to_string()).await,
        }
    }

    async fn finish<W: ResponseWriter>(
        &self,
        ctx: &RenderContext,
        sink: &mut StreamingSink<W>,
        buffer: String,
    ) -> Result<(), StreamError> {
        if !buffer.is_empty() {
            sink.send_chunk(&buffer).await?;
        }

        let assets = self.manifest.assets_for(&ctx.chunks.used());
        let tail = render_tail(&AppFlag::server_rendered(), &ctx.client.dehydrate(), &assets)
            .map_err(|e| StreamError::Template(e.to_string()))?;
        sink.complete(&tail).await
    }
}

// Closing writes share the render deadline. `timeout_at` polls the write once
// before checking the clock, so a write that is ready still lands.

/// End a response whose status line may already be committed.
async fn end_stream<W: ResponseWriter>(
    sink: &mut StreamingSink<W>,
    deadline: tokio::time::Instant,
    observer: &dyn LifecycleObserver,
    started: Instant,
    message: String,
) -> RenderOutcome {
    let _ = timeout_at(deadline, sink.abort()).await;
    observer.on_event(LifecycleEvent::StreamError(message.clone()), started.elapsed());
    RenderOutcome::StreamFailed(message)
}

/// Close out a render whose deadline passed: 408 if nothing was committed,
/// otherwise end the body where it stands.
async fn expire<W: ResponseWriter>(
    sink: &mut StreamingSink<W>,
    deadline: tokio::time::Instant,
    observer: &dyn LifecycleObserver,
    started: Instant,
) -> RenderOutcome {
    let shell_sent = sink.head_sent();
    let _ = if shell_sent {
        timeout_at(deadline, sink.abort()).await
    } else {
        timeout_at(
            deadline,
            sink.fail_before_shell(StatusCode::REQUEST_TIMEOUT, Some(TIMEOUT_BODY)),
        )
        .await
    };
    observer.on_event(LifecycleEvent::TimedOut { shell_sent }, started.elapsed());
    RenderOutcome::TimedOut { shell_sent }
}
