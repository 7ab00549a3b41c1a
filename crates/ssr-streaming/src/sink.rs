//! State-machine guarded streaming sink.

use http::StatusCode;
use ssr_core::{RenderPhase, TimingContext};

use crate::writer::{ResponseWriter, StreamError};

/// Sink that enforces shell-first ordering on a [`ResponseWriter`].
///
/// Every write is checked against [`RenderPhase`]: the status is committed by
/// the shell, chunks only follow the shell, and nothing follows a terminal
/// phase.
pub struct StreamingSink<W: ResponseWriter> {
    inner: W,
    phase: RenderPhase,
    head_sent: bool,
    bytes_sent: usize,
    chunks_sent: usize,
    timing: TimingContext,
}

impl<W: ResponseWriter> StreamingSink<W> {
    /// Create a new streaming sink.
    pub fn new(writer: W, timing: TimingContext) -> Self {
        Self {
            inner: writer,
            phase: RenderPhase::Idle,
            head_sent: false,
            bytes_sent: 0,
            chunks_sent: 0,
            timing,
        }
    }

    /// Start the render.
    pub fn begin(&mut self) -> Result<(), StreamError> {
        self.phase = self.phase.transition(RenderPhase::ShellPending)?;
        self.timing.mark("render_start");
        Ok(())
    }

    /// Commit a 200 status and write the document head plus shell markup.
    pub async fn send_shell(&mut self, html: &str) -> Result<(), StreamError> {
        let next = self.phase.transition(RenderPhase::ShellSent)?;

        self.timing.mark("shell_start");
        self.send_head(StatusCode::OK).await?;
        self.write(html).await?;
        self.timing.mark("shell_sent");
        self.phase = next;

        Ok(())
    }

    /// Write a chunk produced after the shell.
    pub async fn send_chunk(&mut self, html: &str) -> Result<(), StreamError> {
        let next = self.phase.transition(RenderPhase::Streaming)?;

        self.write(html).await?;
        self.chunks_sent += 1;
        self.phase = next;

        Ok(())
    }

    /// Write the tail and finish the response.
    pub async fn complete(&mut self, tail: &str) -> Result<(), StreamError> {
        let next = self.phase.transition(RenderPhase::Completed)?;

        self.write(tail).await?;
        self.finish().await?;
        self.timing.mark("complete");
        self.phase = next;

        Ok(())
    }

    /// Answer with an error status before any shell byte was written.
    pub async fn fail_before_shell(
        &mut self,
        status: StatusCode,
        body: Option<&str>,
    ) -> Result<(), StreamError> {
        if self.head_sent {
            return Err(StreamError::HeadAlreadySent);
        }
        self.phase = self.phase.transition(RenderPhase::Failed)?;

        self.inner.send_head(status).await?;
        self.head_sent = true;
        if let Some(body) = body {
            self.inner.write(body.as_bytes().to_vec()).await?;
            self.bytes_sent += body.len();
        }
        self.inner.finish().await
    }

    /// End the response where it stands.
    pub async fn abort(&mut self) -> Result<(), StreamError> {
        if self.phase != RenderPhase::Failed {
            self.phase = self.phase.transition(RenderPhase::Failed)?;
        }
        self.timing.mark("aborted");
        self.inner.finish().await
    }

    /// Current render phase.
    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Whether the status has been committed.
    pub fn head_sent(&self) -> bool {
        self.head_sent
    }

    /// Body bytes written so far.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Post-shell chunks written so far.
    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent
    }

    /// Get timing context.
    pub fn timing(&self) -> &TimingContext {
        &self.timing
    }

    /// Consume the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    async fn send_head(&mut self, status: StatusCode) -> Result<(), StreamError> {
        match self.inner.send_head(status).await {
            Ok(()) => {
                self.head_sent = true;
                Ok(())
            }
            Err(e) => {
                self.phase = RenderPhase::Failed;
                Err(e)
            }
        }
    }

    async fn write(&mut self, html: &str) -> Result<(), StreamError> {
        match self.inner.write(html.as_bytes().to_vec()).await {
            Ok(()) => {
                self.bytes_sent += html.len();
                Ok(())
            }
            Err(e) => {
                self.phase = RenderPhase::Failed;
                Err(e)
            }
        }
    }

    async fn finish(&mut self) -> Result<(), StreamError> {
        self.inner.finish().await.inspect_err(|_| {
            self.phase = RenderPhase::Failed;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BufferedWriter;

    fn started(writer: &mut BufferedWriter) -> StreamingSink<&mut BufferedWriter> {
        let mut sink = StreamingSink::new(writer, TimingContext::new());
        sink.begin().unwrap();
        sink
    }

    // === Ordering Tests ===

    #[tokio::test]
    async fn test_shell_chunk_tail() {
        let mut writer = BufferedWriter::new();
        let mut sink = started(&mut writer);

        sink.send_shell("<head>shell").await.unwrap();
        assert_eq!(sink.phase(), RenderPhase::ShellSent);
        assert!(sink.timing().time_to_shell().is_some());

        sink.send_chunk("chunk").await.unwrap();
        sink.send_chunk("chunk").await.unwrap();
        assert_eq!(sink.phase(), RenderPhase::Streaming);

        sink.complete("tail").await.unwrap();
        assert_eq!(sink.phase(), RenderPhase::Completed);
        assert_eq!(sink.chunks_sent(), 2);
        assert_eq!(sink.bytes_sent(), "<head>shellchunkchunktail".len());

        assert_eq!(writer.status(), Some(StatusCode::OK));
        assert_eq!(writer.body(), "<head>shellchunkchunktail");
        assert!(writer.is_finished());
    }

    #[tokio::test]
    async fn test_chunk_before_shell_is_rejected() {
        let mut writer = BufferedWriter::new();
        let mut sink = started(&mut writer);

        let err = sink.send_chunk("early").await.unwrap_err();
        assert!(matches!(err, StreamError::Phase(_)));
        assert_eq!(sink.bytes_sent(), 0);
        assert_eq!(writer.status(), None);
    }

    #[tokio::test]
    async fn test_tail_before_shell_is_rejected() {
        let mut writer = BufferedWriter::new();
        let mut sink = started(&mut writer);

        assert!(sink.complete("tail").await.is_err());
        assert_eq!(writer.status(), None);
    }

    #[tokio::test]
    async fn test_shell_cannot_be_sent_twice() {
        let mut writer = BufferedWriter::new();
        let mut sink = started(&mut writer);

        sink.send_shell("a").await.unwrap();
        assert!(sink.send_shell("b").await.is_err());
        assert_eq!(writer.body(), "a");
    }

    #[tokio::test]
    async fn test_nothing_after_completion() {
        let mut writer = BufferedWriter::new();
        let mut sink = started(&mut writer);

        sink.send_shell("a").await.unwrap();
        sink.complete("z").await.unwrap();
        assert!(sink.send_chunk("late").await.is_err());
        assert!(sink.abort().await.is_err());
    }

    // === Failure Tests ===

    #[tokio::test]
    async fn test_fail_before_shell_commits_error_status() {
        let mut writer = BufferedWriter::new();
        let mut sink = started(&mut writer);

        sink.fail_before_shell(StatusCode::REQUEST_TIMEOUT, Some("Rendering Timeout"))
            .await
            .unwrap();
        assert_eq!(sink.phase(), RenderPhase::Failed);

        assert_eq!(writer.status(), Some(StatusCode::REQUEST_TIMEOUT));
        assert_eq!(writer.body(), "Rendering Timeout");
        assert!(writer.is_finished());
    }

    #[tokio::test]
    async fn test_fail_before_shell_after_shell_is_rejected() {
        let mut writer = BufferedWriter::new();
        let mut sink = started(&mut writer);

        sink.send_shell("a").await.unwrap();
        assert_eq!(
            sink.fail_before_shell(StatusCode::INTERNAL_SERVER_ERROR, None).await,
            Err(StreamError::HeadAlreadySent)
        );
        assert_eq!(writer.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_abort_after_shell_keeps_status() {
        let mut writer = BufferedWriter::new();
        let mut sink = started(&mut writer);

        sink.send_shell("a").await.unwrap();
        sink.abort().await.unwrap();
        assert_eq!(sink.phase(), RenderPhase::Failed);

        assert_eq!(writer.status(), Some(StatusCode::OK));
        assert_eq!(writer.body(), "a");
        assert!(writer.is_finished());
    }
}
