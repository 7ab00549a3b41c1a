//! Response transports.

use async_trait::async_trait;
use futures::channel::{mpsc, oneshot};
use futures::SinkExt;
use http::StatusCode;
use ssr_core::PhaseError;

/// Streaming errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("response head already sent")]
    HeadAlreadySent,

    #[error("response head not sent")]
    HeadNotSent,

    #[error("response already finished")]
    Finished,

    #[error("client disconnected")]
    Disconnected,

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error("template error: {0}")]
    Template(String),
}

/// Destination of a streamed HTML response.
///
/// The status is committed by `send_head`, which must precede every `write`
/// and may happen only once.
#[async_trait]
pub trait ResponseWriter: Send {
    /// Commit the status line.
    async fn send_head(&mut self, status: StatusCode) -> Result<(), StreamError>;

    /// Write a body chunk.
    async fn write(&mut self, chunk: Vec<u8>) -> Result<(), StreamError>;

    /// End the response body.
    async fn finish(&mut self) -> Result<(), StreamError>;
}

#[async_trait]
impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    async fn send_head(&mut self, status: StatusCode) -> Result<(), StreamError> {
        (**self).send_head(status).await
    }

    async fn write(&mut self, chunk: Vec<u8>) -> Result<(), StreamError> {
        (**self).write(chunk).await
    }

    async fn finish(&mut self) -> Result<(), StreamError> {
        (**self).finish().await
    }
}

/// Writer that keeps the whole response in memory.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    status: Option<StatusCode>,
    chunks: Vec<Vec<u8>>,
    finished: bool,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Body chunks in write order.
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Whole body as text.
    pub fn body(&self) -> String {
        String::from_utf8_lossy(&self.chunks.concat()).into_owned()
    }

    /// Whether `finish` was called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[async_trait]
impl ResponseWriter for BufferedWriter {
    async fn send_head(&mut self, status: StatusCode) -> Result<(), StreamError> {
        if self.status.is_some() {
            return Err(StreamError::HeadAlreadySent);
        }
        self.status = Some(status);
        Ok(())
    }

    async fn write(&mut self, chunk: Vec<u8>) -> Result<(), StreamError> {
        if self.finished {
            return Err(StreamError::Finished);
        }
        if self.status.is_none() {
            return Err(StreamError::HeadNotSent);
        }
        self.chunks.push(chunk);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), StreamError> {
        self.finished = true;
        Ok(())
    }
}

/// Create a writer whose output is read from the paired receiver.
///
/// `buffer` bounds the body chunks in flight; a slow reader applies
/// backpressure to the writer.
pub fn response_channel(buffer: usize) -> (ChannelWriter, ResponseReceiver) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(buffer);
    (
        ChannelWriter {
            head: Some(head_tx),
            body: body_tx,
        },
        ResponseReceiver {
            head: head_rx,
            body: body_rx,
        },
    )
}

/// Writer half of [`response_channel`].
#[derive(Debug)]
pub struct ChannelWriter {
    head: Option<oneshot::Sender<StatusCode>>,
    body: mpsc::Sender<Vec<u8>>,
}

/// Reader half of [`response_channel`].
///
/// `head` resolves with the committed status, or is cancelled if the writer
/// is dropped first. `body` ends when the writer finishes or is dropped.
#[derive(Debug)]
pub struct ResponseReceiver {
    pub head: oneshot::Receiver<StatusCode>,
    pub body: mpsc::Receiver<Vec<u8>>,
}

#[async_trait]
impl ResponseWriter for ChannelWriter {
    async fn send_head(&mut self, status: StatusCode) -> Result<(), StreamError> {
        let head = self.head.take().ok_or(StreamError::HeadAlreadySent)?;
        head.send(status).map_err(|_| StreamError::Disconnected)
    }

    async fn write(&mut self, chunk: Vec<u8>) -> Result<(), StreamError> {
        if self.head.is_some() {
            return Err(StreamError::HeadNotSent);
        }
        if self.body.is_closed() {
            return Err(StreamError::Finished);
        }
        self.body
            .send(chunk)
            .await
            .map_err(|_| StreamError::Disconnected)
    }

    async fn finish(&mut self) -> Result<(), StreamError> {
        self.body.close_channel();
        Ok(())
    }
}
