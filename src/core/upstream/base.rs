//! Base types for the upstream bidirectional model stream.
//!
//! An upstream connection is opened through an [`UpstreamConnector`] and handed to
//! the session as an [`UpstreamStream`]: a send half that accepts one encoded event
//! per call, and a receive half that yields decoded event payloads until the model
//! backend ends the stream or fails.
//!
//! Both halves are channel-backed. Provider implementations spawn a connection task
//! that drains the send channel into the provider's input stream and pushes every
//! output chunk into the receive channel, so the session never touches SDK types.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the upstream stream adapter.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// The stream could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The open stream reported an error while receiving
    #[error("Stream error: {0}")]
    StreamError(String),

    /// A received chunk was not valid UTF-8. Carries the lossy text; the
    /// stream stays open
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The stream is closed or was never opened
    #[error("Not connected")]
    NotConnected,

    /// Opening the stream took too long
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// An event could not be encoded
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

// =============================================================================
// Stream Halves
// =============================================================================

/// Send half of an upstream stream.
///
/// Cloning yields another handle to the same input channel.
#[derive(Clone)]
pub struct UpstreamSender {
    tx: mpsc::UnboundedSender<String>,
}

impl UpstreamSender {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Queue one encoded event for transmission.
    pub fn send(&self, payload: String) -> UpstreamResult<()> {
        self.tx.send(payload).map_err(|_| UpstreamError::NotConnected)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for UpstreamSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Receive half of an upstream stream.
#[derive(Debug)]
pub struct UpstreamReceiver {
    rx: mpsc::UnboundedReceiver<UpstreamResult<String>>,
}

impl UpstreamReceiver {
    pub fn new(rx: mpsc::UnboundedReceiver<UpstreamResult<String>>) -> Self {
        Self { rx }
    }

    /// Wait for the next decoded event.
    ///
    /// Returns `Ok(None)` once the provider side has finished and the channel is drained.
    pub async fn receive(&mut self) -> UpstreamResult<Option<String>> {
        match self.rx.recv().await {
            Some(Ok(payload)) => Ok(Some(payload)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// An open bidirectional stream.
#[derive(Debug)]
pub struct UpstreamStream {
    pub sender: UpstreamSender,
    pub receiver: UpstreamReceiver,
    /// Provider connection task, aborted on close
    pub task: Option<JoinHandle<()>>,
}

impl UpstreamStream {
    pub fn new(sender: UpstreamSender, receiver: UpstreamReceiver) -> Self {
        Self {
            sender,
            receiver,
            task: None,
        }
    }

    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Build a stream whose halves are wired to the returned test-side channel ends.
    ///
    /// The first returned value receives everything the session sends upstream; the
    /// second injects events (or errors) as if the model backend produced them.
    pub fn channel_pair() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<UpstreamResult<String>>,
    ) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        (
            Self::new(UpstreamSender::new(input_tx), UpstreamReceiver::new(output_rx)),
            input_rx,
            output_tx,
        )
    }
}

/// Opens bidirectional streams to a model backend.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Open a new stream. Failure is terminal for the requesting session.
    async fn open(&self) -> UpstreamResult<UpstreamStream>;

    /// Short provider name used in logs
    fn provider_name(&self) -> &'static str;
}
