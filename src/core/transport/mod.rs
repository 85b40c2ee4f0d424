//! The provider capability consumed by the session controller.

pub mod openai;

use std::error::Error;
use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use tokio_util::sync::CancellationToken;

use crate::api::ChatMessage;

pub use openai::OpenAiTransport;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(String),
    /// Explicit end-of-stream marker.
    Done,
}

pub type ChunkStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, TransportError>> + Send + 'static>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    Canceled,
    Timeout,
    Network,
    Http,
    Protocol,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn canceled() -> Self {
        Self::new(TransportErrorKind::Canceled, "request canceled")
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Http, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Protocol, message)
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::timeout(format!("request timed out: {err}"))
        } else {
            TransportError::network(err.to_string())
        }
    }
}

/// A configured model provider.
///
/// `generate_streaming` returns a lazy, finite stream terminated by
/// [`StreamEvent::Done`] or an error. Implementations should stop producing
/// once `cancel` fires and yield a [`TransportErrorKind::Canceled`] error or
/// simply end. Dropping the stream must release the connection.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn generate_once(&self, messages: Vec<ChatMessage>) -> Result<String, TransportError>;

    async fn generate_streaming(
        &self,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, TransportError>;
}
