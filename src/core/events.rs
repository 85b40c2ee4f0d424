//! Events delivered to the presentation layer for each session.

use std::fmt;

use tokio::sync::mpsc;

use crate::core::session::SessionId;

/// Why a session ended in `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// No data or acknowledgment within the configured deadline.
    Timeout,
    /// The transport reported a cancellation the caller did not request.
    Canceled,
    /// Provider or network failure.
    Transport,
    /// Malformed or unexpected stream data.
    Protocol,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Canceled => "canceled",
            FailureKind::Transport => "transport error",
            FailureKind::Protocol => "protocol error",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    ChunkReceived(String),
    Completed(String),
    Canceled(String),
    Failed {
        partial_text: String,
        kind: FailureKind,
        message: String,
    },
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::ChunkReceived(_))
    }
}

/// Receives the ordered events of every session started with it.
///
/// Calls for one session never overlap, but they arrive on the worker task,
/// not on the caller's thread.
pub trait SessionSink: Send + Sync + 'static {
    fn deliver(&self, id: SessionId, event: SessionEvent);
}

impl<F> SessionSink for F
where
    F: Fn(SessionId, SessionEvent) + Send + Sync + 'static,
{
    fn deliver(&self, id: SessionId, event: SessionEvent) {
        self(id, event)
    }
}

/// Forwards events into an unbounded channel so a UI loop can drain them.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(SessionEvent, SessionId)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SessionEvent, SessionId)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionSink for ChannelSink {
    fn deliver(&self, id: SessionId, event: SessionEvent) {
        // A closed receiver means the UI went away; the session still finishes.
        let _ = self.tx.send((event, id));
    }
}
