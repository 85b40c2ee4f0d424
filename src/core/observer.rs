//! Cross-cutting listeners handed to the controller at construction.

use tracing::{info, warn};

use crate::core::events::FailureKind;
use crate::core::session::{SessionId, SessionState};

/// Summary passed to observers once a session reaches a terminal state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub state: SessionState,
    pub failure: Option<FailureKind>,
    pub chunks: usize,
    pub chars: usize,
}

pub trait SessionObserver: Send + Sync {
    fn session_started(&self, _id: SessionId, _prompt: &str) {}

    fn cancel_requested(&self, _id: SessionId) {}

    fn session_finished(&self, _id: SessionId, _summary: &SessionSummary) {}
}

/// Logs the session lifecycle through `tracing`.
#[derive(Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn session_started(&self, id: SessionId, prompt: &str) {
        info!(session_id = id.as_u64(), prompt_chars = prompt.chars().count(), "session started");
    }

    fn cancel_requested(&self, id: SessionId) {
        info!(session_id = id.as_u64(), "cancellation requested");
    }

    fn session_finished(&self, id: SessionId, summary: &SessionSummary) {
        match summary.failure {
            Some(kind) => warn!(
                session_id = id.as_u64(),
                %kind,
                chunks = summary.chunks,
                chars = summary.chars,
                "session failed"
            ),
            None => info!(
                session_id = id.as_u64(),
                state = summary.state.label(),
                chunks = summary.chunks,
                chars = summary.chars,
                "session finished"
            ),
        }
    }
}
