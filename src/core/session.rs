use std::fmt;

use tokio_util::sync::CancellationToken;

/// Opaque identifier of one request/response exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Returned by a successful start; the only way to address a session from outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    id: SessionId,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Cancelling,
    Completed,
    Canceled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Canceled | SessionState::Failed
        )
    }

    /// True while the session holds the controller's single-flight slot.
    pub fn is_in_flight(self) -> bool {
        matches!(self, SessionState::Active | SessionState::Cancelling)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Active)
                | (Active, Cancelling)
                | (Active, Completed)
                | (Active, Canceled)
                | (Active, Failed)
                | (Cancelling, Completed)
                | (Cancelling, Canceled)
                | (Cancelling, Failed)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Cancelling => "cancelling",
            SessionState::Completed => "completed",
            SessionState::Canceled => "canceled",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Controller-side record of a session. The accumulated text lives with the
/// worker task; this only tracks what the control thread needs.
#[derive(Debug)]
pub(crate) struct Session {
    id: SessionId,
    state: SessionState,
    cancel_token: CancellationToken,
}

impl Session {
    pub(crate) fn new(id: SessionId, cancel_token: CancellationToken) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            cancel_token,
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// Applies `next` if the state machine allows it. Returns whether the
    /// state changed.
    pub(crate) fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }

    /// Moves an active session to `Cancelling` and fires its token. Repeated
    /// calls, or calls on sessions past `Active`, do nothing.
    pub(crate) fn request_cancel(&mut self) -> bool {
        if !self.transition(SessionState::Cancelling) {
            return false;
        }
        self.cancel_token.cancel();
        true
    }
}
