//! Single-flight streaming session controller.
//!
//! [`SessionController::start`] hands a prompt to the configured
//! [`ChatTransport`] on a background task and reports progress to a
//! [`SessionSink`]. Only one session may stream at a time; a second start
//! fails with [`StartError::SessionBusy`] until the first reaches a terminal
//! state. [`SessionController::cancel`] is cooperative: chunks the provider
//! already produced are still delivered and the partial reply is kept.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatMessage;
use crate::core::config::defaults::{DEFAULT_CANCEL_GRACE, DEFAULT_TIMEOUT};
use crate::core::events::{FailureKind, SessionEvent, SessionSink};
use crate::core::observer::{SessionObserver, SessionSummary};
use crate::core::session::{Session, SessionHandle, SessionId, SessionState};
use crate::core::transport::{ChatTransport, StreamEvent, TransportError, TransportErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Prepended as a system message when set.
    pub system_prompt: Option<String>,
    /// Upper bound on one whole exchange, connect included.
    pub deadline: Duration,
    /// How long a cancelled session keeps draining chunks already in flight.
    pub cancel_grace: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            deadline: DEFAULT_TIMEOUT,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    /// Another session is still streaming or winding down.
    SessionBusy { active: SessionId },
    EmptyPrompt,
    ShutDown,
    /// `start` was called outside a tokio runtime.
    NoRuntime,
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::SessionBusy { active } => write!(
                f,
                "session {active} is still in progress; cancel it or wait for it to finish"
            ),
            StartError::EmptyPrompt => f.write_str("prompt is empty"),
            StartError::ShutDown => f.write_str("controller has been shut down"),
            StartError::NoRuntime => f.write_str("no async runtime available to run the session"),
        }
    }
}

impl Error for StartError {}

#[derive(Default)]
struct ControllerState {
    current: Option<Session>,
    last_outcome: Option<(SessionId, SessionState)>,
    shut_down: bool,
}

struct Shared {
    state: Mutex<ControllerState>,
    next_id: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        // Critical sections never panic midway, so a poisoned guard still
        // holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, id: SessionId, terminal: SessionState) {
        let mut state = self.lock();
        let owns_slot = state
            .current
            .as_ref()
            .is_some_and(|session| session.id() == id);
        if owns_slot {
            if let Some(mut session) = state.current.take() {
                session.transition(terminal);
            }
        }
        state.last_outcome = Some((id, terminal));
        debug!(session_id = id.as_u64(), state = terminal.label(), "session released");
    }
}

/// Frees the slot if the worker unwinds before reaching a terminal state,
/// e.g. when a sink panics mid-stream.
struct SlotGuard {
    shared: Arc<Shared>,
    id: SessionId,
    released: bool,
}

impl SlotGuard {
    fn release(&mut self, terminal: SessionState) {
        self.released = true;
        self.shared.release(self.id, terminal);
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!(session_id = self.id.as_u64(), "session worker stopped without a terminal state");
            self.shared.release(self.id, SessionState::Failed);
        }
    }
}

type Observers = Arc<Vec<Arc<dyn SessionObserver>>>;

/// Owns the single-flight slot. Cloning yields another handle to the same
/// controller.
#[derive(Clone)]
pub struct SessionController {
    transport: Arc<dyn ChatTransport>,
    observers: Observers,
    options: Arc<ControllerOptions>,
    shared: Arc<Shared>,
    root_cancel: CancellationToken,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        options: ControllerOptions,
        observers: Vec<Arc<dyn SessionObserver>>,
    ) -> Self {
        Self {
            transport,
            observers: Arc::new(observers),
            options: Arc::new(options),
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState::default()),
                next_id: AtomicU64::new(0),
            }),
            root_cancel: CancellationToken::new(),
        }
    }

    /// Starts streaming a reply to `prompt`. Returns as soon as the worker
    /// task is spawned; all further progress arrives through `sink`.
    pub fn start<S: SessionSink>(
        &self,
        prompt: &str,
        sink: S,
    ) -> Result<SessionHandle, StartError> {
        if prompt.trim().is_empty() {
            return Err(StartError::EmptyPrompt);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StartError::NoRuntime)?;

        let (id, cancel) = {
            let mut state = self.shared.lock();
            if state.shut_down {
                return Err(StartError::ShutDown);
            }
            if let Some(current) = state.current.as_ref() {
                if current.state().is_in_flight() {
                    return Err(StartError::SessionBusy {
                        active: current.id(),
                    });
                }
            }

            let id = SessionId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
            let cancel = self.root_cancel.child_token();
            let mut session = Session::new(id, cancel.clone());
            session.transition(SessionState::Active);
            state.current = Some(session);
            (id, cancel)
        };

        debug!(session_id = id.as_u64(), "starting session");
        for observer in self.observers.iter() {
            observer.session_started(id, prompt);
        }

        let worker = Worker {
            id,
            shared: self.shared.clone(),
            transport: self.transport.clone(),
            observers: self.observers.clone(),
            sink: Box::new(sink),
            cancel,
            deadline: self.options.deadline,
            cancel_grace: self.options.cancel_grace,
        };
        runtime.spawn(worker.run(self.build_messages(prompt)));

        Ok(SessionHandle::new(id))
    }

    /// Requests cooperative cancellation of `handle`'s session.
    ///
    /// Returns `true` only for the call that actually fired the signal. Stale
    /// handles, finished sessions and repeated calls are harmless no-ops.
    pub fn cancel(&self, handle: SessionHandle) -> bool {
        let fired = {
            let mut state = self.shared.lock();
            match state.current.as_mut() {
                Some(session) if session.id() == handle.id() => session.request_cancel(),
                _ => false,
            }
        };

        if fired {
            debug!(session_id = handle.id().as_u64(), "cancellation requested");
            for observer in self.observers.iter() {
                observer.cancel_requested(handle.id());
            }
        }
        fired
    }

    pub fn current(&self) -> Option<(SessionId, SessionState)> {
        self.shared
            .lock()
            .current
            .as_ref()
            .map(|session| (session.id(), session.state()))
    }

    pub fn is_busy(&self) -> bool {
        self.current()
            .is_some_and(|(_, state)| state.is_in_flight())
    }

    pub fn last_outcome(&self) -> Option<(SessionId, SessionState)> {
        self.shared.lock().last_outcome
    }

    /// Cancels whatever is running and refuses new sessions.
    pub fn shutdown(&self) {
        let cancelled = {
            let mut state = self.shared.lock();
            state.shut_down = true;
            match state.current.as_mut() {
                Some(session) if session.state() == SessionState::Active => {
                    session.request_cancel();
                    Some(session.id())
                }
                _ => None,
            }
        };
        if let Some(id) = cancelled {
            for observer in self.observers.iter() {
                observer.cancel_requested(id);
            }
        }
        self.root_cancel.cancel();
    }

    /// Single-shot generation. Does not occupy the streaming slot.
    pub async fn generate_once(&self, prompt: &str) -> Result<String, TransportError> {
        let messages = self.build_messages(prompt);
        match tokio::time::timeout(self.options.deadline, self.transport.generate_once(messages))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(format!(
                "no reply from provider within {:?}",
                self.options.deadline
            ))),
        }
    }

    fn build_messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = self.options.system_prompt.as_deref() {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(prompt));
        messages
    }
}

enum Ending {
    Completed,
    Canceled,
    Failed { kind: FailureKind, message: String },
}

impl Ending {
    fn state(&self) -> SessionState {
        match self {
            Ending::Completed => SessionState::Completed,
            Ending::Canceled => SessionState::Canceled,
            Ending::Failed { .. } => SessionState::Failed,
        }
    }
}

/// Text received so far. Only the worker writes to it.
#[derive(Default)]
struct Transcript {
    text: String,
    chunks: usize,
}

struct Worker {
    id: SessionId,
    shared: Arc<Shared>,
    transport: Arc<dyn ChatTransport>,
    observers: Observers,
    sink: Box<dyn SessionSink>,
    cancel: CancellationToken,
    deadline: Duration,
    cancel_grace: Duration,
}

impl Worker {
    async fn run(self, messages: Vec<ChatMessage>) {
        let mut slot = SlotGuard {
            shared: self.shared.clone(),
            id: self.id,
            released: false,
        };
        let mut transcript = Transcript::default();
        let ending = self.drive(messages, &mut transcript).await;
        let state = ending.state();

        // Release the slot before the terminal event so a sink reacting to it
        // can start the next session right away.
        slot.release(state);

        let failure = match &ending {
            Ending::Failed { kind, .. } => Some(*kind),
            _ => None,
        };
        let summary = SessionSummary {
            state,
            failure,
            chunks: transcript.chunks,
            chars: transcript.text.chars().count(),
        };

        let event = match ending {
            Ending::Completed => SessionEvent::Completed(transcript.text),
            Ending::Canceled => SessionEvent::Canceled(transcript.text),
            Ending::Failed { kind, message } => SessionEvent::Failed {
                partial_text: transcript.text,
                kind,
                message,
            },
        };
        self.sink.deliver(self.id, event);

        for observer in self.observers.iter() {
            observer.session_finished(self.id, &summary);
        }
    }

    async fn drive(&self, messages: Vec<ChatMessage>, transcript: &mut Transcript) -> Ending {
        let deadline = Instant::now() + self.deadline;
        if self.cancel.is_cancelled() {
            return Ending::Canceled;
        }

        let connect = self
            .transport
            .generate_streaming(messages, self.cancel.clone());
        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ending::Canceled,
            _ = sleep_until(deadline) => return self.expired(false),
            result = connect => match result {
                Ok(stream) => stream,
                Err(err) => return self.classify(err),
            },
        };

        let mut drain_until: Option<Instant> = None;
        loop {
            if drain_until.is_none() && self.cancel.is_cancelled() {
                debug!(session_id = self.id.as_u64(), "draining stream after cancellation");
                drain_until = Some(Instant::now() + self.cancel_grace);
            }
            let limit = drain_until.map_or(deadline, |until| until.min(deadline));
            if Instant::now() >= limit {
                return self.expired(drain_until.is_some());
            }

            let next = tokio::select! {
                biased;
                next = stream.next() => Some(next),
                _ = self.cancel.cancelled(), if drain_until.is_none() => None,
                _ = sleep_until(limit) => return self.expired(drain_until.is_some()),
            };
            let Some(next) = next else {
                continue;
            };

            match next {
                Some(Ok(StreamEvent::Chunk(text))) => {
                    transcript.text.push_str(&text);
                    transcript.chunks += 1;
                    self.sink.deliver(self.id, SessionEvent::ChunkReceived(text));
                }
                // Every chunk has been delivered by now, so a marker that
                // races a cancel request still counts as completion.
                Some(Ok(StreamEvent::Done)) => return Ending::Completed,
                Some(Err(err)) => return self.classify(err),
                None if self.cancel.is_cancelled() => return Ending::Canceled,
                None => {
                    return Ending::Failed {
                        kind: FailureKind::Protocol,
                        message: "stream closed without an end marker".to_string(),
                    }
                }
            }
        }
    }

    fn classify(&self, err: TransportError) -> Ending {
        let kind = match err.kind() {
            TransportErrorKind::Canceled if self.cancel.is_cancelled() => return Ending::Canceled,
            TransportErrorKind::Canceled => FailureKind::Canceled,
            TransportErrorKind::Timeout => FailureKind::Timeout,
            TransportErrorKind::Network | TransportErrorKind::Http => FailureKind::Transport,
            TransportErrorKind::Protocol => FailureKind::Protocol,
        };
        Ending::Failed {
            kind,
            message: err.message().to_string(),
        }
    }

    fn expired(&self, draining: bool) -> Ending {
        if draining {
            return Ending::Canceled;
        }
        Ending::Failed {
            kind: FailureKind::Timeout,
            message: format!("no response from provider within {:?}", self.deadline),
        }
    }
}
