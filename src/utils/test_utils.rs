use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::ChatMessage;
use crate::core::events::SessionEvent;
use crate::core::session::SessionId;
use crate::core::transport::{ChatTransport, ChunkStream, StreamEvent, TransportError};

/// One scripted action of a fake provider stream.
#[derive(Clone, Debug)]
pub enum Step {
    Chunk(&'static str),
    Done,
    Fail(TransportError),
    Delay(Duration),
    /// Never produces anything again unless the script honors cancellation.
    Stall,
}

#[derive(Clone, Debug)]
pub struct Script {
    steps: Vec<Step>,
    honors_cancel: bool,
    connect_error: Option<TransportError>,
}

impl Script {
    /// A well-behaved provider: stops with a `Canceled` error once the token fires.
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            honors_cancel: true,
            connect_error: None,
        }
    }

    /// A provider that keeps producing whatever it has regardless of the token.
    pub fn ignoring_cancel(steps: Vec<Step>) -> Self {
        Self {
            honors_cancel: false,
            ..Self::new(steps)
        }
    }

    pub fn connect_error(err: TransportError) -> Self {
        Self {
            connect_error: Some(err),
            ..Self::new(Vec::new())
        }
    }
}

pub fn chunks_then_done(chunks: &[&'static str]) -> Script {
    let mut steps: Vec<Step> = chunks.iter().copied().map(Step::Chunk).collect();
    steps.push(Step::Done);
    Script::new(steps)
}

/// In-memory transport that replays one script per streaming call.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    stream_calls: AtomicUsize,
    once_reply: Option<String>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        }
    }

    pub fn with_once_reply(mut self, reply: &str) -> Self {
        self.once_reply = Some(reply.to_string());
        self
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

struct Playback {
    steps: VecDeque<Step>,
    cancel: CancellationToken,
    honors_cancel: bool,
    finished: bool,
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn generate_once(&self, messages: Vec<ChatMessage>) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(messages);
        self.once_reply
            .clone()
            .ok_or_else(|| TransportError::http("no single-shot reply scripted"))
    }

    async fn generate_streaming(
        &self,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, TransportError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::network("script exhausted"))?;
        if let Some(err) = script.connect_error {
            return Err(err);
        }

        let playback = Playback {
            steps: script.steps.into(),
            cancel,
            honors_cancel: script.honors_cancel,
            finished: false,
        };

        Ok(Box::pin(stream::unfold(playback, |mut playback| async move {
            loop {
                if playback.finished {
                    return None;
                }
                if playback.honors_cancel && playback.cancel.is_cancelled() {
                    playback.finished = true;
                    return Some((Err(TransportError::canceled()), playback));
                }

                match playback.steps.pop_front()? {
                    Step::Chunk(text) => {
                        return Some((Ok(StreamEvent::Chunk(text.to_string())), playback))
                    }
                    Step::Done => {
                        playback.finished = true;
                        return Some((Ok(StreamEvent::Done), playback));
                    }
                    Step::Fail(err) => {
                        playback.finished = true;
                        return Some((Err(err), playback));
                    }
                    Step::Delay(duration) => {
                        if playback.honors_cancel {
                            tokio::select! {
                                _ = tokio::time::sleep(duration) => {}
                                _ = playback.cancel.cancelled() => {}
                            }
                        } else {
                            tokio::time::sleep(duration).await;
                        }
                    }
                    Step::Stall => {
                        if playback.honors_cancel {
                            playback.cancel.cancelled().await;
                        } else {
                            std::future::pending::<()>().await;
                        }
                    }
                }
            }
        })))
    }
}

/// Collects events for `id` until its terminal event arrives.
pub async fn next_session_events(
    rx: &mut mpsc::UnboundedReceiver<(SessionEvent, SessionId)>,
    id: SessionId,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for session events")
            .expect("sink channel closed");
        if received.1 != id {
            continue;
        }
        let terminal = received.0.is_terminal();
        events.push(received.0);
        if terminal {
            return events;
        }
    }
}
