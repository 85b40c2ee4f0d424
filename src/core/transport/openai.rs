use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use memchr::memchr;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ChatTransport, ChunkStream, StreamEvent, TransportError};
use crate::api::{ChatMessage, ChatRequest, ChatResponse, CompletionResponse};
use crate::core::config::ProviderSettings;
use crate::utils::url::construct_api_url;

/// Talks to any provider exposing an OpenAI-style `chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiTransport {
    pub fn new(settings: &ProviderSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.timeout)
            .build()?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: reqwest::Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            timeout: settings.timeout,
        }
    }

    fn completion_request(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream,
        };
        self.client
            .post(construct_api_url(&self.base_url, "chat/completions"))
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(&request)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    debug!(%status, "provider rejected request");
    Err(TransportError::http(format_api_error(&error_text)))
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn generate_once(&self, messages: Vec<ChatMessage>) -> Result<String, TransportError> {
        let response = self.completion_request(&messages, false).send().await?;
        let response = ensure_success(response).await?;
        let body = response.text().await?;

        let parsed: CompletionResponse =
            serde_json::from_str(&body).map_err(|_| unexpected_payload(&body))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| TransportError::protocol("completion response carried no content"))
    }

    async fn generate_streaming(
        &self,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, TransportError> {
        let send = self.completion_request(&messages, true).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::canceled()),
            response = send => response?,
        };
        let response = ensure_success(response).await?;
        Ok(sse_events(response.bytes_stream(), cancel))
    }
}

/// Longest line accepted from a provider before the stream is rejected.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits raw body bytes into newline-terminated lines.
struct LineBuffer {
    buffer: Vec<u8>,
    max_line: usize,
}

impl LineBuffer {
    fn new(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Errors once the unterminated tail outgrows the line limit.
    fn check_partial(&mut self) -> Result<(), TransportError> {
        if self.buffer.len() <= self.max_line {
            return Ok(());
        }
        self.buffer.clear();
        Err(TransportError::protocol(format!(
            "stream line exceeds {} bytes without a newline",
            self.max_line
        )))
    }

    fn next_line(&mut self) -> Option<Result<String, TransportError>> {
        let newline_pos = memchr(b'\n', &self.buffer)?;
        let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        Some(decode_line(&line[..newline_pos]))
    }

    /// Whatever is left once the body closes without a trailing newline.
    fn take_rest(&mut self) -> Option<Result<String, TransportError>> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> Result<String, TransportError> {
    std::str::from_utf8(bytes)
        .map(|line| line.trim().to_string())
        .map_err(|err| TransportError::protocol(format!("invalid UTF-8 in stream: {err}")))
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(payload: &str) -> Option<Result<StreamEvent, TransportError>> {
    if payload == "[DONE]" {
        return Some(Ok(StreamEvent::Done));
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(|content| Ok(StreamEvent::Chunk(content))),
        Err(_) => {
            if payload.trim().is_empty() {
                return None;
            }
            Some(Err(unexpected_payload(payload)))
        }
    }
}

/// A body that is not the expected response shape. JSON carrying an `error`
/// object is the provider reporting a failure; anything else is malformed.
fn unexpected_payload(payload: &str) -> TransportError {
    let provider_error = serde_json::from_str::<serde_json::Value>(payload)
        .is_ok_and(|value| value.get("error").is_some());
    if provider_error {
        TransportError::http(format_api_error(payload))
    } else {
        TransportError::protocol(format_api_error(payload))
    }
}

fn process_sse_line(line: &str) -> Option<Result<StreamEvent, TransportError>> {
    extract_data_payload(line).and_then(handle_data_payload)
}

struct SseState<S> {
    body: Pin<Box<S>>,
    lines: LineBuffer,
    pending: VecDeque<Result<StreamEvent, TransportError>>,
    cancel: CancellationToken,
    finished: bool,
}

impl<S> SseState<S> {
    fn drain_lines(&mut self) {
        while let Some(line) = self.lines.next_line() {
            self.queue_line(line);
        }
        if let Err(err) = self.lines.check_partial() {
            self.pending.push_back(Err(err));
        }
    }

    fn queue_line(&mut self, line: Result<String, TransportError>) {
        match line {
            Ok(line) => {
                if let Some(item) = process_sse_line(&line) {
                    self.pending.push_back(item);
                }
            }
            Err(err) => self.pending.push_back(Err(err)),
        }
    }
}

/// Turns a server-sent-event body into the transport's chunk stream.
///
/// Items already parsed are handed out before the cancellation token is
/// consulted, so nothing that arrived over the wire is dropped. The stream
/// ends after the first `Done` or error.
pub(crate) fn sse_events<S, B, E>(body: S, cancel: CancellationToken) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    sse_events_with_line_limit(body, cancel, MAX_LINE_BYTES)
}

fn sse_events_with_line_limit<S, B, E>(
    body: S,
    cancel: CancellationToken,
    max_line: usize,
) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        lines: LineBuffer::new(max_line),
        pending: VecDeque::new(),
        cancel,
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if !matches!(item, Ok(StreamEvent::Chunk(_))) {
                    state.finished = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => None,
                next = state.body.next() => Some(next),
            };
            let Some(next) = next else {
                state.finished = true;
                return Some((Err(TransportError::canceled()), state));
            };

            match next {
                Some(Ok(bytes)) => {
                    state.lines.push(bytes.as_ref());
                    state.drain_lines();
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err.into()), state));
                }
                None => {
                    if let Some(rest) = state.lines.take_rest() {
                        state.queue_line(rest);
                    }
                    // Some providers close the connection without `[DONE]`.
                    state.pending.push_back(Ok(StreamEvent::Done));
                }
            }
        }
    }))
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Renders a provider error body for display next to the partial reply.
pub(crate) fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            return match extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
                Some(summary) => format!("API Error: {summary}\n```json\n{pretty_json}\n```"),
                None => format!("API Error:\n```json\n{pretty_json}\n```"),
            };
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{trimmed}\n```")
    } else {
        format!("API Error:\n```\n{trimmed}\n```")
    }
}
