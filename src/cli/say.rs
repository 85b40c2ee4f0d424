//! Non-interactive "say" command

use std::error::Error;
use std::fmt;
use std::io::{self, Write};

use crate::core::transport::TransportError;
use crate::core::{ChannelSink, FailureKind, SessionController, SessionEvent, StartError};

#[derive(Debug)]
pub enum SayError {
    Start(StartError),
    Failed { kind: FailureKind, message: String },
    Canceled,
    Transport(TransportError),
    Io(io::Error),
}

impl fmt::Display for SayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SayError::Start(err) => write!(f, "{err}"),
            SayError::Failed { kind, message } => write!(f, "{kind}: {message}"),
            SayError::Canceled => f.write_str("reply was canceled"),
            SayError::Transport(err) => write!(f, "{err}"),
            SayError::Io(err) => write!(f, "failed to write reply: {err}"),
        }
    }
}

impl Error for SayError {}

impl From<io::Error> for SayError {
    fn from(err: io::Error) -> Self {
        SayError::Io(err)
    }
}

pub async fn run_say(
    controller: &SessionController,
    prompt: Vec<String>,
    no_stream: bool,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: zero say <prompt>");
        std::process::exit(1);
    }

    let mut stdout = io::stdout();
    let outcome = if no_stream {
        say_once(controller, &prompt, &mut stdout).await
    } else {
        say_streaming(controller, &prompt, &mut stdout).await
    };

    if let Err(err) = outcome {
        eprintln!("\n❌ Error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

/// Streams the reply into `out` chunk by chunk and returns the full text.
pub async fn say_streaming<W: Write>(
    controller: &SessionController,
    prompt: &str,
    out: &mut W,
) -> Result<String, SayError> {
    let (sink, mut rx) = ChannelSink::new();
    let handle = controller.start(prompt, sink).map_err(SayError::Start)?;

    while let Some((event, id)) = rx.recv().await {
        if id != handle.id() {
            continue;
        }
        match event {
            SessionEvent::ChunkReceived(text) => {
                write!(out, "{text}")?;
                out.flush()?;
            }
            SessionEvent::Completed(text) => {
                writeln!(out)?;
                return Ok(text);
            }
            SessionEvent::Canceled(_) => return Err(SayError::Canceled),
            SessionEvent::Failed { kind, message, .. } => {
                return Err(SayError::Failed { kind, message })
            }
        }
    }
    Err(SayError::Canceled)
}

pub async fn say_once<W: Write>(
    controller: &SessionController,
    prompt: &str,
    out: &mut W,
) -> Result<String, SayError> {
    let reply = controller
        .generate_once(prompt)
        .await
        .map_err(SayError::Transport)?;
    writeln!(out, "{reply}")?;
    Ok(reply)
}
