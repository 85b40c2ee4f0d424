//! Line-oriented interactive chat loop

use std::error::Error;
use std::future::Future;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{ChannelSink, SessionController, SessionEvent, SessionHandle, SessionId};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Input<'a> {
    Empty,
    Quit,
    NewConversation,
    Prompt(&'a str),
}

pub(crate) fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    match trimmed {
        "" => Input::Empty,
        "/quit" | "/exit" => Input::Quit,
        "/new" => Input::NewConversation,
        _ => Input::Prompt(trimmed),
    }
}

/// Writes one session event. Returns `true` once the event was terminal.
pub(crate) fn render_event<W: Write>(event: &SessionEvent, out: &mut W) -> io::Result<bool> {
    match event {
        SessionEvent::ChunkReceived(text) => {
            write!(out, "{text}")?;
            out.flush()?;
            return Ok(false);
        }
        SessionEvent::Completed(_) => writeln!(out)?,
        SessionEvent::Canceled(_) => writeln!(out, " (canceled)")?,
        SessionEvent::Failed { kind, message, .. } => {
            writeln!(out)?;
            writeln!(out, "❌ {kind}: {message}")?;
        }
    }
    writeln!(out)?;
    Ok(true)
}

fn print_banner(model: &str) {
    println!("💬 New conversation with {model}. Ctrl+C cancels a reply; /quit exits.");
}

pub async fn run_chat(controller: &SessionController, model: &str) -> Result<(), Box<dyn Error>> {
    print_banner(model);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (sink, mut rx) = ChannelSink::new();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let prompt = match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::NewConversation => {
                println!();
                print_banner(model);
                continue;
            }
            Input::Prompt(prompt) => prompt,
        };

        let handle = match controller.start(prompt, sink.clone()) {
            Ok(handle) => handle,
            Err(err) => {
                eprintln!("❌ {err}");
                continue;
            }
        };
        follow_session(controller, handle, &mut rx, &mut stdout, || {
            tokio::signal::ctrl_c()
        })
        .await?;
    }

    controller.shutdown();
    Ok(())
}

/// Prints events for `handle` until its terminal event, cancelling the
/// session the first time `interrupt` resolves.
pub(crate) async fn follow_session<W, F, Fut>(
    controller: &SessionController,
    handle: SessionHandle,
    rx: &mut mpsc::UnboundedReceiver<(SessionEvent, SessionId)>,
    out: &mut W,
    interrupt: F,
) -> io::Result<()>
where
    W: Write,
    F: Fn() -> Fut,
    Fut: Future,
{
    let mut cancel_sent = false;
    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some((event, id)) = received else {
                    return Ok(());
                };
                if id != handle.id() {
                    debug!(session_id = id.as_u64(), "ignoring event from an earlier session");
                    continue;
                }
                if render_event(&event, out)? {
                    return Ok(());
                }
            }
            _ = interrupt(), if !cancel_sent => {
                cancel_sent = true;
                controller.cancel(handle);
            }
        }
    }
}
