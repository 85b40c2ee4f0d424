//! zero is a terminal chat client that streams replies from an
//! OpenAI-compatible chat completions API.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the single-flight [`core::SessionController`], the session
//!   state machine, the provider transport and settings resolution.
//! - [`api`] defines the chat request and response payloads.
//! - [`cli`] parses arguments and runs the `chat` loop and `say` command.
//! - [`utils`] holds URL and logging helpers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
