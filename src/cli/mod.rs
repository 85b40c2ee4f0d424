//! Command-line interface parsing and handling
//!
//! Resolves settings, builds the transport and controller once, then hands
//! them to the `chat` loop or the one-shot `say` command.

pub mod chat;
pub mod say;


use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::cli::chat::run_chat;
use crate::cli::say::run_say;
use crate::core::config::{self, Config, Overrides};
use crate::core::observer::{SessionObserver, TracingObserver};
use crate::core::transport::OpenAiTransport;
use crate::core::SessionController;
use crate::utils::logging;

#[derive(Parser, Debug)]
#[command(name = "zero")]
#[command(version)]
#[command(about = "A terminal chat client that streams replies from an OpenAI-compatible API")]
#[command(
    long_about = "zero sends prompts to an OpenAI-compatible chat completions endpoint and \
prints the reply as it streams in. Only one reply streams at a time.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY      Your API key (required)\n\
  OPENAI_BASE_URL     Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\
  OPENAI_MODEL        Model to use when --model is not given\n\
  ZERO_TIMEOUT_SECS   Deadline for one reply, in seconds\n\
  ZERO_LOG            Log filter, e.g. zero=debug (falls back to RUST_LOG)\n\n\
Chat controls:\n\
  Enter             Send the line as a prompt\n\
  Ctrl+C            Cancel the reply in progress, or quit at the prompt\n\
  /new              Start a fresh conversation\n\
  /quit             Quit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for chat
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// API base URL
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Deadline for one whole reply, in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// System prompt sent before every message (empty to disable)
    #[arg(long, global = true, value_name = "TEXT")]
    pub system: Option<String>,

    /// Read settings from this file instead of the default config.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug diagnostics to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the interactive chat loop (default)
    Chat,
    /// Send a single prompt and print the reply
    Say {
        /// Prompt text; multiple words are joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            system_prompt: self.system.clone(),
            timeout_secs: self.timeout,
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init_tracing(args.verbose);

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async_main(args));
    // The stdin reader parks a blocking thread that never wakes on its own.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let file_config = Config::load(args.config.as_deref())?;
    let settings = match config::resolve_from_env(&file_config, &args.overrides()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };
    debug!(
        base_url = %settings.provider.base_url,
        model = %settings.provider.model,
        timeout_secs = settings.provider.timeout.as_secs(),
        "resolved settings"
    );

    let transport = OpenAiTransport::new(&settings.provider)?;
    let observers: Vec<Arc<dyn SessionObserver>> = vec![Arc::new(TracingObserver)];
    let controller = SessionController::new(Arc::new(transport), settings.controller, observers);

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&controller, &settings.provider.model).await,
        Commands::Say { prompt, no_stream } => run_say(&controller, prompt, no_stream).await,
    }
}
