//! Diagnostic logging setup.
//!
//! Logs go to stderr so streamed replies on stdout stay clean.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "ZERO_LOG";

fn filter_directives(zero_log: Option<String>, rust_log: Option<String>, verbose: bool) -> String {
    zero_log
        .or(rust_log)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| {
            if verbose {
                "zero=debug,warn".to_string()
            } else {
                "warn".to_string()
            }
        })
}

/// Installs the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_tracing(verbose: bool) {
    let directives = filter_directives(
        std::env::var(LOG_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
        verbose,
    );
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|err| {
        eprintln!("Ignoring invalid log filter {directives:?}: {err}");
        EnvFilter::new("warn")
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
