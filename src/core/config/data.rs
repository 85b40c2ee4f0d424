use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Contents of `config.toml`. Every field is optional; environment variables
/// and command-line flags take precedence.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Provider base URL, e.g. `https://api.openai.com/v1`
    pub base_url: Option<String>,
    /// Model identifier sent with each request
    pub model: Option<String>,
    /// System message prepended to every prompt; an empty string disables it
    pub system_prompt: Option<String>,
    /// Deadline for one whole exchange, in seconds
    pub timeout_secs: Option<u64>,
    /// How long a cancelled session may keep draining chunks, in milliseconds
    pub cancel_grace_ms: Option<u64>,
}

/// Everything the HTTP transport needs to reach the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Values supplied on the command line; they win over file and environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub timeout_secs: Option<u64>,
}

pub fn path_display(path: &Path) -> String {
    path.display().to_string()
}
