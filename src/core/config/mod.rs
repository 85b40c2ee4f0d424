//! Provider and controller settings, layered as defaults < `config.toml` <
//! environment < command-line flags.

pub mod data;
pub mod defaults;
pub mod io;

#[cfg(test)]
mod tests;

use std::time::Duration;

pub use data::{Config, Overrides, ProviderSettings};
pub use io::ConfigError;

use crate::core::controller::ControllerOptions;
use defaults::{
    DEFAULT_BASE_URL, DEFAULT_CANCEL_GRACE, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, DEFAULT_TIMEOUT,
    ENV_API_KEY, ENV_BASE_URL, ENV_MODEL, ENV_TIMEOUT_SECS,
};

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub controller: ControllerOptions,
}

/// Reads the process environment.
pub fn resolve_from_env(config: &Config, overrides: &Overrides) -> Result<Settings, ConfigError> {
    resolve(config, overrides, |key| std::env::var(key).ok())
}

/// Combines file values, environment lookups and flags into settings.
/// Empty environment values count as unset.
pub fn resolve<F>(config: &Config, overrides: &Overrides, env: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    let api_key = lookup(ENV_API_KEY).ok_or(ConfigError::MissingApiKey)?;
    let base_url = overrides
        .base_url
        .clone()
        .or_else(|| lookup(ENV_BASE_URL))
        .or_else(|| config.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let model = overrides
        .model
        .clone()
        .filter(|model| !model.is_empty())
        .or_else(|| lookup(ENV_MODEL))
        .or_else(|| config.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let timeout = resolve_timeout(config, overrides, lookup(ENV_TIMEOUT_SECS))?;

    let system_prompt = overrides
        .system_prompt
        .clone()
        .or_else(|| config.system_prompt.clone())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let cancel_grace = config
        .cancel_grace_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_CANCEL_GRACE);

    Ok(Settings {
        provider: ProviderSettings {
            base_url,
            api_key,
            model,
            timeout,
        },
        controller: ControllerOptions {
            system_prompt: Some(system_prompt).filter(|prompt| !prompt.trim().is_empty()),
            deadline: timeout,
            cancel_grace,
        },
    })
}

fn resolve_timeout(
    config: &Config,
    overrides: &Overrides,
    env_value: Option<String>,
) -> Result<Duration, ConfigError> {
    let (origin, secs) = if let Some(secs) = overrides.timeout_secs {
        ("--timeout", secs)
    } else if let Some(raw) = env_value {
        let secs = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidTimeout {
                origin: ENV_TIMEOUT_SECS,
                value: raw.clone(),
            })?;
        (ENV_TIMEOUT_SECS, secs)
    } else if let Some(secs) = config.timeout_secs {
        ("config.toml", secs)
    } else {
        return Ok(DEFAULT_TIMEOUT);
    };

    if secs == 0 {
        return Err(ConfigError::InvalidTimeout {
            origin,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
