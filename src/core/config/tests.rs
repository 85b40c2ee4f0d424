use super::defaults::{DEFAULT_BASE_URL, DEFAULT_CANCEL_GRACE, DEFAULT_MODEL, DEFAULT_TIMEOUT};
use super::{resolve, Config, ConfigError, Overrides};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
}

#[test]
fn test_load_config_file_values() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "base_url = \"http://localhost:11434/v1\"\nmodel = \"llama3\"\ntimeout_secs = 5\ncancel_grace_ms = 250\n",
    )
    .expect("write config");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config.base_url.as_deref(), Some("http://localhost:11434/v1"));
    assert_eq!(config.model.as_deref(), Some("llama3"));
    assert_eq!(config.timeout_secs, Some(5));
    assert_eq!(config.cancel_grace_ms, Some(250));
}

#[test]
fn test_invalid_toml_reports_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "model = [").expect("write config");

    let err = Config::load_from_path(&config_path).expect_err("parse should fail");

    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("config.toml"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_defaults_apply_with_only_api_key() {
    let settings = resolve(
        &Config::default(),
        &Overrides::default(),
        env_from(&[("OPENAI_API_KEY", "sk-test")]),
    )
    .expect("resolve");

    assert_eq!(settings.provider.api_key, "sk-test");
    assert_eq!(settings.provider.base_url, DEFAULT_BASE_URL);
    assert_eq!(settings.provider.model, DEFAULT_MODEL);
    assert_eq!(settings.provider.timeout, DEFAULT_TIMEOUT);
    assert_eq!(settings.controller.deadline, DEFAULT_TIMEOUT);
    assert_eq!(settings.controller.cancel_grace, DEFAULT_CANCEL_GRACE);
    assert!(settings.controller.system_prompt.is_some());
}

#[test]
fn test_missing_api_key_is_an_error() {
    let err = resolve(
        &Config::default(),
        &Overrides::default(),
        env_from(&[("OPENAI_API_KEY", "   ")]),
    )
    .expect_err("blank key");

    assert!(matches!(err, ConfigError::MissingApiKey));
}

#[test]
fn test_precedence_flags_over_env_over_file() {
    let config = Config {
        base_url: Some("http://file/v1".into()),
        model: Some("file-model".into()),
        timeout_secs: Some(9),
        ..Default::default()
    };
    let env = env_from(&[
        ("OPENAI_API_KEY", "sk-test"),
        ("OPENAI_BASE_URL", "http://env/v1"),
        ("OPENAI_MODEL", "env-model"),
        ("ZERO_TIMEOUT_SECS", "12"),
    ]);

    let from_env = resolve(&config, &Overrides::default(), &env).expect("resolve");
    assert_eq!(from_env.provider.base_url, "http://env/v1");
    assert_eq!(from_env.provider.model, "env-model");
    assert_eq!(from_env.provider.timeout, Duration::from_secs(12));

    let overrides = Overrides {
        model: Some("flag-model".into()),
        timeout_secs: Some(3),
        ..Default::default()
    };
    let from_flags = resolve(&config, &overrides, &env).expect("resolve");
    assert_eq!(from_flags.provider.base_url, "http://env/v1");
    assert_eq!(from_flags.provider.model, "flag-model");
    assert_eq!(from_flags.controller.deadline, Duration::from_secs(3));

    let file_only = resolve(&config, &Overrides::default(), env_from(&[("OPENAI_API_KEY", "k")]))
        .expect("resolve");
    assert_eq!(file_only.provider.base_url, "http://file/v1");
    assert_eq!(file_only.provider.timeout, Duration::from_secs(9));
}

#[test]
fn test_invalid_timeouts_are_rejected() {
    let env = env_from(&[("OPENAI_API_KEY", "k"), ("ZERO_TIMEOUT_SECS", "soon")]);
    let err = resolve(&Config::default(), &Overrides::default(), env).expect_err("bad env");
    assert!(matches!(
        err,
        ConfigError::InvalidTimeout { origin: "ZERO_TIMEOUT_SECS", .. }
    ));

    let config = Config {
        timeout_secs: Some(0),
        ..Default::default()
    };
    let err = resolve(&config, &Overrides::default(), env_from(&[("OPENAI_API_KEY", "k")]))
        .expect_err("zero timeout");
    assert!(matches!(
        err,
        ConfigError::InvalidTimeout { origin: "config.toml", .. }
    ));
}

#[test]
fn test_empty_system_prompt_disables_it() {
    let overrides = Overrides {
        system_prompt: Some(String::new()),
        ..Default::default()
    };
    let settings = resolve(
        &Config::default(),
        &overrides,
        env_from(&[("OPENAI_API_KEY", "k")]),
    )
    .expect("resolve");

    assert_eq!(settings.controller.system_prompt, None);
}

#[test]
fn test_provider_settings_debug_redacts_key() {
    let settings = resolve(
        &Config::default(),
        &Overrides::default(),
        env_from(&[("OPENAI_API_KEY", "sk-secret")]),
    )
    .expect("resolve");

    let rendered = format!("{:?}", settings.provider);
    assert!(!rendered.contains("sk-secret"));
    assert!(rendered.contains("<redacted>"));
}
