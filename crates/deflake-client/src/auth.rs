//! Endpoint and API key resolution
//!
//! The only place the environment is consulted. The result is an explicit
//! [`ClientSettings`] value handed to the transport.
//!
//! URL precedence:
//! 1. `--api-url` flag
//! 2. `DEFLAKE_API_URL` (or the configured variable)
//! 3. `api_url` from `.deflake/config.toml`, then the built-in default

use deflake_core::DeflakeConfig;
use std::env;

/// Resolved connection settings for the brain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Variable the key was expected in, for error messages
    pub api_key_env: String,
}

/// Build client settings from config, flags and environment
pub fn resolve_settings(config: &DeflakeConfig, api_url_flag: Option<&str>) -> ClientSettings {
    let api_url = api_url_flag
        .map(str::to_string)
        .or_else(|| non_empty_var(&config.api_url_env))
        .unwrap_or_else(|| config.api_url.clone());

    let api_key = non_empty_var(&config.api_key_env);
    if api_key.is_some() {
        tracing::debug!("Using API key from {}", config.api_key_env);
    }

    ClientSettings {
        api_url,
        api_key,
        api_key_env: config.api_key_env.clone(),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
