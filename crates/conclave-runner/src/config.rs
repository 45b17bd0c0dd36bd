//! Backend configuration for the runner.
//!
//! Game settings come from `conclave.yaml` through
//! [`conclave_core::GameConfig`]. This module only adds what must not
//! live in that file: API keys and optional base-URL overrides, read from
//! the environment per provider.

use std::path::PathBuf;

use conclave_core::config::DEFAULT_CONFIG_FILE;
use conclave_core::{ModelSpec, Provider};

use crate::error::RunnerError;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "CONCLAVE_CONFIG";

/// Everything needed to call one model.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Which API dialect to speak.
    pub provider: Provider,
    /// Base API URL without a trailing slash.
    pub api_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature; ignored for models that reject it.
    pub temperature: f64,
}

impl BackendConfig {
    /// Resolve credentials for `spec` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::MissingCredential`] if the provider's API key
    /// is unset or empty.
    pub fn from_env(spec: &ModelSpec, temperature: f64) -> Result<Self, RunnerError> {
        Self::resolve(spec, temperature, |name| std::env::var(name).ok())
    }

    /// Resolve credentials for `spec` through `lookup`.
    ///
    /// - `<PROVIDER>_API_KEY` -- required
    /// - `<PROVIDER>_API_URL` -- optional, defaults to the public endpoint
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::MissingCredential`] if the key is unset or
    /// empty.
    pub fn resolve<F>(spec: &ModelSpec, temperature: f64, lookup: F) -> Result<Self, RunnerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = env_prefix(spec.provider);
        let key_var = format!("{prefix}_API_KEY");
        let api_key = lookup(&key_var)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RunnerError::MissingCredential {
                provider: spec.provider.to_string(),
                var: key_var,
            })?;

        let api_url = lookup(&format!("{prefix}_API_URL"))
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_api_url(spec.provider).to_owned());

        Ok(Self {
            provider: spec.provider,
            api_url: api_url.trim_end_matches('/').to_owned(),
            api_key,
            model: spec.model.clone(),
            temperature,
        })
    }
}

/// Path of the configuration file: `CONCLAVE_CONFIG` or `conclave.yaml`.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_VAR).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}

const fn env_prefix(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "OPENAI",
        Provider::OpenRouter => "OPENROUTER",
        Provider::Anthropic => "ANTHROPIC",
    }
}

const fn default_api_url(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "https://api.openai.com/v1",
        Provider::OpenRouter => "https://openrouter.ai/api/v1",
        Provider::Anthropic => "https://api.anthropic.com/v1",
    }
}
