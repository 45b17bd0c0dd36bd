//! Error types for the game runner.
//!
//! Startup problems surface as [`RunnerError`] and are wrapped with
//! `anyhow` context in `main`. Failures of individual model calls never
//! reach this type: backends report them as `CallError` so the retry
//! policy can absorb them.

/// Errors that stop the runner before or between games.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),

    /// A provider's API key is not set.
    #[error("missing credential: set {var} to use {provider} models")]
    MissingCredential {
        /// Provider that needs the key.
        provider: String,
        /// Environment variable holding the key.
        var: String,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
