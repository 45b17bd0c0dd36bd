//! Game configuration loaded from `conclave.yaml`.
//!
//! Every field has a default, so a missing or empty file is a valid
//! configuration. A handful of values can be overridden from the
//! environment after the file is read.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;
use crate::turn::SelectionPolicy;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "conclave.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A model specification is not of the form `provider:model`.
    #[error("invalid model spec `{spec}`: {reason}")]
    InvalidModelSpec {
        /// The offending spec string.
        spec: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A prompt template could not be loaded or compiled.
    #[error("prompt template `{name}`: {message}")]
    Template {
        /// Template name.
        name: String,
        /// Description of the failure.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GameConfig {
    /// Table size, turn limit, runs, rules.
    #[serde(default)]
    pub game: GameSection,
    /// Model-call retry behaviour.
    #[serde(default)]
    pub retry: RetrySection,
    /// Prompt history window.
    #[serde(default)]
    pub history: HistorySection,
    /// Arbitration selection policy.
    #[serde(default)]
    pub selection: SelectionSection,
    /// Which models drive the players and the arbitrator.
    #[serde(default)]
    pub models: ModelsSection,
    /// Where game logs are written.
    #[serde(default)]
    pub output: OutputSection,
}

impl GameConfig {
    /// Load configuration from a YAML file and apply environment
    /// overrides. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file exists but cannot be read,
    /// or [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::parse(&std::fs::read_to_string(path)?)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply `CONCLAVE_OUT_DIR`, `CONCLAVE_MAX_TURNS` and
    /// `CONCLAVE_PLAYERS` from `lookup`. Unparsable numbers are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("CONCLAVE_OUT_DIR").filter(|d| !d.trim().is_empty()) {
            self.output.out_dir = PathBuf::from(dir);
        }
        if let Some(turns) = lookup("CONCLAVE_MAX_TURNS").and_then(|v| v.trim().parse().ok()) {
            self.game.max_turns = turns;
        }
        if let Some(players) = lookup("CONCLAVE_PLAYERS").and_then(|v| v.trim().parse().ok()) {
            self.game.players = players;
        }
    }
}

/// Table size, turn limit and rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameSection {
    /// Number of ordinary players.
    #[serde(default = "default_players")]
    pub players: u32,
    /// Turn limit per game.
    #[serde(default = "default_max_turns")]
    pub max_turns: u64,
    /// Games played back to back by the runner.
    #[serde(default = "default_runs")]
    pub runs: u32,
    /// Rules text handed to every agent.
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
    /// Directory with prompt template overrides.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            players: default_players(),
            max_turns: default_max_turns(),
            runs: default_runs(),
            rules_file: None,
            templates_dir: None,
        }
    }
}

/// Retry behaviour for every model call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetrySection {
    /// Attempts per call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Optional deadline per attempt in milliseconds.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            call_timeout_ms: None,
        }
    }
}

impl RetrySection {
    /// The retry policy described by this section.
    pub const fn policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms));
        match self.call_timeout_ms {
            Some(ms) => policy.with_call_timeout(Duration::from_millis(ms)),
            None => policy,
        }
    }
}

/// How much visible history goes into each prompt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistorySection {
    /// Most recent visible entries per prompt; `0` means all.
    #[serde(default = "default_history_window")]
    pub window: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            window: default_history_window(),
        }
    }
}

/// Arbitration selection limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SelectionSection {
    /// Broadcasts delivered per turn at most; absent means unbounded.
    #[serde(default)]
    pub max_broadcasts_per_turn: Option<usize>,
}

impl SelectionSection {
    /// The selection policy described by this section.
    pub const fn policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            max_broadcasts_per_turn: self.max_broadcasts_per_turn,
        }
    }
}

/// Model selection per role.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelsSection {
    /// `provider:model` for ordinary players.
    #[serde(default = "default_player_model")]
    pub player: String,
    /// `provider:model` for the arbitrator; falls back to `player`.
    #[serde(default)]
    pub arbitrator: Option<String>,
    /// Sampling temperature for every call.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            player: default_player_model(),
            arbitrator: None,
            temperature: default_temperature(),
        }
    }
}

impl ModelsSection {
    /// Parsed player model.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidModelSpec`] for a malformed spec.
    pub fn player_spec(&self) -> Result<ModelSpec, ConfigError> {
        ModelSpec::parse(&self.player)
    }

    /// Parsed arbitrator model, defaulting to the player model.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidModelSpec`] for a malformed spec.
    pub fn arbitrator_spec(&self) -> Result<ModelSpec, ConfigError> {
        ModelSpec::parse(self.arbitrator.as_deref().unwrap_or(&self.player))
    }
}

/// Output locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputSection {
    /// Directory receiving one sub-directory per game.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
        }
    }
}

/// Language-model API provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// `OpenAI` chat completions.
    OpenAi,
    /// `OpenRouter`, which speaks the `OpenAI` chat API.
    OpenRouter,
    /// Anthropic messages API.
    Anthropic,
}

impl Provider {
    /// The spec prefix for this provider.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Anthropic => "anthropic",
        }
    }
}

impl core::fmt::Display for Provider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `provider:model` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Which API to call.
    pub provider: Provider,
    /// Model name as the provider knows it.
    pub model: String,
}

impl ModelSpec {
    /// Parse `provider:model`. Only the first `:` separates, so model
    /// names may themselves contain colons.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidModelSpec`] when the separator is
    /// missing, the provider is unknown or the model name is empty.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidModelSpec {
            spec: spec.to_owned(),
            reason: reason.to_owned(),
        };

        let (provider, model) = spec
            .trim()
            .split_once(':')
            .ok_or_else(|| invalid("expected `provider:model`"))?;

        let provider = match provider.trim().to_ascii_lowercase().as_str() {
            "openai" => Provider::OpenAi,
            "openrouter" => Provider::OpenRouter,
            "anthropic" => Provider::Anthropic,
            _ => return Err(invalid("unknown provider")),
        };

        let model = model.trim();
        if model.is_empty() {
            return Err(invalid("empty model name"));
        }

        Ok(Self {
            provider,
            model: model.to_owned(),
        })
    }
}

impl core::fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

const fn default_players() -> u32 {
    5
}

const fn default_max_turns() -> u64 {
    100
}

const fn default_runs() -> u32 {
    1
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_delay_ms() -> u64 {
    500
}

const fn default_history_window() -> usize {
    30
}

fn default_player_model() -> String {
    String::from("openai:gpt-4o-mini")
}

const fn default_temperature() -> f64 {
    0.1
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("game_logs")
}
