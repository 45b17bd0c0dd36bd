//! Turn engine for LLM-driven social-deduction games.
//!
//! Every participant, including the arbitrating game master, is driven by
//! a language-model call. Each turn participants concurrently submit a bid
//! and an optional message; the arbitrator picks which messages enter the
//! shared history and whether someone has won.
//!
//! # Modules
//!
//! - [`sanitize`] -- Repair near-JSON model output into a JSON object
//! - [`validate`] -- Turn sanitized output into submissions and decisions
//! - [`history`] -- Append-only ledger with per-participant visibility
//! - [`retry`] -- Bounded retry with fixed delay and safe defaults
//! - [`prompt`] -- `minijinja` prompt templates
//! - [`agent`] -- Bidder/arbiter capabilities and model-backed agents
//! - [`turn`] -- Bidding, arbitration, distribution, termination
//! - [`game`] -- The game loop and operator control
//! - [`event_log`] -- Persisted events, transcript and summary
//! - [`config`] -- YAML configuration with environment overrides
//! - [`error`] -- Error types

pub mod agent;
pub mod config;
pub mod error;
pub mod event_log;
pub mod game;
pub mod history;
pub mod prompt;
pub mod retry;
pub mod sanitize;
pub mod turn;
pub mod validate;

pub use agent::{Arbiter, Bidder, GameBrief, ModelArbitrator, ModelClient, ModelPlayer, Outcome};
pub use config::{ConfigError, GameConfig, ModelSpec, Provider};
pub use error::{CallError, GameError, LogError};
pub use event_log::{EventSink, FileEventLog, MemoryEventLog};
pub use game::{GameControl, GameResult, run_game};
pub use history::{HistoryLedger, VisibleHistory};
pub use prompt::{Prompt, PromptEngine};
pub use retry::RetryPolicy;
pub use sanitize::{ModelReply, Sanitized};
pub use turn::{GameState, SelectionPolicy, TurnCoordinator, TurnOutcome, TurnSummary};
