//! Error types for the turn engine.
//!
//! Two very different failure classes live here. [`CallError`] describes a
//! single failed model-call attempt; it is always absorbed by the retry
//! policy and never escapes a turn. [`GameError`] is the only error that
//! can stop a game abnormally. It comes from the surrounding
//! infrastructure (the event log) or from an invalid table, never from
//! the agents.

use conclave_types::ParticipantId;

/// A single model-call attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The language-model backend returned an error or was unreachable.
    #[error("model backend error: {0}")]
    Backend(String),

    /// The prompt could not be rendered.
    #[error("prompt render error: {0}")]
    Prompt(String),

    /// The reply could not be turned into structured data.
    #[error("malformed model output")]
    Malformed,

    /// The call exceeded the configured per-call deadline.
    #[error("model call exceeded {timeout_ms}ms deadline")]
    Timeout {
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },
}

/// Failure writing the persisted event log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Filesystem failure.
    #[error("event log I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An event could not be serialized.
    #[error("event log serialization error: {source}")]
    Serde {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The log was already finished and cannot accept more events.
    #[error("event log already closed")]
    Closed,
}

/// Fatal game-loop failure.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Persisting game state failed.
    #[error("persistence failed at turn {turn}: {source}")]
    Persistence {
        /// Turn during which the failure happened.
        turn: u64,
        /// The underlying log error.
        source: LogError,
    },

    /// The game was set up without any ordinary participants.
    #[error("a game needs at least one ordinary participant")]
    NoParticipants,

    /// Two seats share an id, or a seat reuses the arbitrator's id.
    #[error("participant id `{0}` is used more than once")]
    DuplicateParticipant(ParticipantId),

    /// A turn was requested after the game ended.
    #[error("game already ended after turn {turn}")]
    AlreadyEnded {
        /// The last turn played.
        turn: u64,
    },
}
