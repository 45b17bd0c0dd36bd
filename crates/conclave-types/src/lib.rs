//! Shared type definitions for the Conclave social-deduction engine.
//!
//! This crate is the single source of truth for the data model used across
//! the workspace: who is playing, what they submit each turn, what the
//! arbitrator decides, what ends up in the shared history, and what gets
//! persisted.
//!
//! # Modules
//!
//! - [`ids`] -- Participant and game identifiers
//! - [`enums`] -- Roles, message kinds, end reasons
//! - [`recipients`] -- Normalized message addressing
//! - [`structs`] -- Submissions, decisions, history entries, summaries
//! - [`events`] -- Tagged events written to the persisted game log

pub mod enums;
pub mod events;
pub mod ids;
pub mod recipients;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{EndReason, MessageKind, Role};
pub use events::{EventPayload, GameEvent};
pub use ids::{ARBITRATOR_ID, BROADCAST_SENTINEL, GameId, ParticipantId};
pub use recipients::Recipients;
pub use structs::{
    ArbitrationDecision, GameSummary, HistoryEntry, Participant, SelectedMessage, Submission,
};
