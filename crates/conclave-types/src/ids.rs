//! Identifier types.
//!
//! Participants are addressed by short human-readable names (`P1`, `P2`,
//! `GM`) because those names appear verbatim in prompts and in the model's
//! output. Games get a time-ordered UUID so log directories and summaries
//! sort chronologically.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identifier the arbitrator uses in history and in recipient lists.
pub const ARBITRATOR_ID: &str = "GM";

/// Sentinel recipient meaning "every participant".
pub const BROADCAST_SENTINEL: &str = "ALL";

/// Unique identifier for a participant within one game.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create an identifier from any string-like value.
    ///
    /// Surrounding whitespace is trimmed since models routinely emit
    /// `"P1, P2"` style lists.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_owned())
    }

    /// The identifier of the arbitrator.
    pub fn arbitrator() -> Self {
        Self(ARBITRATOR_ID.to_owned())
    }

    /// The conventional id of the `n`-th ordinary participant (1-based).
    pub fn player(n: u32) -> Self {
        Self(format!("P{n}"))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id names the arbitrator.
    pub fn is_arbitrator(&self) -> bool {
        self.0 == ARBITRATOR_ID
    }
}

impl core::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Unique identifier for one game run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameId(pub Uuid);

impl GameId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for GameId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
