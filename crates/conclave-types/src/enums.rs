//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};

/// Role category of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A regular player who bids and speaks.
    Ordinary,
    /// The game master: selects messages, may speak, declares winners.
    /// Sees the full ledger.
    Arbitrator,
}

/// How a delivered message is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Visible to every participant.
    Broadcast,
    /// Visible to the sender, its recipients and the arbitrator.
    Direct,
}

/// Why a game stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The arbitrator declared a winner.
    WinnerDeclared,
    /// The configured turn limit was reached without a winner.
    MaxTurnsReached,
    /// An operator stop request or a fatal infrastructure failure.
    Aborted,
}

impl EndReason {
    /// Stable lowercase label used in logs and transcripts.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WinnerDeclared => "winner_declared",
            Self::MaxTurnsReached => "max_turns_reached",
            Self::Aborted => "aborted",
        }
    }
}

impl core::fmt::Display for EndReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
