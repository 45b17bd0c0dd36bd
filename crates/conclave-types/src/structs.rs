//! Core data model: participants, submissions, arbitration decisions,
//! history entries and the end-of-game summary.

use serde::{Deserialize, Serialize};

use crate::enums::{EndReason, MessageKind, Role};
use crate::ids::{GameId, ParticipantId};
use crate::recipients::Recipients;

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A seat at the table. Identity is fixed for the lifetime of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique id within the game.
    pub id: ParticipantId,
    /// Role category.
    pub role: Role,
}

impl Participant {
    /// An ordinary participant.
    pub const fn ordinary(id: ParticipantId) -> Self {
        Self {
            id,
            role: Role::Ordinary,
        }
    }

    /// The arbitrator, under its conventional id.
    pub fn arbitrator() -> Self {
        Self {
            id: ParticipantId::arbitrator(),
            role: Role::Arbitrator,
        }
    }

    /// Whether this participant has omniscient visibility.
    pub const fn is_arbitrator(&self) -> bool {
        matches!(self.role, Role::Arbitrator)
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// One participant's bid and optional message for the current turn.
///
/// Produced fresh every turn and never carried into the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Desire to speak, always within `[0.0, 1.0]` once validated.
    pub bid: f64,
    /// Message text; empty means the participant stays silent.
    pub message: String,
    /// Intended audience.
    pub recipients: Recipients,
    /// Free-text reasoning, informational only.
    pub rationale: String,
}

impl Submission {
    /// The inert submission: zero bid, no message, broadcast audience.
    pub fn inert(rationale: impl Into<String>) -> Self {
        Self {
            bid: 0.0,
            message: String::new(),
            recipients: Recipients::All,
            rationale: rationale.into(),
        }
    }

    /// Whether the submission carries no message.
    pub fn is_silent(&self) -> bool {
        self.message.trim().is_empty()
    }
}

impl Default for Submission {
    fn default() -> Self {
        Self::inert(String::new())
    }
}

// ---------------------------------------------------------------------------
// Arbitration
// ---------------------------------------------------------------------------

/// A message the arbitrator chose to deliver this turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedMessage {
    /// Who speaks (a participant or the arbitrator itself).
    pub speaker: ParticipantId,
    /// Resolved audience.
    pub recipients: Recipients,
    /// Message text.
    pub text: String,
    /// Why the arbitrator selected it.
    pub selection_rationale: String,
}

impl SelectedMessage {
    /// Broadcast or direct.
    pub const fn kind(&self) -> MessageKind {
        if self.recipients.is_broadcast() {
            MessageKind::Broadcast
        } else {
            MessageKind::Direct
        }
    }
}

/// The arbitrator's decision for one turn. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationDecision {
    /// Messages to deliver, in delivery order.
    pub selected_messages: Vec<SelectedMessage>,
    /// Winning side, if the game is decided.
    pub winner: Option<String>,
    /// Overall explanation.
    pub rationale: String,
}

impl ArbitrationDecision {
    /// A decision that delivers nothing and declares no winner.
    pub fn empty(rationale: impl Into<String>) -> Self {
        Self {
            selected_messages: Vec::new(),
            winner: None,
            rationale: rationale.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One delivered message: the atomic unit of game memory.
///
/// Appended once to the ledger and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Turn in which the message was delivered.
    pub turn: u64,
    /// Who said it.
    pub sender: ParticipantId,
    /// Audience.
    pub recipients: Recipients,
    /// What was said.
    pub text: String,
}

impl HistoryEntry {
    /// Broadcast or direct.
    pub const fn kind(&self) -> MessageKind {
        if self.recipients.is_broadcast() {
            MessageKind::Broadcast
        } else {
            MessageKind::Direct
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Terminal summary of one game, persisted as `game_summary.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    /// Which game this summarizes.
    pub game_id: GameId,
    /// `false` only when the game loop aborted on an infrastructure failure.
    pub success: bool,
    /// A winner was declared.
    pub completed: bool,
    /// The declared winner, if any.
    pub winner: Option<String>,
    /// Number of the last turn played.
    pub turn_count: u64,
    /// Configured turn limit.
    pub max_turns: u64,
    /// The game ran out of turns without a winner.
    pub max_turns_reached: bool,
    /// Why the game stopped.
    pub end_reason: EndReason,
    /// Total delivered messages.
    pub total_messages: usize,
    /// Delivered broadcasts.
    pub public_messages: usize,
    /// Delivered direct messages.
    pub direct_messages: usize,
    /// Ordinary participants, in seating order.
    pub participants: Vec<ParticipantId>,
    /// Failure description when `success` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_submission_is_silent_broadcast() {
        let submission = Submission::inert("no response");
        assert!(submission.bid.abs() < f64::EPSILON);
        assert!(submission.is_silent());
        assert_eq!(submission.recipients, Recipients::All);
        assert_eq!(submission.rationale, "no response");
    }

    #[test]
    fn selected_message_kind_follows_recipients() {
        let direct = SelectedMessage {
            speaker: ParticipantId::arbitrator(),
            recipients: Recipients::parse("P2"),
            text: String::from("You are the seer."),
            selection_rationale: String::new(),
        };
        assert_eq!(direct.kind(), MessageKind::Direct);

        let public = SelectedMessage {
            recipients: Recipients::All,
            ..direct
        };
        assert_eq!(public.kind(), MessageKind::Broadcast);
    }

    #[test]
    fn empty_decision_has_no_winner() {
        let decision = ArbitrationDecision::empty("arbitration failed");
        assert!(decision.selected_messages.is_empty());
        assert!(decision.winner.is_none());
    }
}
