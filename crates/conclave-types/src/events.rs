//! Persisted game events.
//!
//! A game's durable record is an append-only sequence of [`GameEvent`]s,
//! one per phase outcome per turn. Each event carries its turn number, a
//! timestamp and a `phase` tag selecting the payload shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{EndReason, Role};
use crate::ids::ParticipantId;
use crate::recipients::Recipients;
use crate::structs::{ArbitrationDecision, HistoryEntry, Submission};

/// One entry in the persisted event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Turn the event belongs to (0 for setup).
    pub turn: u64,
    /// When the event was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Phase-specific payload.
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Payload of a [`GameEvent`], tagged by phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum EventPayload {
    /// Seating at game start.
    Setup {
        /// Every participant and its role.
        participants: BTreeMap<ParticipantId, Role>,
    },
    /// One participant's validated submission.
    Bid {
        /// Who submitted.
        participant: ParticipantId,
        /// Validated bid.
        bid: f64,
        /// Message text.
        message: String,
        /// Intended audience.
        recipients: Recipients,
        /// Participant's reasoning.
        rationale: String,
        /// The submission is the safe default after exhausted retries.
        degraded: bool,
    },
    /// The arbitrator's validated decision.
    Arbitration {
        /// The decision as it will be applied.
        decision: ArbitrationDecision,
        /// The decision is the safe default after exhausted retries.
        degraded: bool,
    },
    /// A message delivered into the shared history.
    Message {
        /// Speaker.
        sender: ParticipantId,
        /// Audience.
        recipients: Recipients,
        /// Message text.
        text: String,
        /// Direct (not broadcast).
        is_direct: bool,
        /// Arbitrator's reason for selecting it.
        selection_rationale: String,
    },
    /// The game stopped.
    GameEnd {
        /// Declared winner, if any.
        winner: Option<String>,
        /// Number of the last turn played.
        total_turns: u64,
        /// A winner was declared.
        completed: bool,
        /// The turn limit ended the game.
        max_turns_reached: bool,
        /// Why the game stopped.
        end_reason: EndReason,
    },
}

impl GameEvent {
    /// Stamp a payload with the current time.
    pub fn now(turn: u64, payload: EventPayload) -> Self {
        Self {
            turn,
            recorded_at: Utc::now(),
            payload,
        }
    }

    /// Setup event for the given seating.
    pub fn setup(participants: BTreeMap<ParticipantId, Role>) -> Self {
        Self::now(0, EventPayload::Setup { participants })
    }

    /// Bid event for one participant's submission.
    pub fn bid(
        turn: u64,
        participant: ParticipantId,
        submission: &Submission,
        degraded: bool,
    ) -> Self {
        Self::now(
            turn,
            EventPayload::Bid {
                participant,
                bid: submission.bid,
                message: submission.message.trim().to_owned(),
                recipients: submission.recipients.clone(),
                rationale: submission.rationale.clone(),
                degraded,
            },
        )
    }

    /// Delivery event for a history entry.
    pub fn delivered(entry: &HistoryEntry, selection_rationale: &str) -> Self {
        Self::now(
            entry.turn,
            EventPayload::Message {
                sender: entry.sender.clone(),
                recipients: entry.recipients.clone(),
                text: entry.text.clone(),
                is_direct: !entry.recipients.is_broadcast(),
                selection_rationale: selection_rationale.to_owned(),
            },
        )
    }

    /// The `phase` tag of this event.
    pub const fn phase(&self) -> &'static str {
        match self.payload {
            EventPayload::Setup { .. } => "setup",
            EventPayload::Bid { .. } => "bid",
            EventPayload::Arbitration { .. } => "arbitration",
            EventPayload::Message { .. } => "message",
            EventPayload::GameEnd { .. } => "game_end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_flat_with_phase_tag() {
        let entry = HistoryEntry {
            turn: 3,
            sender: ParticipantId::new("P1"),
            recipients: Recipients::parse("P2,P3"),
            text: String::from("I trust you two."),
        };
        let event = GameEvent::delivered(&entry, "strategic");
        let json = serde_json::to_value(&event).unwrap_or_default();

        assert_eq!(json.get("turn"), Some(&serde_json::json!(3)));
        assert_eq!(json.get("phase"), Some(&serde_json::json!("message")));
        assert_eq!(json.get("is_direct"), Some(&serde_json::json!(true)));
        assert_eq!(json.get("recipients"), Some(&serde_json::json!(["P2", "P3"])));
        assert_eq!(event.phase(), "message");
    }

    #[test]
    fn bid_event_trims_message() {
        let submission = Submission {
            bid: 0.4,
            message: String::from("  hello  "),
            recipients: Recipients::All,
            rationale: String::new(),
        };
        let event = GameEvent::bid(1, ParticipantId::new("P1"), &submission, false);
        assert!(matches!(
            event.payload,
            EventPayload::Bid { ref message, .. } if message == "hello"
        ));
    }
}
