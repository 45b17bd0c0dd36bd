//! One turn of play: Bidding, Arbitration, Distribution, then the
//! termination check.
//!
//! [`TurnCoordinator::run_turn`] is the only code that mutates
//! [`GameState`]. Within a turn:
//!
//! 1. **Bidding**: every bidder receives a snapshot of its visible history
//!    taken before any bid is collected, and all bids run concurrently.
//!    The phase ends only when every bid (retries included) has resolved.
//! 2. **Arbitration**: one call with the full history and every
//!    submission.
//! 3. **Distribution**: selected messages are appended to the ledger in
//!    the order the arbitrator returned them. Empty messages are skipped.
//! 4. **Termination**: a declared winner or the turn limit ends the game;
//!    otherwise the turn counter advances.
//!
//! Agent failures never surface here; only event-log failures do.

use std::collections::BTreeSet;

use futures::future::join_all;
use tracing::{debug, info, warn};

use conclave_types::{
    ArbitrationDecision, EndReason, EventPayload, GameEvent, HistoryEntry, Participant,
    ParticipantId, Role, SelectedMessage, Submission,
};

use crate::agent::{Arbiter, Bidder};
use crate::error::{GameError, LogError};
use crate::event_log::EventSink;
use crate::history::{HistoryLedger, VisibleHistory};

/// Limits applied to the arbitrator's selection.
///
/// Unbounded by default; the arbitrator alone decides how many messages
/// are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// Broadcasts delivered per turn at most. Direct messages are never
    /// capped.
    pub max_broadcasts_per_turn: Option<usize>,
}

/// Mutable state of one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    turn: u64,
    winner: Option<String>,
    end_reason: Option<EndReason>,
    ledger: HistoryLedger,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    /// A fresh game at turn 1.
    pub const fn new() -> Self {
        Self {
            turn: 1,
            winner: None,
            end_reason: None,
            ledger: HistoryLedger::new(),
        }
    }

    /// The current (or, once terminated, last played) turn.
    pub const fn turn(&self) -> u64 {
        self.turn
    }

    /// The declared winner.
    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    /// Whether the game has ended.
    pub const fn is_terminated(&self) -> bool {
        self.end_reason.is_some()
    }

    /// Why the game ended.
    pub const fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    /// Every delivered message.
    pub const fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// Record a winner. The first winner sticks.
    fn declare_winner(&mut self, winner: String) {
        if self.winner.is_none() {
            self.winner = Some(winner);
        }
    }

    /// End the game. The first reason sticks.
    pub(crate) const fn terminate(&mut self, reason: EndReason) {
        if self.end_reason.is_none() {
            self.end_reason = Some(reason);
        }
    }

    const fn advance(&mut self) {
        self.turn = self.turn.saturating_add(1);
    }
}

/// Whether the game goes on after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Play the next turn.
    Continue,
    /// The game ended.
    Terminal(EndReason),
}

/// What happened during one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSummary {
    /// The turn that was played.
    pub turn: u64,
    /// Every submission, in seating order.
    pub submissions: Vec<(ParticipantId, Submission)>,
    /// Submissions that are safe defaults after failed calls.
    pub degraded_bids: usize,
    /// The decision as applied.
    pub decision: ArbitrationDecision,
    /// The decision is a safe default after a failed call.
    pub arbitration_degraded: bool,
    /// Messages appended to the ledger.
    pub delivered: usize,
    /// Continue or stop.
    pub outcome: TurnOutcome,
}

/// Drives single turns for a fixed table of agents.
#[derive(Debug)]
pub struct TurnCoordinator<B, A> {
    bidders: Vec<B>,
    arbiter: A,
    seats: Vec<Participant>,
    arbitrator: Participant,
    selection: SelectionPolicy,
    history_window: usize,
    max_turns: u64,
}

impl<B: Bidder, A: Arbiter> TurnCoordinator<B, A> {
    /// Seat `bidders` (in order) under `arbiter`, with a turn limit.
    ///
    /// The history window defaults to unlimited and the selection policy
    /// to unbounded.
    pub fn new(bidders: Vec<B>, arbiter: A, max_turns: u64) -> Self {
        let seats = bidders
            .iter()
            .map(|b| Participant::ordinary(b.id().clone()))
            .collect();
        let arbitrator = Participant {
            id: arbiter.id().clone(),
            role: Role::Arbitrator,
        };
        Self {
            bidders,
            arbiter,
            seats,
            arbitrator,
            selection: SelectionPolicy::default(),
            history_window: 0,
            max_turns,
        }
    }

    /// Apply a selection policy.
    #[must_use]
    pub const fn with_selection(mut self, selection: SelectionPolicy) -> Self {
        self.selection = selection;
        self
    }

    /// Limit each agent's context to the most recent `window` visible
    /// entries (`0` means unlimited).
    #[must_use]
    pub const fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Ordinary participants in seating order.
    pub fn seats(&self) -> &[Participant] {
        &self.seats
    }

    /// The arbitrator.
    pub const fn arbitrator(&self) -> &Participant {
        &self.arbitrator
    }

    /// The turn limit.
    pub const fn max_turns(&self) -> u64 {
        self.max_turns
    }

    /// Check that the table can play: at least one seat, and every id
    /// (the arbitrator's included) used once.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NoParticipants`] for an empty table and
    /// [`GameError::DuplicateParticipant`] for a reused id.
    pub fn check_table(&self) -> Result<(), GameError> {
        if self.seats.is_empty() {
            return Err(GameError::NoParticipants);
        }
        let mut seen: BTreeSet<&ParticipantId> = BTreeSet::new();
        seen.insert(&self.arbitrator.id);
        for seat in &self.seats {
            if !seen.insert(&seat.id) {
                return Err(GameError::DuplicateParticipant(seat.id.clone()));
            }
        }
        Ok(())
    }

    fn is_seated(&self, id: &ParticipantId) -> bool {
        *id == self.arbitrator.id || self.seats.iter().any(|p| p.id == *id)
    }

    /// Play the current turn.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::AlreadyEnded`] if `state` is terminated, the
    /// [`check_table`](Self::check_table) errors for an invalid table, and
    /// [`GameError::Persistence`] if an event cannot be recorded. State
    /// changes made before a persistence failure are kept.
    pub async fn run_turn(
        &self,
        state: &mut GameState,
        sink: &mut dyn EventSink,
    ) -> Result<TurnSummary, GameError> {
        let turn = state.turn();
        if state.is_terminated() {
            return Err(GameError::AlreadyEnded { turn });
        }
        self.check_table()?;
        let persist = |source: LogError| GameError::Persistence { turn, source };
        info!(turn, "turn started");

        // --- Bidding ---
        let (submissions, degraded_bids) = self.phase_bidding(turn, state.ledger()).await;
        for (id, submission, degraded) in &submissions {
            sink.record(&GameEvent::bid(turn, id.clone(), submission, *degraded))
                .map_err(persist)?;
        }
        let submissions: Vec<(ParticipantId, Submission)> = submissions
            .into_iter()
            .map(|(id, submission, _)| (id, submission))
            .collect();

        // --- Arbitration ---
        let full_view = state.ledger().snapshot_for(&self.arbitrator, self.history_window);
        let arbitration = self.arbiter.arbitrate(turn, &full_view, &submissions).await;
        if arbitration.degraded {
            warn!(turn, "arbitration degraded to empty selection");
        }
        sink.record(&GameEvent::now(
            turn,
            EventPayload::Arbitration {
                decision: arbitration.value.clone(),
                degraded: arbitration.degraded,
            },
        ))
        .map_err(persist)?;
        let decision = arbitration.value;

        // --- Distribution ---
        let delivered = self.phase_distribution(turn, &decision.selected_messages, state, sink)?;

        // --- Termination ---
        let outcome = self.check_termination(turn, decision.winner.as_deref(), state);

        info!(
            turn,
            delivered,
            degraded_bids,
            winner = ?decision.winner,
            "turn finished"
        );

        Ok(TurnSummary {
            turn,
            submissions,
            degraded_bids,
            decision,
            arbitration_degraded: arbitration.degraded,
            delivered,
            outcome,
        })
    }

    /// Collect every bid concurrently against a snapshot taken up front.
    async fn phase_bidding(
        &self,
        turn: u64,
        ledger: &HistoryLedger,
    ) -> (Vec<(ParticipantId, Submission, bool)>, usize) {
        let snapshots: Vec<VisibleHistory> = self
            .seats
            .iter()
            .map(|seat| ledger.snapshot_for(seat, self.history_window))
            .collect();

        let outcomes = join_all(
            self.bidders
                .iter()
                .zip(&snapshots)
                .map(|(bidder, view)| bidder.submit_bid(turn, view)),
        )
        .await;

        let mut degraded = 0usize;
        let submissions = self
            .bidders
            .iter()
            .zip(outcomes)
            .map(|(bidder, outcome)| {
                if outcome.degraded {
                    degraded = degraded.saturating_add(1);
                }
                (bidder.id().clone(), outcome.value, outcome.degraded)
            })
            .collect();

        debug!(turn, bidders = self.bidders.len(), degraded, "bidding complete");
        (submissions, degraded)
    }

    /// Append selected messages to the ledger in arbitration order.
    fn phase_distribution(
        &self,
        turn: u64,
        selected: &[SelectedMessage],
        state: &mut GameState,
        sink: &mut dyn EventSink,
    ) -> Result<usize, GameError> {
        let mut broadcasts = 0usize;
        let mut delivered = 0usize;

        for message in selected {
            let text = message.text.trim();
            if text.is_empty() {
                debug!(turn, speaker = %message.speaker, "skipping empty selected message");
                continue;
            }

            if message.recipients.is_broadcast() {
                if let Some(cap) = self.selection.max_broadcasts_per_turn
                    && broadcasts >= cap
                {
                    warn!(turn, speaker = %message.speaker, cap, "broadcast over per-turn cap dropped");
                    continue;
                }
                broadcasts = broadcasts.saturating_add(1);
            }

            if !self.is_seated(&message.speaker) {
                warn!(turn, speaker = %message.speaker, "selected message from unknown speaker");
            }

            let entry = HistoryEntry {
                turn,
                sender: message.speaker.clone(),
                recipients: message.recipients.clone(),
                text: text.to_owned(),
            };
            let event = GameEvent::delivered(&entry, &message.selection_rationale);
            state.ledger.append(entry);
            delivered = delivered.saturating_add(1);
            sink.record(&event)
                .map_err(|source| GameError::Persistence { turn, source })?;
        }

        Ok(delivered)
    }

    fn check_termination(&self, turn: u64, winner: Option<&str>, state: &mut GameState) -> TurnOutcome {
        if let Some(winner) = winner {
            info!(turn, winner, "winner declared");
            state.declare_winner(winner.to_owned());
            state.terminate(EndReason::WinnerDeclared);
            return TurnOutcome::Terminal(EndReason::WinnerDeclared);
        }
        if turn >= self.max_turns {
            info!(turn, max_turns = self.max_turns, "turn limit reached");
            state.terminate(EndReason::MaxTurnsReached);
            return TurnOutcome::Terminal(EndReason::MaxTurnsReached);
        }
        state.advance();
        TurnOutcome::Continue
    }
}
