//! The game loop.
//!
//! [`run_game`] drives a [`TurnCoordinator`] turn after turn until a
//! winner is declared, the turn limit is reached, or an operator stop is
//! requested through [`GameControl`]. Every exit path writes a
//! `game_end` event and a [`GameSummary`] to the sink; a failing sink is
//! the only thing that makes the loop return an error, and even then a
//! best-effort summary is attempted first.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use conclave_types::{
    EndReason, EventPayload, GameEvent, GameId, GameSummary, MessageKind, Role,
};

use crate::agent::{Arbiter, Bidder};
use crate::error::GameError;
use crate::event_log::EventSink;
use crate::turn::{GameState, TurnCoordinator, TurnOutcome};

/// Operator control over a running game.
#[derive(Debug, Default)]
pub struct GameControl {
    stop: AtomicBool,
}

impl GameControl {
    /// A control with no stop requested.
    pub const fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
        }
    }

    /// Ask the game to stop before its next turn.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Result of a finished game.
#[derive(Debug, Clone)]
pub struct GameResult {
    /// The persisted summary.
    pub summary: GameSummary,
    /// Final state, including the full ledger.
    pub state: GameState,
}

/// Play one game to completion.
///
/// # Errors
///
/// Returns [`GameError::NoParticipants`] for an empty table,
/// [`GameError::DuplicateParticipant`] when an id is seated twice (or a
/// seat reuses the arbitrator's id), and [`GameError::Persistence`] when
/// the sink fails. Nothing is recorded for a rejected table. In the latter case a
/// `game_end` event and a summary with `success = false` have already
/// been offered to the sink.
pub async fn run_game<B: Bidder, A: Arbiter>(
    game_id: GameId,
    coordinator: &TurnCoordinator<B, A>,
    control: &GameControl,
    sink: &mut dyn EventSink,
) -> Result<GameResult, GameError> {
    coordinator.check_table()?;

    let mut state = GameState::new();
    let mut last_turn: u64 = 0;

    info!(
        game_id = %game_id,
        players = coordinator.seats().len(),
        max_turns = coordinator.max_turns(),
        "game starting"
    );

    let mut roles: BTreeMap<_, _> = coordinator
        .seats()
        .iter()
        .map(|seat| (seat.id.clone(), Role::Ordinary))
        .collect();
    roles.insert(coordinator.arbitrator().id.clone(), Role::Arbitrator);
    if let Err(source) = sink.record(&GameEvent::setup(roles)) {
        let failure = GameError::Persistence { turn: 0, source };
        return Err(abort(game_id, coordinator, &mut state, last_turn, sink, failure));
    }

    if coordinator.max_turns() == 0 {
        state.terminate(EndReason::MaxTurnsReached);
    }

    while !state.is_terminated() {
        if control.is_stop_requested() {
            info!(turn = state.turn(), "operator stop requested");
            state.terminate(EndReason::Aborted);
            break;
        }

        match coordinator.run_turn(&mut state, sink).await {
            Ok(turn) => {
                last_turn = turn.turn;
                if let TurnOutcome::Terminal(reason) = turn.outcome {
                    info!(turn = turn.turn, reason = %reason, "game reached terminal state");
                }
            }
            Err(failure) => {
                last_turn = state.turn();
                return Err(abort(game_id, coordinator, &mut state, last_turn, sink, failure));
            }
        }
    }

    let summary = summarize(game_id, coordinator, &state, last_turn, None);
    let closing = sink
        .record(&game_end_event(&summary))
        .and_then(|()| sink.finish(&summary));
    if let Err(source) = closing {
        let failure = GameError::Persistence {
            turn: last_turn,
            source,
        };
        error!(error = %failure, "failed to persist game end");
        return Err(failure);
    }

    info!(
        game_id = %game_id,
        winner = ?summary.winner,
        turns = summary.turn_count,
        end_reason = %summary.end_reason,
        messages = summary.total_messages,
        "game finished"
    );

    Ok(GameResult { summary, state })
}

/// Record whatever can still be recorded after a fatal failure and hand
/// the failure back.
fn abort<B: Bidder, A: Arbiter>(
    game_id: GameId,
    coordinator: &TurnCoordinator<B, A>,
    state: &mut GameState,
    last_turn: u64,
    sink: &mut dyn EventSink,
    failure: GameError,
) -> GameError {
    error!(game_id = %game_id, turn = last_turn, error = %failure, "game aborted");
    state.terminate(EndReason::Aborted);

    let summary = summarize(game_id, coordinator, state, last_turn, Some(failure.to_string()));
    if let Err(e) = sink.record(&game_end_event(&summary)) {
        warn!(error = %e, "could not record game end after failure");
    }
    if let Err(e) = sink.finish(&summary) {
        warn!(error = %e, "could not persist summary after failure");
    }
    failure
}

fn summarize<B: Bidder, A: Arbiter>(
    game_id: GameId,
    coordinator: &TurnCoordinator<B, A>,
    state: &GameState,
    last_turn: u64,
    error: Option<String>,
) -> GameSummary {
    let end_reason = state.end_reason().unwrap_or(EndReason::Aborted);
    let ledger = state.ledger();
    GameSummary {
        game_id,
        success: error.is_none(),
        completed: state.winner().is_some(),
        winner: state.winner().map(ToOwned::to_owned),
        turn_count: last_turn,
        max_turns: coordinator.max_turns(),
        max_turns_reached: end_reason == EndReason::MaxTurnsReached,
        end_reason,
        total_messages: ledger.len(),
        public_messages: ledger.count(MessageKind::Broadcast),
        direct_messages: ledger.count(MessageKind::Direct),
        participants: coordinator.seats().iter().map(|s| s.id.clone()).collect(),
        error,
    }
}

fn game_end_event(summary: &GameSummary) -> GameEvent {
    GameEvent::now(
        summary.turn_count,
        EventPayload::GameEnd {
            winner: summary.winner.clone(),
            total_turns: summary.turn_count,
            completed: summary.completed,
            max_turns_reached: summary.max_turns_reached,
            end_reason: summary.end_reason,
        },
    )
}
