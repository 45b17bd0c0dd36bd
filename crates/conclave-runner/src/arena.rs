//! Sequential multi-game runs.
//!
//! An [`Arena`] owns everything games share (rules, prompts, backends)
//! and plays `game.runs` games one after another, each logging into its
//! own `game_<n>` directory under the output directory. A game that fails
//! on persistence is reported and skipped; the remaining runs still play.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use conclave_core::{
    FileEventLog, GameBrief, GameConfig, GameControl, ModelArbitrator, ModelClient, ModelPlayer,
    PromptEngine, TurnCoordinator, run_game,
};
use conclave_types::{GameId, GameSummary, ParticipantId};

/// Tally key for games that ended without a winner.
pub const NO_WINNER: &str = "(no winner)";

/// Outcome of an arena run.
#[derive(Debug, Default)]
pub struct ArenaReport {
    /// Summaries of games that finished.
    pub summaries: Vec<GameSummary>,
    /// Games that stopped on a fatal error.
    pub failed: u32,
}

impl ArenaReport {
    /// Finished games per winner.
    pub fn tally(&self) -> BTreeMap<String, usize> {
        let mut wins = BTreeMap::new();
        for summary in &self.summaries {
            let key = summary.winner.clone().unwrap_or_else(|| NO_WINNER.to_owned());
            let count: &mut usize = wins.entry(key).or_default();
            *count = count.saturating_add(1);
        }
        wins
    }
}

/// Shared setup for a series of games.
pub struct Arena<C> {
    config: GameConfig,
    brief: Arc<GameBrief>,
    prompts: Arc<PromptEngine>,
    player: Arc<C>,
    arbitrator: Arc<C>,
}

impl<C: ModelClient> Arena<C> {
    /// Seat `config.game.players` players named `P1..Pn` around the rules.
    pub fn new(
        config: GameConfig,
        rules: String,
        prompts: PromptEngine,
        player: Arc<C>,
        arbitrator: Arc<C>,
    ) -> Self {
        let brief = Arc::new(GameBrief {
            rules,
            arbitrator: ParticipantId::arbitrator(),
            participants: (1..=config.game.players).map(ParticipantId::player).collect(),
            max_turns: config.game.max_turns,
        });
        Self {
            config,
            brief,
            prompts: Arc::new(prompts),
            player,
            arbitrator,
        }
    }

    fn coordinator(&self) -> TurnCoordinator<ModelPlayer<Arc<C>>, ModelArbitrator<Arc<C>>> {
        let retry = self.config.retry.policy();
        let bidders = self
            .brief
            .participants
            .iter()
            .map(|id| {
                ModelPlayer::new(
                    id.clone(),
                    Arc::clone(&self.player),
                    Arc::clone(&self.prompts),
                    Arc::clone(&self.brief),
                    retry,
                )
            })
            .collect();
        let arbiter = ModelArbitrator::new(
            Arc::clone(&self.arbitrator),
            Arc::clone(&self.prompts),
            Arc::clone(&self.brief),
            retry,
        );
        TurnCoordinator::new(bidders, arbiter, self.config.game.max_turns)
            .with_selection(self.config.selection.policy())
            .with_history_window(self.config.history.window)
    }

    /// Play every configured run, stopping early on an operator stop.
    pub async fn run(&self, control: &GameControl) -> ArenaReport {
        let mut report = ArenaReport::default();
        let coordinator = self.coordinator();

        for run in 1..=self.config.game.runs {
            if control.is_stop_requested() {
                warn!(run, "operator stop requested; skipping remaining runs");
                break;
            }

            let dir = self.config.output.out_dir.join(format!("game_{run}"));
            let mut log = match FileEventLog::create(&dir) {
                Ok(log) => log,
                Err(e) => {
                    error!(run, dir = %dir.display(), error = %e, "cannot open game log");
                    report.failed = report.failed.saturating_add(1);
                    continue;
                }
            };

            info!(run, of = self.config.game.runs, dir = %dir.display(), "starting game");
            match run_game(GameId::new(), &coordinator, control, &mut log).await {
                Ok(result) => report.summaries.push(result.summary),
                Err(e) => {
                    error!(run, error = %e, "game failed");
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }

        report
    }
}
