//! Command-line runner for LLM-driven social deduction games.
//!
//! Loads `conclave.yaml` (or the file named by `CONCLAVE_CONFIG`), reads
//! the rules text, builds one HTTP backend for players and one for the
//! arbitrator, then plays `game.runs` games in sequence.
//!
//! # Architecture
//!
//! ```text
//! config + rules --> Arena --> run_game (x runs) --> game_<n>/ logs
//!                      |
//!                      +--> LlmBackend (OpenAI / OpenRouter / Anthropic)
//! ```
//!
//! Ctrl-C requests an operator stop: the current turn finishes, the game
//! is closed out as aborted, and no further runs start.

mod arena;
mod config;
mod error;
mod llm;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use conclave_core::{GameConfig, GameControl, PromptEngine};

use crate::arena::Arena;
use crate::config::BackendConfig;
use crate::error::RunnerError;
use crate::llm::LlmBackend;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, rules, templates or credentials
/// cannot be loaded. Failures inside a game never reach this point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("conclave-runner starting");

    let config_path = config::config_path();
    let game_config = GameConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    info!(
        config = %config_path.display(),
        players = game_config.game.players,
        max_turns = game_config.game.max_turns,
        runs = game_config.game.runs,
        out_dir = %game_config.output.out_dir.display(),
        "configuration loaded"
    );

    let rules_file = game_config
        .game
        .rules_file
        .clone()
        .ok_or_else(|| RunnerError::Config("game.rules_file is not set".to_owned()))?;
    let rules = std::fs::read_to_string(&rules_file)
        .with_context(|| format!("reading rules from {}", rules_file.display()))?;

    let prompts = match &game_config.game.templates_dir {
        Some(dir) => PromptEngine::from_dir(dir)
            .with_context(|| format!("loading templates from {}", dir.display()))?,
        None => PromptEngine::builtin().context("compiling built-in templates")?,
    };

    let http = reqwest::Client::builder()
        .user_agent(concat!("conclave-runner/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(RunnerError::from)?;

    let temperature = game_config.models.temperature;
    let player_spec = game_config.models.player_spec()?;
    let arbitrator_spec = game_config.models.arbitrator_spec()?;
    let player = Arc::new(LlmBackend::new(
        &BackendConfig::from_env(&player_spec, temperature).context("player backend")?,
        http.clone(),
    ));
    let arbitrator = Arc::new(LlmBackend::new(
        &BackendConfig::from_env(&arbitrator_spec, temperature).context("arbitrator backend")?,
        http,
    ));
    info!(
        player_backend = player.name(),
        player_model = player.model(),
        arbitrator_backend = arbitrator.name(),
        arbitrator_model = arbitrator.model(),
        "model backends configured"
    );

    let control = Arc::new(GameControl::new());
    tokio::spawn({
        let control = Arc::clone(&control);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping after the current turn");
                control.request_stop();
            }
        }
    });

    let arena = Arena::new(game_config, rules, prompts, player, arbitrator);
    let report = arena.run(&control).await;

    for (winner, games) in report.tally() {
        info!(winner = %winner, games, "arena result");
    }
    info!(
        finished = report.summaries.len(),
        failed = report.failed,
        "conclave-runner done"
    );

    Ok(())
}
