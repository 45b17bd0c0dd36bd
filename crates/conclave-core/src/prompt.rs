//! Prompt rendering via `minijinja`.
//!
//! Four templates drive every model call: a system and a turn template
//! for players, and the same pair for the arbitrator. Built-in versions
//! ship with the crate; a directory containing `<name>.j2` files
//! overrides any of them so operators can tune prompts without
//! recompiling.

use std::path::Path;

use minijinja::Environment;
use serde::Serialize;

use conclave_types::ParticipantId;

use crate::config::ConfigError;
use crate::error::CallError;

/// Template names, in load order.
pub const TEMPLATE_NAMES: [&str; 4] = [
    "player_system",
    "player_turn",
    "arbitrator_system",
    "arbitrator_turn",
];

const PLAYER_SYSTEM: &str = r#"You are {{ player_id }}, a player in a social deduction game moderated by the game master {{ arbitrator_id }}.

{{ rules }}

Each turn every player may bid for the chance to speak. The game master decides which messages are delivered.
Reply with one JSON object and nothing else:
{"bid": <number from 0 to 1>, "msg": "<what you say, or empty to stay silent>", "to": "<ALL, or comma-separated player ids for a private message>", "reason": "<your private reasoning>"}"#;

const PLAYER_TURN: &str = r"Turn {{ turn }} of {{ max_turns }}. Players: {{ participants | join(', ') }}.
{% if omitted %}({{ omitted }} older messages not shown)
{% endif %}Messages you have seen:
{% if history %}{{ history }}{% else %}(none yet){% endif %}

Submit your bid for this turn.";

const ARBITRATOR_SYSTEM: &str = r#"You are {{ arbitrator_id }}, the game master of a social deduction game.

{{ rules }}

Each turn you receive every player's bid and proposed message. Decide which messages are delivered, whether you speak yourself, and whether a side has won.
Reply with one JSON object and nothing else:
{"selected_messages": [{"speaker": "<player id or {{ arbitrator_id }}>", "to": "<ALL or comma-separated player ids>", "message": "<text>", "reason": "<why it was selected>"}], "winner": <null or the winning side>, "reason": "<overall reasoning>"}"#;

const ARBITRATOR_TURN: &str = r"Turn {{ turn }} of {{ max_turns }}. Players: {{ participants | join(', ') }}.
{% if omitted %}({{ omitted }} older messages not shown)
{% endif %}Full history:
{% if history %}{{ history }}{% else %}(none yet){% endif %}

Submissions this turn:
{{ submissions }}

Decide this turn.";

/// Built-in source for a template name.
fn builtin_source(name: &str) -> Option<&'static str> {
    match name {
        "player_system" => Some(PLAYER_SYSTEM),
        "player_turn" => Some(PLAYER_TURN),
        "arbitrator_system" => Some(ARBITRATOR_SYSTEM),
        "arbitrator_turn" => Some(ARBITRATOR_TURN),
        _ => None,
    }
}

/// A rendered prompt ready to send to a model backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// System instruction.
    pub system: String,
    /// Human-turn context.
    pub user: String,
}

/// Values available to the player templates.
#[derive(Debug, Serialize)]
pub struct PlayerContext<'a> {
    /// Rules text.
    pub rules: &'a str,
    /// The player being prompted.
    pub player_id: &'a ParticipantId,
    /// The arbitrator's id.
    pub arbitrator_id: &'a ParticipantId,
    /// Every ordinary participant.
    pub participants: &'a [ParticipantId],
    /// Current turn.
    pub turn: u64,
    /// Turn limit.
    pub max_turns: u64,
    /// Rendered visible history.
    pub history: &'a str,
    /// Visible entries cut by the history window.
    pub omitted: usize,
}

/// Values available to the arbitrator templates.
#[derive(Debug, Serialize)]
pub struct ArbitratorContext<'a> {
    /// Rules text.
    pub rules: &'a str,
    /// The arbitrator's id.
    pub arbitrator_id: &'a ParticipantId,
    /// Every ordinary participant.
    pub participants: &'a [ParticipantId],
    /// Current turn.
    pub turn: u64,
    /// Turn limit.
    pub max_turns: u64,
    /// Rendered full history.
    pub history: &'a str,
    /// Entries cut by the history window.
    pub omitted: usize,
    /// Rendered submissions for this turn.
    pub submissions: &'a str,
}

/// Compiled prompt templates.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl core::fmt::Debug for PromptEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PromptEngine")
            .field("templates", &TEMPLATE_NAMES)
            .finish()
    }
}

impl PromptEngine {
    /// Engine with the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Template`] if a built-in template fails to
    /// compile.
    pub fn builtin() -> Result<Self, ConfigError> {
        let mut env = Environment::new();
        for name in TEMPLATE_NAMES {
            let source = builtin_source(name).unwrap_or_default();
            env.add_template(name, source)
                .map_err(|e| template_error(name, &e))?;
        }
        Ok(Self { env })
    }

    /// Engine loading `<name>.j2` from `dir` where present and falling
    /// back to the built-in template otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Template`] if a template file cannot be read
    /// or does not compile.
    pub fn from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut env = Environment::new();
        for name in TEMPLATE_NAMES {
            let path = dir.join(format!("{name}.j2"));
            if path.is_file() {
                let source = std::fs::read_to_string(&path).map_err(|e| ConfigError::Template {
                    name: name.to_owned(),
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                env.add_template_owned(name, source)
                    .map_err(|e| template_error(name, &e))?;
            } else {
                env.add_template(name, builtin_source(name).unwrap_or_default())
                    .map_err(|e| template_error(name, &e))?;
            }
        }
        Ok(Self { env })
    }

    /// Render the prompt for a player's bid.
    pub fn render_player(&self, ctx: &PlayerContext<'_>) -> Result<Prompt, CallError> {
        Ok(Prompt {
            system: self.render("player_system", ctx)?,
            user: self.render("player_turn", ctx)?,
        })
    }

    /// Render the prompt for the arbitration call.
    pub fn render_arbitrator(&self, ctx: &ArbitratorContext<'_>) -> Result<Prompt, CallError> {
        Ok(Prompt {
            system: self.render("arbitrator_system", ctx)?,
            user: self.render("arbitrator_turn", ctx)?,
        })
    }

    fn render<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String, CallError> {
        self.env
            .get_template(name)
            .map_err(|e| CallError::Prompt(format!("missing {name} template: {e}")))?
            .render(ctx)
            .map_err(|e| CallError::Prompt(format!("{name} render failed: {e}")))
    }
}

fn template_error(name: &str, error: &minijinja::Error) -> ConfigError {
    ConfigError::Template {
        name: name.to_owned(),
        message: error.to_string(),
    }
}
