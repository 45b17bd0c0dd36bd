//! Agent capabilities and their language-model implementations.
//!
//! The turn coordinator only knows two capabilities: a [`Bidder`] turns a
//! participant's visible history into a [`Submission`], and an [`Arbiter`]
//! turns the full history plus every submission into an
//! [`ArbitrationDecision`]. Neither can fail; an implementation that
//! cannot produce a real answer returns a safe default flagged as
//! degraded.
//!
//! [`ModelPlayer`] and [`ModelArbitrator`] implement the capabilities on
//! top of a [`ModelClient`]: render prompt, call through the
//! [`RetryPolicy`], sanitize, validate.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use conclave_types::{ArbitrationDecision, ParticipantId, Submission};

use crate::error::CallError;
use crate::history::{VisibleHistory, render_submissions};
use crate::prompt::{ArbitratorContext, PlayerContext, Prompt, PromptEngine};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::sanitize::{ModelReply, Sanitized, sanitize};
use crate::validate::{validate_decision, validate_submission};

/// An agent's answer, flagged when it is a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The answer.
    pub value: T,
    /// `value` is a safe default standing in for a failed call.
    pub degraded: bool,
}

impl<T> Outcome<T> {
    /// A genuine answer.
    pub const fn fresh(value: T) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    /// A fallback answer.
    pub const fn degraded(value: T) -> Self {
        Self {
            value,
            degraded: true,
        }
    }
}

impl<T> From<RetryOutcome<T>> for Outcome<T> {
    fn from(outcome: RetryOutcome<T>) -> Self {
        Self {
            value: outcome.value,
            degraded: outcome.degraded,
        }
    }
}

/// Produces one participant's submission each turn.
pub trait Bidder: Send + Sync {
    /// The participant this bidder plays.
    fn id(&self) -> &ParticipantId;

    /// Bid for the current turn given the participant's visible history.
    fn submit_bid(
        &self,
        turn: u64,
        history: &VisibleHistory,
    ) -> impl Future<Output = Outcome<Submission>> + Send;
}

/// Decides which submitted messages enter the shared history.
pub trait Arbiter: Send + Sync {
    /// The arbitrator's participant id.
    fn id(&self) -> &ParticipantId;

    /// Decide the current turn given the full history and every
    /// submission, in seating order.
    fn arbitrate(
        &self,
        turn: u64,
        history: &VisibleHistory,
        submissions: &[(ParticipantId, Submission)],
    ) -> impl Future<Output = Outcome<ArbitrationDecision>> + Send;
}

/// A language-model backend.
pub trait ModelClient: Send + Sync {
    /// Send one prompt and return the raw reply.
    fn complete(&self, prompt: &Prompt) -> impl Future<Output = Result<ModelReply, CallError>> + Send;
}

impl<C: ModelClient> ModelClient for Arc<C> {
    fn complete(&self, prompt: &Prompt) -> impl Future<Output = Result<ModelReply, CallError>> + Send {
        C::complete(self, prompt)
    }
}

/// Game facts shared by every model-backed agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameBrief {
    /// Rules text.
    pub rules: String,
    /// The arbitrator's id.
    pub arbitrator: ParticipantId,
    /// Ordinary participants in seating order.
    pub participants: Vec<ParticipantId>,
    /// Turn limit.
    pub max_turns: u64,
}

/// One model call turned into a structured mapping. Unparsable output
/// and an empty object both count as a failed attempt.
async fn call_structured<C: ModelClient>(
    client: &C,
    prompt: &Prompt,
) -> Result<serde_json::Map<String, serde_json::Value>, CallError> {
    let reply = client.complete(prompt).await?;
    match sanitize(&reply) {
        Sanitized::Parsed(map) if !map.is_empty() => Ok(map),
        Sanitized::Parsed(_) | Sanitized::Unparsable => Err(CallError::Malformed),
    }
}

/// A player driven by a language model.
#[derive(Debug)]
pub struct ModelPlayer<C> {
    id: ParticipantId,
    client: C,
    prompts: Arc<PromptEngine>,
    brief: Arc<GameBrief>,
    retry: RetryPolicy,
}

impl<C: ModelClient> ModelPlayer<C> {
    /// Create a player.
    pub const fn new(
        id: ParticipantId,
        client: C,
        prompts: Arc<PromptEngine>,
        brief: Arc<GameBrief>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id,
            client,
            prompts,
            brief,
            retry,
        }
    }
}

impl<C: ModelClient> Bidder for ModelPlayer<C> {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    async fn submit_bid(&self, turn: u64, history: &VisibleHistory) -> Outcome<Submission> {
        let rendered = history.render();
        let prompt = match self.prompts.render_player(&PlayerContext {
            rules: &self.brief.rules,
            player_id: &self.id,
            arbitrator_id: &self.brief.arbitrator,
            participants: &self.brief.participants,
            turn,
            max_turns: self.brief.max_turns,
            history: &rendered,
            omitted: history.omitted(),
        }) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(participant = %self.id, turn, error = %e, "cannot render bid prompt");
                return Outcome::degraded(Submission::inert("prompt unavailable"));
            }
        };

        let label = format!("bid:{}", self.id);
        let (client, prompt, id) = (&self.client, &prompt, &self.id);
        let outcome = self
            .retry
            .run(
                &label,
                move |_| async move {
                    let map = call_structured(client, prompt).await?;
                    Ok(validate_submission(id, &map))
                },
                || Submission::inert("no valid response after retries"),
            )
            .await;

        debug!(
            participant = %self.id,
            turn,
            bid = outcome.value.bid,
            attempts = outcome.attempts,
            degraded = outcome.degraded,
            "bid collected"
        );
        outcome.into()
    }
}

/// The arbitrator driven by a language model.
#[derive(Debug)]
pub struct ModelArbitrator<C> {
    client: C,
    prompts: Arc<PromptEngine>,
    brief: Arc<GameBrief>,
    retry: RetryPolicy,
}

impl<C: ModelClient> ModelArbitrator<C> {
    /// Create the arbitrator. Its id comes from the brief.
    pub const fn new(
        client: C,
        prompts: Arc<PromptEngine>,
        brief: Arc<GameBrief>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            prompts,
            brief,
            retry,
        }
    }
}

impl<C: ModelClient> Arbiter for ModelArbitrator<C> {
    fn id(&self) -> &ParticipantId {
        &self.brief.arbitrator
    }

    async fn arbitrate(
        &self,
        turn: u64,
        history: &VisibleHistory,
        submissions: &[(ParticipantId, Submission)],
    ) -> Outcome<ArbitrationDecision> {
        let rendered_history = history.render();
        let rendered_submissions = render_submissions(submissions);
        let prompt = match self.prompts.render_arbitrator(&ArbitratorContext {
            rules: &self.brief.rules,
            arbitrator_id: &self.brief.arbitrator,
            participants: &self.brief.participants,
            turn,
            max_turns: self.brief.max_turns,
            history: &rendered_history,
            omitted: history.omitted(),
            submissions: &rendered_submissions,
        }) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(turn, error = %e, "cannot render arbitration prompt");
                return Outcome::degraded(ArbitrationDecision::empty("prompt unavailable"));
            }
        };

        let (client, prompt) = (&self.client, &prompt);
        let outcome = self
            .retry
            .run(
                "arbitration",
                move |_| async move {
                    let map = call_structured(client, prompt).await?;
                    Ok(validate_decision(&map))
                },
                || ArbitrationDecision::empty("arbitration failed after retries"),
            )
            .await;

        debug!(
            turn,
            selected = outcome.value.selected_messages.len(),
            winner = ?outcome.value.winner,
            attempts = outcome.attempts,
            degraded = outcome.degraded,
            "arbitration decided"
        );
        outcome.into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use conclave_types::{Participant, Recipients};

    use super::*;
    use crate::history::HistoryLedger;

    /// Replays canned replies and records every prompt it receives.
    #[derive(Debug, Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<ModelReply, CallError>>>,
        prompts: Mutex<Vec<Prompt>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<ModelReply, CallError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().map(|p| p.len()).unwrap()
        }
    }

    impl ModelClient for Scripted {
        async fn complete(&self, prompt: &Prompt) -> Result<ModelReply, CallError> {
            if let Ok(mut seen) = self.prompts.lock() {
                seen.push(prompt.clone());
            }
            self.replies
                .lock()
                .ok()
                .and_then(|mut r| r.pop_front())
                .unwrap_or_else(|| Err(CallError::Backend(String::from("script exhausted"))))
        }
    }

    fn brief() -> Arc<GameBrief> {
        Arc::new(GameBrief {
            rules: String::from("One werewolf hides among you."),
            arbitrator: ParticipantId::arbitrator(),
            participants: (1..=3).map(ParticipantId::player).collect(),
            max_turns: 10,
        })
    }

    fn prompts() -> Arc<PromptEngine> {
        Arc::new(PromptEngine::builtin().unwrap())
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10))
    }

    fn empty_view(id: &str) -> VisibleHistory {
        HistoryLedger::new().snapshot_for(&Participant::ordinary(ParticipantId::new(id)), 0)
    }

    #[tokio::test(start_paused = true)]
    async fn player_recovers_from_malformed_reply() {
        let client = Scripted::new(vec![
            Ok(ModelReply::from("I would rather not answer in JSON.")),
            Ok(ModelReply::from("```json\n{bid: 0.9, msg: \"P3 is lying\", to: \"ALL\",}\n```")),
        ]);
        let player = ModelPlayer::new(ParticipantId::new("P1"), client, prompts(), brief(), fast_retry());

        let outcome = player.submit_bid(1, &empty_view("P1")).await;

        assert!(!outcome.degraded);
        assert!((outcome.value.bid - 0.9).abs() < f64::EPSILON);
        assert_eq!(outcome.value.message, "P3 is lying");
        assert_eq!(player.client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn player_degrades_after_exhausting_retries() {
        let client = Scripted::new(vec![
            Err(CallError::Backend(String::from("rate limited"))),
            Ok(ModelReply::from("")),
            Ok(ModelReply::Structured(json!(["not", "an", "object"]))),
        ]);
        let player = ModelPlayer::new(ParticipantId::new("P2"), client, prompts(), brief(), fast_retry());

        let outcome = player.submit_bid(4, &empty_view("P2")).await;

        assert!(outcome.degraded);
        assert!(outcome.value.bid.abs() < f64::EPSILON);
        assert!(outcome.value.is_silent());
        assert_eq!(player.client.calls(), 3);
    }

    #[tokio::test]
    async fn player_prompt_carries_identity_and_history() {
        let client = Scripted::new(vec![Ok(ModelReply::Structured(json!({"bid": 0.1})))]);
        let player = ModelPlayer::new(ParticipantId::new("P3"), client, prompts(), brief(), fast_retry());

        let _ = player.submit_bid(2, &empty_view("P3")).await;

        let seen = player.client.prompts.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen.iter().all(|p| p.system.contains("You are P3")));
        assert!(seen.iter().all(|p| p.user.contains("Turn 2 of 10")));
    }

    #[tokio::test]
    async fn arbitrator_validates_decision() {
        let client = Scripted::new(vec![Ok(ModelReply::from(
            r#"{"selected_messages": [{"speaker": "P1", "to": "P2, P3", "message": "psst"}], "winner": "Villagers", "reason": "werewolf voted out"}"#,
        ))]);
        let arbitrator = ModelArbitrator::new(client, prompts(), brief(), fast_retry());
        let view = HistoryLedger::new().snapshot_for(&Participant::arbitrator(), 0);
        let submissions = vec![(ParticipantId::new("P1"), Submission::inert(""))];

        let outcome = arbitrator.arbitrate(5, &view, &submissions).await;

        assert!(!outcome.degraded);
        assert_eq!(outcome.value.winner.as_deref(), Some("Villagers"));
        assert_eq!(
            outcome.value.selected_messages.first().map(|m| m.recipients.clone()),
            Some(Recipients::parse("P2,P3"))
        );
        let seen = arbitrator.client.prompts.lock().unwrap().clone();
        assert!(seen.iter().all(|p| p.user.contains("P1: bid=0, to=ALL")));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_arbitration_object_is_retried() {
        let client = Scripted::new(vec![
            Ok(ModelReply::from("{}")),
            Ok(ModelReply::Structured(json!({
                "selected_messages": [{"speaker": "P2", "to": "ALL", "message": "dawn"}],
            }))),
        ]);
        let arbitrator = ModelArbitrator::new(client, prompts(), brief(), fast_retry());
        let view = HistoryLedger::new().snapshot_for(&Participant::arbitrator(), 0);

        let outcome = arbitrator.arbitrate(2, &view, &[]).await;

        assert!(!outcome.degraded);
        assert_eq!(outcome.value.selected_messages.len(), 1);
        assert_eq!(
            outcome.value.selected_messages.first().map(|m| m.text.as_str()),
            Some("dawn")
        );
        assert_eq!(arbitrator.client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_objects_exhaust_player_retries() {
        let client = Scripted::new(vec![
            Ok(ModelReply::Structured(json!({}))),
            Ok(ModelReply::from("```json\n{}\n```")),
            Ok(ModelReply::from("{}")),
        ]);
        let player = ModelPlayer::new(ParticipantId::new("P1"), client, prompts(), brief(), fast_retry());

        let outcome = player.submit_bid(1, &empty_view("P1")).await;

        assert!(outcome.degraded);
        assert_eq!(player.client.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn arbitrator_degrades_to_empty_decision() {
        let arbitrator = ModelArbitrator::new(Scripted::default(), prompts(), brief(), fast_retry());
        let view = HistoryLedger::new().snapshot_for(&Participant::arbitrator(), 0);

        let outcome = arbitrator.arbitrate(1, &view, &[]).await;

        assert!(outcome.degraded);
        assert!(outcome.value.selected_messages.is_empty());
        assert!(outcome.value.winner.is_none());
        assert_eq!(arbitrator.client.calls(), 3);
    }
}
