//! Schema enforcement for sanitized model output.
//!
//! Both validators are total: any mapping, including an empty one,
//! produces a well-formed value. Problems degrade to defaults with a
//! `warn!` and are never surfaced as errors.

use conclave_types::{ArbitrationDecision, ParticipantId, Recipients, SelectedMessage, Submission};
use serde_json::{Map, Value};
use tracing::warn;

/// Placeholder used when the arbitrator gives no overall rationale.
pub const NO_RATIONALE: &str = "No reason provided";

/// Keys accepted for a participant's message text.
const MESSAGE_KEYS: &[&str] = &["msg", "message"];
/// Keys accepted for a participant's audience.
const RECIPIENT_KEYS: &[&str] = &["to", "recipients"];
/// Keys accepted for free-text reasoning.
const RATIONALE_KEYS: &[&str] = &["reason", "rationale"];

/// First value present under any of `keys`.
fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

/// Text of a value. Strings are taken as-is, numbers and booleans are
/// printed, anything else is empty.
fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Clamp a bid into `[0.0, 1.0]`. NaN becomes `0.0`.
pub const fn clamp_bid(raw: f64) -> f64 {
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
}

/// Read a raw bid. Accepts JSON numbers and numeric strings.
fn raw_bid(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Resolve a recipient value.
///
/// Strings are split on commas, lists are taken element-wise, anything
/// else (or nothing) is a broadcast.
pub fn recipients_of(value: Option<&Value>) -> Recipients {
    match value {
        Some(Value::String(spec)) => Recipients::parse(spec),
        Some(Value::Array(items)) => Recipients::from_names(items.iter().map(|item| {
            item.as_str()
                .map_or_else(|| item.to_string(), ToOwned::to_owned)
        })),
        _ => Recipients::All,
    }
}

/// Build a [`Submission`] from a sanitized participant reply.
///
/// Missing bid is `0.0`; a bid that is present but not numeric is `0.0`
/// with a warning; numeric bids are clamped. Missing message and
/// rationale are empty, missing recipients is a broadcast. An empty
/// mapping yields the inert submission.
pub fn validate_submission(participant: &ParticipantId, map: &Map<String, Value>) -> Submission {
    if map.is_empty() {
        warn!(
            participant = %participant,
            "empty participant response, using inert submission"
        );
        return Submission::inert("no usable response");
    }

    let bid = match map.get("bid") {
        None | Some(Value::Null) => 0.0,
        Some(value) => raw_bid(value).map_or_else(
            || {
                warn!(participant = %participant, bid = %value, "non-numeric bid, using 0.0");
                0.0
            },
            clamp_bid,
        ),
    };

    Submission {
        bid,
        message: text_of(lookup(map, MESSAGE_KEYS)),
        recipients: recipients_of(lookup(map, RECIPIENT_KEYS)),
        rationale: text_of(lookup(map, RATIONALE_KEYS)),
    }
}

/// Validate one entry of `selected_messages`.
///
/// `speaker`, `to` and `message` are all required.
fn selected_message(entry: &Value) -> Option<SelectedMessage> {
    let fields = entry.as_object()?;
    let speaker = fields.get("speaker")?.as_str()?.trim();
    let to = fields.get("to")?;
    let text = fields.get("message")?.as_str()?;
    if speaker.is_empty() {
        return None;
    }

    Some(SelectedMessage {
        speaker: ParticipantId::new(speaker),
        recipients: recipients_of(Some(to)),
        text: text.to_owned(),
        selection_rationale: text_of(lookup(fields, RATIONALE_KEYS)),
    })
}

/// Build an [`ArbitrationDecision`] from a sanitized arbitrator reply.
///
/// A missing or non-list `selected_messages` is an empty selection;
/// entries lacking `speaker`, `to` or `message` are dropped with a
/// warning. `winner` is kept only when it is a non-empty string.
pub fn validate_decision(map: &Map<String, Value>) -> ArbitrationDecision {
    let selected_messages = match map.get("selected_messages") {
        Some(Value::Array(entries)) => entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let parsed = selected_message(entry);
                if parsed.is_none() {
                    warn!(index, entry = %entry, "dropping malformed selected message");
                }
                parsed
            })
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            warn!(value = %other, "selected_messages is not a list, ignoring");
            Vec::new()
        }
    };

    let winner = map
        .get("winner")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|w| !w.is_empty() && !w.eq_ignore_ascii_case("null"))
        .map(ToOwned::to_owned);

    let rationale = lookup(map, RATIONALE_KEYS)
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(NO_RATIONALE)
        .to_owned();

    ArbitrationDecision {
        selected_messages,
        winner,
        rationale,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn p1() -> ParticipantId {
        ParticipantId::new("P1")
    }

    #[test]
    fn bids_are_always_within_unit_interval() {
        let raws = [
            json!({"bid": -3.5}),
            json!({"bid": 7}),
            json!({"bid": "0.25"}),
            json!({"bid": "lots"}),
            json!({"bid": null}),
            json!({"bid": [0.4]}),
            json!({"bid": true}),
            json!({"msg": "no bid at all"}),
            json!({}),
        ];
        for raw in raws {
            let submission = validate_submission(&p1(), &map(raw.clone()));
            assert!(
                (0.0..=1.0).contains(&submission.bid),
                "bid {} out of range for {raw}",
                submission.bid
            );
        }
    }

    #[test]
    fn bid_clamping_values() {
        assert!((clamp_bid(-1.0)).abs() < f64::EPSILON);
        assert!((clamp_bid(2.0) - 1.0).abs() < f64::EPSILON);
        assert!((clamp_bid(0.6) - 0.6).abs() < f64::EPSILON);
        assert!(clamp_bid(f64::NAN).abs() < f64::EPSILON);
        assert!((clamp_bid(f64::INFINITY) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn numeric_string_bid_is_parsed() {
        let submission = validate_submission(&p1(), &map(json!({"bid": " 0.7 "})));
        assert!((submission.bid - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let submission = validate_submission(&p1(), &map(json!({"bid": 0.3})));
        assert!(submission.message.is_empty());
        assert!(submission.rationale.is_empty());
        assert_eq!(submission.recipients, Recipients::All);
    }

    #[test]
    fn empty_mapping_is_inert() {
        let submission = validate_submission(&p1(), &Map::new());
        assert!(submission.bid.abs() < f64::EPSILON);
        assert!(submission.is_silent());
    }

    #[test]
    fn field_aliases_are_accepted() {
        let short = validate_submission(
            &p1(),
            &map(json!({"bid": 0.5, "msg": "hi", "to": "P2, P3", "reason": "ally"})),
        );
        let long = validate_submission(
            &p1(),
            &map(json!({"bid": 0.5, "message": "hi", "recipients": ["P2", "P3"], "rationale": "ally"})),
        );
        assert_eq!(short, long);
        assert_eq!(short.recipients, Recipients::parse("P2,P3"));
    }

    #[test]
    fn decision_keeps_only_complete_entries() {
        let decision = validate_decision(&map(json!({
            "selected_messages": [
                {"speaker": "P1", "to": "ALL", "message": "I am a villager", "reason": "highest bid"},
                {"speaker": "P2", "message": "missing audience"},
                {"to": "ALL", "message": "missing speaker"},
                {"speaker": "GM", "to": "P2,P3", "message": "You two are werewolves"},
                "not even an object"
            ],
            "winner": null,
            "reason": "opening turn"
        })));

        assert_eq!(decision.selected_messages.len(), 2);
        let first = decision.selected_messages.first();
        assert_eq!(first.map(|m| m.selection_rationale.as_str()), Some("highest bid"));
        let second = decision.selected_messages.get(1);
        assert_eq!(
            second.map(|m| m.recipients.clone()),
            Some(Recipients::parse("P2,P3"))
        );
        assert!(decision.winner.is_none());
        assert_eq!(decision.rationale, "opening turn");
    }

    #[test]
    fn invalid_recipient_shapes_become_broadcast() {
        let decision = validate_decision(&map(json!({
            "selected_messages": [
                {"speaker": "P1", "to": 42, "message": "numeric audience"},
                {"speaker": "P1", "to": {"x": 1}, "message": "object audience"}
            ]
        })));
        assert!(decision.selected_messages.iter().all(|m| m.recipients.is_broadcast()));
    }

    #[test]
    fn decision_defaults() {
        let decision = validate_decision(&Map::new());
        assert!(decision.selected_messages.is_empty());
        assert!(decision.winner.is_none());
        assert_eq!(decision.rationale, NO_RATIONALE);

        let odd = validate_decision(&map(json!({"selected_messages": "P1 speaks", "winner": ""})));
        assert!(odd.selected_messages.is_empty());
        assert!(odd.winner.is_none());
    }

    #[test]
    fn winner_is_kept() {
        let decision = validate_decision(&map(json!({"winner": "Villagers"})));
        assert_eq!(decision.winner.as_deref(), Some("Villagers"));
    }
}
