//! Message addressing.
//!
//! Models address messages either with the `"ALL"` sentinel, a
//! comma-joined string (`"P1,P3"`) or a JSON list. [`Recipients`] is the
//! normalized form. It is never an empty direct list: anything that
//! normalizes to no recipients becomes a broadcast.

use serde::{Deserialize, Serialize};

use crate::ids::{BROADCAST_SENTINEL, ParticipantId};

/// Normalized recipient specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum Recipients {
    /// Broadcast to every participant.
    #[default]
    All,
    /// Direct message to a non-empty, duplicate-free list of participants.
    Only(Vec<ParticipantId>),
}

impl Recipients {
    /// Build recipients from a list of raw names.
    ///
    /// Names are trimmed and empty names dropped. If any name is the
    /// broadcast sentinel (case-insensitive), or nothing is left, the
    /// result is [`Recipients::All`]. Order of first occurrence is kept.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids: Vec<ParticipantId> = Vec::new();
        for name in names {
            let trimmed = name.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.eq_ignore_ascii_case(BROADCAST_SENTINEL) {
                return Self::All;
            }
            let id = ParticipantId::new(trimmed);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() { Self::All } else { Self::Only(ids) }
    }

    /// Parse a recipient string such as `"ALL"`, `"GM"` or `"P1, P2"`.
    pub fn parse(spec: &str) -> Self {
        Self::from_names(spec.split(','))
    }

    /// Whether this is a broadcast.
    pub const fn is_broadcast(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Whether `id` is an explicit recipient (or the message is a broadcast).
    pub fn includes(&self, id: &ParticipantId) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(id),
        }
    }

    /// Recipient names as strings (`["ALL"]` for a broadcast).
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::All => vec![BROADCAST_SENTINEL.to_owned()],
            Self::Only(ids) => ids.iter().map(|id| id.as_str().to_owned()).collect(),
        }
    }
}

impl From<Vec<String>> for Recipients {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}

impl From<Recipients> for Vec<String> {
    fn from(recipients: Recipients) -> Self {
        recipients.names()
    }
}

impl core::fmt::Display for Recipients {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_broadcast() {
        assert_eq!(Recipients::parse("ALL"), Recipients::All);
        assert_eq!(Recipients::parse(" all "), Recipients::All);
    }

    #[test]
    fn comma_list_is_split_and_trimmed() {
        let recipients = Recipients::parse("P1, P3 ,P1");
        assert_eq!(
            recipients,
            Recipients::Only(vec![ParticipantId::new("P1"), ParticipantId::new("P3")])
        );
        assert_eq!(recipients.to_string(), "P1,P3");
    }

    #[test]
    fn sentinel_inside_list_wins() {
        assert_eq!(Recipients::from_names(["P2", "ALL"]), Recipients::All);
    }

    #[test]
    fn empty_spec_falls_back_to_broadcast() {
        assert_eq!(Recipients::parse(""), Recipients::All);
        assert_eq!(Recipients::parse(" , "), Recipients::All);
    }

    #[test]
    fn includes_checks_membership() {
        let direct = Recipients::parse("P2,P3");
        assert!(direct.includes(&ParticipantId::new("P2")));
        assert!(!direct.includes(&ParticipantId::new("P4")));
        assert!(Recipients::All.includes(&ParticipantId::new("P4")));
    }

    #[test]
    fn serializes_as_name_list() {
        let json = serde_json::to_value(Recipients::parse("GM")).ok();
        assert_eq!(json, Some(serde_json::json!(["GM"])));
        let back: Option<Recipients> = serde_json::from_value(serde_json::json!(["ALL"])).ok();
        assert_eq!(back, Some(Recipients::All));
    }
}
