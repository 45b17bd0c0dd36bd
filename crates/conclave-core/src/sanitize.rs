//! Repair of near-JSON model output into a structured mapping.
//!
//! Models are asked for a bare JSON object and routinely return something
//! close to it: wrapped in prose, fenced in markdown, with trailing commas,
//! unquoted keys or single quotes. [`sanitize`] runs a fixed repair chain
//! over such text and either yields a JSON object or
//! [`Sanitized::Unparsable`]. It never fails in any other way.
//!
//! The chain, in order (each step relies on the previous one's output):
//!
//! 1. keep the span from the first `{` to the last `}`
//! 2. strip markdown code fences
//! 3. drop trailing commas before `}` / `]`
//! 4. drop control characters (`< 0x20`, `0x7F`)
//! 5. quote bare identifier keys
//! 6. turn single-quoted strings into double-quoted ones
//! 7. strict parse
//! 8. on failure, keep only `{}[]",:`, digits and whitespace, parse again
//!
//! Input that is already a valid JSON object skips the chain entirely.
//! Steps 3, 5 and 6 skip over string literals so apostrophes, commas and
//! colons inside message text survive.

use serde_json::{Map, Value};
use tracing::debug;

/// A raw reply from a language-model call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Free text, expected to contain a JSON object.
    Text(String),
    /// A value the client already parsed.
    Structured(Value),
}

impl From<String> for ModelReply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ModelReply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for ModelReply {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// Outcome of sanitizing a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sanitized {
    /// The reply yielded a JSON object.
    Parsed(Map<String, Value>),
    /// Nothing could be reconstructed.
    Unparsable,
}

impl Sanitized {
    /// The parsed mapping, or an empty one for unparsable input.
    pub fn into_map(self) -> Map<String, Value> {
        match self {
            Self::Parsed(map) => map,
            Self::Unparsable => Map::new(),
        }
    }

    /// Whether a mapping was recovered.
    pub const fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

/// Sanitize any model reply.
///
/// Structured objects pass through unchanged, structured strings are
/// treated as text, any other structured value is unparsable.
pub fn sanitize(reply: &ModelReply) -> Sanitized {
    match reply {
        ModelReply::Text(text) | ModelReply::Structured(Value::String(text)) => {
            sanitize_text(text)
        }
        ModelReply::Structured(Value::Object(map)) => Sanitized::Parsed(map.clone()),
        ModelReply::Structured(_) => Sanitized::Unparsable,
    }
}

/// Run the repair chain over raw text.
pub fn sanitize_text(raw: &str) -> Sanitized {
    if let Some(map) = parse_object(raw.trim()) {
        return Sanitized::Parsed(map);
    }

    let Some(span) = extract_braced(raw) else {
        debug!(len = raw.len(), "no brace pair in model output");
        return Sanitized::Unparsable;
    };

    let cleaned = strip_code_fences(span);
    let cleaned = strip_trailing_commas(&cleaned);
    let cleaned = strip_control_chars(&cleaned);
    let cleaned = quote_bare_keys(&cleaned);
    let cleaned = normalize_single_quotes(&cleaned);

    if let Some(map) = parse_object(&cleaned) {
        return Sanitized::Parsed(map);
    }

    let aggressive = keep_structural_chars(&cleaned);
    if let Some(map) = parse_object(&aggressive) {
        debug!("model output recovered by aggressive cleaning");
        return Sanitized::Parsed(map);
    }

    debug!(len = raw.len(), "model output unparsable after repair chain");
    Sanitized::Unparsable
}

/// Strict parse that only accepts a JSON object.
fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Step 1: the span from the first `{` to the last `}` inclusive.
fn extract_braced(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    text.get(start..=end)
}

/// Step 2: remove ```` ```json ```` / ```` ``` ```` fences and the
/// whitespace hugging them.
fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("```") {
        let (before, fence) = rest.split_at(pos);
        out.push_str(before.trim_end());
        let after = fence.strip_prefix("```").unwrap_or(fence);
        rest = after.strip_prefix("json").map_or(after, str::trim_start);
    }
    out.push_str(rest);
    out
}

/// Tracks whether a character scan is inside a quoted string literal.
///
/// Both `"` and `'` open a literal closed by the same delimiter;
/// backslash escapes are honoured.
#[derive(Debug, Default)]
struct QuoteTracker {
    open: Option<char>,
    escaped: bool,
}

impl QuoteTracker {
    /// Feed one character. Returns `true` when it lies outside every
    /// literal (delimiters themselves count as inside).
    const fn step(&mut self, c: char) -> bool {
        match self.open {
            None => {
                if c == '"' || c == '\'' {
                    self.open = Some(c);
                    false
                } else {
                    true
                }
            }
            Some(delim) => {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == delim {
                    self.open = None;
                }
                false
            }
        }
    }
}

/// Index of the first non-whitespace char at or after `from`.
fn skip_whitespace(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i = i.saturating_add(1);
    }
    i
}

/// Step 3: strip trailing commas before closing braces and brackets.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut quotes = QuoteTracker::default();

    for (i, &c) in chars.iter().enumerate() {
        let outside = quotes.step(c);
        if outside && c == ',' {
            let next = skip_whitespace(&chars, i.saturating_add(1));
            if matches!(chars.get(next), Some('}' | ']')) {
                continue;
            }
        }
        result.push(c);
    }

    result
}

/// Step 4: drop ASCII control characters, including raw newlines.
fn strip_control_chars(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_control()).collect()
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Step 5: `{bid: 0.5, msg: "x"}` becomes `{"bid": 0.5,"msg": "x"}`.
///
/// Only identifiers directly after `{` or `,` and directly before `:`
/// (whitespace aside) are quoted.
fn quote_bare_keys(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len().saturating_add(16));
    let mut quotes = QuoteTracker::default();
    let mut i = 0;

    while let Some(&c) = chars.get(i) {
        let outside = quotes.step(c);
        result.push(c);
        i = i.saturating_add(1);

        if !(outside && (c == '{' || c == ',')) {
            continue;
        }

        let key_start = skip_whitespace(&chars, i);
        if !chars.get(key_start).copied().is_some_and(is_ident_start) {
            continue;
        }
        let mut key_end = key_start;
        while chars.get(key_end).copied().is_some_and(is_ident_continue) {
            key_end = key_end.saturating_add(1);
        }
        let colon = skip_whitespace(&chars, key_end);
        if chars.get(colon) != Some(&':') {
            continue;
        }

        let key: String = chars.get(key_start..key_end).unwrap_or_default().iter().collect();
        result.push('"');
        result.push_str(&key);
        result.push_str("\":");
        i = colon.saturating_add(1);
    }

    result
}

/// Step 6: rewrite single-quoted literals as double-quoted ones.
///
/// Apostrophes inside double-quoted literals are left alone; double
/// quotes inside single-quoted literals are escaped.
fn normalize_single_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut open: Option<char> = None;
    let mut i = 0;

    while let Some(&c) = chars.get(i) {
        match (open, c) {
            (None, '"') => {
                open = Some('"');
                result.push('"');
            }
            (None, '\'') => {
                open = Some('\'');
                result.push('"');
            }
            (Some(_), '\\') => {
                let next = chars.get(i.saturating_add(1)).copied();
                match (open, next) {
                    // `\'` is not a JSON escape.
                    (Some('\''), Some('\'')) => result.push('\''),
                    (_, Some(escaped)) => {
                        result.push('\\');
                        result.push(escaped);
                    }
                    (_, None) => result.push('\\'),
                }
                i = i.saturating_add(1);
            }
            (Some('\''), '\'') | (Some('"'), '"') => {
                open = None;
                result.push('"');
            }
            (Some('\''), '"') => result.push_str("\\\""),
            _ => result.push(c),
        }
        i = i.saturating_add(1);
    }

    result
}

/// Step 8: keep only JSON punctuation, digits and whitespace.
fn keep_structural_chars(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_whitespace() || c.is_ascii_digit() || "{}[]\",:".contains(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parsed(text: &str) -> Map<String, Value> {
        sanitize_text(text).into_map()
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn clean_json_passes_through() {
        let map = parsed(r#"{"bid": 0.7, "msg": "I'm the seer", "to": "ALL"}"#);
        assert_eq!(map, object(json!({"bid": 0.7, "msg": "I'm the seer", "to": "ALL"})));
    }

    #[test]
    fn fenced_bare_keys_trailing_commas_match_well_formed() {
        let messy = "Sure! Here is my move:\n```json\n{\n  bid: 0.8,\n  msg: \"P3 is lying\",\n  to: \"ALL\",\n  reason: \"pressure\",\n}\n```\nGood luck.";
        let clean = r#"{"bid": 0.8, "msg": "P3 is lying", "to": "ALL", "reason": "pressure"}"#;
        assert_eq!(sanitize_text(messy), sanitize_text(clean));
        assert!(sanitize_text(messy).is_parsed());
    }

    #[test]
    fn nested_trailing_commas_are_removed() {
        let map = parsed(r#"{"selected_messages": [{"speaker": "GM", "to": ["ALL"], "message": "Night falls",},], "winner": null,}"#);
        assert_eq!(
            map.get("selected_messages").and_then(Value::as_array).map(Vec::len),
            Some(1)
        );
    }

    #[test]
    fn single_quotes_become_double_quotes() {
        let map = parsed("{'bid': 0.2, 'msg': 'vote P2', 'to': 'GM'}");
        assert_eq!(map.get("to"), Some(&json!("GM")));
        assert_eq!(map.get("msg"), Some(&json!("vote P2")));
    }

    #[test]
    fn commas_and_colons_inside_strings_survive() {
        let map = parsed("{bid: 0.5, msg: \"Listen, everyone: P4 is suspicious\",}");
        assert_eq!(map.get("msg"), Some(&json!("Listen, everyone: P4 is suspicious")));
    }

    #[test]
    fn apostrophes_in_double_quoted_text_survive_repair() {
        let map = parsed("{bid: 0.5, msg: \"I don't trust P2\"}");
        assert_eq!(map.get("msg"), Some(&json!("I don't trust P2")));
    }

    #[test]
    fn control_characters_are_stripped() {
        let map = parsed("{\"msg\": \"line one\u{0007}\tline two\", bid: 1}");
        assert_eq!(map.get("msg"), Some(&json!("line oneline two")));
    }

    #[test]
    fn aggressive_fallback_recovers_skeleton() {
        // Stray words defeat the strict parse; the numeric skeleton survives.
        assert_eq!(
            sanitize_text(r#"{"7": 42 and some trailing words}"#),
            Sanitized::Parsed(object(json!({"7": 42})))
        );
        assert_eq!(sanitize_text(r#"{"a": 1, "b": two}"#), Sanitized::Unparsable);
    }

    #[test]
    fn empty_and_garbage_are_unparsable() {
        assert_eq!(sanitize_text(""), Sanitized::Unparsable);
        assert_eq!(sanitize_text("I think P3 is the werewolf."), Sanitized::Unparsable);
        assert_eq!(sanitize_text("} backwards {"), Sanitized::Unparsable);
        assert_eq!(sanitize_text("{{{{ not json at all ]]"), Sanitized::Unparsable);
    }

    #[test]
    fn structured_replies_bypass_text_repair() {
        let reply = ModelReply::Structured(json!({"bid": 0.3}));
        assert_eq!(sanitize(&reply), Sanitized::Parsed(object(json!({"bid": 0.3}))));

        let text = ModelReply::Structured(json!("{bid: 0.3,}"));
        assert_eq!(sanitize(&text), Sanitized::Parsed(object(json!({"bid": 0.3}))));

        let array = ModelReply::Structured(json!([1, 2]));
        assert_eq!(sanitize(&array), Sanitized::Unparsable);
    }

    #[test]
    fn unparsable_becomes_empty_map() {
        assert!(Sanitized::Unparsable.into_map().is_empty());
    }

    #[test]
    fn code_fences_are_removed() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "\n{}");
    }

    #[test]
    fn bare_keys_get_quoted() {
        assert_eq!(quote_bare_keys("{bid: 1, to :\"ALL\"}"), "{\"bid\": 1,\"to\":\"ALL\"}");
        assert_eq!(quote_bare_keys("[a, b]"), "[a, b]");
    }
}
