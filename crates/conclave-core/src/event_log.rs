//! Persisted game record.
//!
//! An [`EventSink`] receives every phase outcome as a [`GameEvent`] and,
//! once, the final [`GameSummary`]. [`FileEventLog`] writes three files
//! into a game directory:
//!
//! - `game_log.json`: JSON array of every event, flushed per event
//! - `game_transcript.txt`: human-readable delivered messages and result
//!   (bids are left out)
//! - `game_summary.json`: the summary
//!
//! The file log is a scoped resource. Dropping it without calling
//! [`EventSink::finish`] still closes the JSON array and the transcript,
//! so partial logs stay readable after an abnormal exit.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use conclave_types::{EndReason, EventPayload, GameEvent, GameSummary, Role};

use crate::error::LogError;

/// Event log file name.
pub const LOG_FILE: &str = "game_log.json";
/// Transcript file name.
pub const TRANSCRIPT_FILE: &str = "game_transcript.txt";
/// Summary file name.
pub const SUMMARY_FILE: &str = "game_summary.json";

const TRANSCRIPT_HEADER: &str = "=== SOCIAL DEDUCTION GAME LOG ===";
const TRANSCRIPT_FOOTER: &str = "=== END OF GAME ===";

/// Destination for a game's persisted record.
pub trait EventSink: Send {
    /// Append one event.
    fn record(&mut self, event: &GameEvent) -> Result<(), LogError>;

    /// Persist the summary and close the log. Nothing may be recorded
    /// afterwards.
    fn finish(&mut self, summary: &GameSummary) -> Result<(), LogError>;
}

/// Transcript line for an event, if it belongs in the transcript.
///
/// Delivered messages read `[07] P1▶ALL: text` or
/// `[07] GM▶DM(P2,P3): text`.
pub fn transcript_line(event: &GameEvent) -> Option<String> {
    match &event.payload {
        EventPayload::Setup { participants } => {
            let players: Vec<&str> = participants
                .iter()
                .filter(|(_, role)| **role == Role::Ordinary)
                .map(|(id, _)| id.as_str())
                .collect();
            let arbitrators: Vec<&str> = participants
                .iter()
                .filter(|(_, role)| **role == Role::Arbitrator)
                .map(|(id, _)| id.as_str())
                .collect();
            Some(format!(
                "Players: {} | Game master: {}\n",
                players.join(", "),
                arbitrators.join(", ")
            ))
        }
        EventPayload::Message {
            sender,
            recipients,
            text,
            is_direct,
            ..
        } => {
            let audience = if *is_direct {
                format!("DM({recipients})")
            } else {
                recipients.to_string()
            };
            Some(format!("[{:02}] {sender}▶{audience}: {text}", event.turn))
        }
        EventPayload::GameEnd {
            winner,
            total_turns,
            end_reason,
            ..
        } => Some(match (end_reason, winner) {
            (EndReason::WinnerDeclared, Some(winner)) => {
                format!("\nGAME RESULT: Winner = {winner}")
            }
            (EndReason::MaxTurnsReached, _) => {
                format!("\nGAME INCOMPLETE: Reached maximum turns ({total_turns})")
            }
            _ => format!("\nGAME ABORTED after turn {total_turns}"),
        }),
        EventPayload::Bid { .. } | EventPayload::Arbitration { .. } => None,
    }
}

/// File-backed event log for one game.
#[derive(Debug)]
pub struct FileEventLog {
    dir: PathBuf,
    events: Option<BufWriter<File>>,
    transcript: Option<BufWriter<File>>,
    recorded: usize,
}

impl FileEventLog {
    /// Create `dir` if needed and open the log and transcript inside it.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Io`] if the directory or files cannot be
    /// created.
    pub fn create(dir: &Path) -> Result<Self, LogError> {
        std::fs::create_dir_all(dir)?;

        let mut events = BufWriter::new(File::create(dir.join(LOG_FILE))?);
        events.write_all(b"[\n")?;
        events.flush()?;

        let mut transcript = BufWriter::new(File::create(dir.join(TRANSCRIPT_FILE))?);
        writeln!(transcript, "{TRANSCRIPT_HEADER}\n")?;
        transcript.flush()?;

        debug!(dir = %dir.display(), "event log opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            events: Some(events),
            transcript: Some(transcript),
            recorded: 0,
        })
    }

    /// Close the JSON array and the transcript. Idempotent.
    fn close(&mut self) -> Result<(), LogError> {
        if let Some(mut events) = self.events.take() {
            events.write_all(b"\n]\n")?;
            events.flush()?;
        }
        if let Some(mut transcript) = self.transcript.take() {
            writeln!(transcript, "\n{TRANSCRIPT_FOOTER}")?;
            transcript.flush()?;
        }
        Ok(())
    }
}

impl EventSink for FileEventLog {
    fn record(&mut self, event: &GameEvent) -> Result<(), LogError> {
        let events = self.events.as_mut().ok_or(LogError::Closed)?;
        if self.recorded > 0 {
            events.write_all(b",\n")?;
        }
        serde_json::to_writer_pretty(&mut *events, event)?;
        events.flush()?;
        self.recorded = self.recorded.saturating_add(1);

        if let (Some(line), Some(transcript)) = (transcript_line(event), self.transcript.as_mut()) {
            writeln!(transcript, "{line}")?;
            transcript.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self, summary: &GameSummary) -> Result<(), LogError> {
        if self.events.is_none() {
            return Err(LogError::Closed);
        }

        let json = serde_json::to_vec_pretty(summary)?;
        std::fs::write(self.dir.join(SUMMARY_FILE), json)?;

        if let (Some(error), Some(transcript)) = (&summary.error, self.transcript.as_mut()) {
            writeln!(transcript, "ERROR: {error}")?;
        }
        self.close()
    }
}

impl Drop for FileEventLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(dir = %self.dir.display(), error = %e, "failed to close event log");
        }
    }
}

/// In-memory event log.
///
/// Optionally fails every write after a given number of events, which
/// makes the game loop's fatal-failure path observable.
#[derive(Debug, Default, Clone)]
pub struct MemoryEventLog {
    events: Vec<GameEvent>,
    summary: Option<GameSummary>,
    fail_after: Option<usize>,
}

impl MemoryEventLog {
    /// An empty, reliable log.
    pub const fn new() -> Self {
        Self {
            events: Vec::new(),
            summary: None,
            fail_after: None,
        }
    }

    /// A log whose writes fail once `limit` events are stored. The
    /// summary is still accepted.
    pub const fn failing_after(limit: usize) -> Self {
        Self {
            events: Vec::new(),
            summary: None,
            fail_after: Some(limit),
        }
    }

    /// Recorded events.
    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    /// The summary, once finished.
    pub const fn summary(&self) -> Option<&GameSummary> {
        self.summary.as_ref()
    }

    /// Whether the log was finished.
    pub const fn is_finished(&self) -> bool {
        self.summary.is_some()
    }
}

impl EventSink for MemoryEventLog {
    fn record(&mut self, event: &GameEvent) -> Result<(), LogError> {
        if self.summary.is_some() {
            return Err(LogError::Closed);
        }
        if self.fail_after.is_some_and(|limit| self.events.len() >= limit) {
            return Err(LogError::Io {
                source: std::io::Error::other("simulated storage failure"),
            });
        }
        self.events.push(event.clone());
        Ok(())
    }

    fn finish(&mut self, summary: &GameSummary) -> Result<(), LogError> {
        if self.summary.is_some() {
            return Err(LogError::Closed);
        }
        self.summary = Some(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use conclave_types::{GameId, HistoryEntry, ParticipantId, Recipients, Submission};

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "conclave_event_log_{tag}_{}_{:?}",
            std::process::id(),
            std::thread::current().id(),
        ))
    }

    fn summary(winner: Option<&str>, end_reason: EndReason) -> GameSummary {
        GameSummary {
            game_id: GameId::new(),
            success: true,
            completed: winner.is_some(),
            winner: winner.map(ToOwned::to_owned),
            turn_count: 3,
            max_turns: 10,
            max_turns_reached: end_reason == EndReason::MaxTurnsReached,
            end_reason,
            total_messages: 2,
            public_messages: 1,
            direct_messages: 1,
            participants: vec![ParticipantId::new("P1"), ParticipantId::new("P2")],
            error: None,
        }
    }

    fn setup_event() -> GameEvent {
        let mut roles = BTreeMap::new();
        roles.insert(ParticipantId::new("P1"), Role::Ordinary);
        roles.insert(ParticipantId::new("P2"), Role::Ordinary);
        roles.insert(ParticipantId::arbitrator(), Role::Arbitrator);
        GameEvent::setup(roles)
    }

    fn message(turn: u64, sender: &str, to: &str, text: &str) -> GameEvent {
        GameEvent::delivered(
            &HistoryEntry {
                turn,
                sender: ParticipantId::new(sender),
                recipients: Recipients::parse(to),
                text: text.to_owned(),
            },
            "",
        )
    }

    #[test]
    fn transcript_formats() {
        assert_eq!(
            transcript_line(&message(7, "P1", "ALL", "Hello")).as_deref(),
            Some("[07] P1▶ALL: Hello")
        );
        assert_eq!(
            transcript_line(&message(12, "GM", "P2,P3", "You are wolves")).as_deref(),
            Some("[12] GM▶DM(P2,P3): You are wolves")
        );
        let bid = GameEvent::bid(1, ParticipantId::new("P1"), &Submission::inert(""), false);
        assert_eq!(transcript_line(&bid), None);
    }

    #[test]
    fn file_log_writes_all_three_files() {
        let dir = temp_dir("complete");
        let mut log = FileEventLog::create(&dir).unwrap();
        log.record(&setup_event()).unwrap();
        log.record(&GameEvent::bid(1, ParticipantId::new("P1"), &Submission::inert("quiet"), true))
            .unwrap();
        log.record(&message(1, "P1", "ALL", "I am innocent")).unwrap();
        log.record(&message(1, "GM", "P2", "Psst")).unwrap();
        log.finish(&summary(Some("Villagers"), EndReason::WinnerDeclared)).unwrap();
        assert!(matches!(log.record(&setup_event()), Err(LogError::Closed)));
        drop(log);

        let raw = std::fs::read_to_string(dir.join(LOG_FILE)).unwrap();
        let events: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(events.len(), 4);
        let bid = events.get(1).unwrap();
        assert_eq!(bid.get("phase").and_then(|v| v.as_str()), Some("bid"));
        assert_eq!(bid.get("degraded").and_then(serde_json::Value::as_bool), Some(true));

        let transcript = std::fs::read_to_string(dir.join(TRANSCRIPT_FILE)).unwrap();
        assert!(transcript.starts_with(TRANSCRIPT_HEADER));
        assert!(transcript.contains("[01] P1▶ALL: I am innocent"));
        assert!(transcript.contains("[01] GM▶DM(P2): Psst"));
        assert!(!transcript.contains("quiet"));
        assert!(transcript.trim_end().ends_with(TRANSCRIPT_FOOTER));

        let summary: GameSummary =
            serde_json::from_str(&std::fs::read_to_string(dir.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(summary.winner.as_deref(), Some("Villagers"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn dropped_log_is_still_valid_json() {
        let dir = temp_dir("dropped");
        {
            let mut log = FileEventLog::create(&dir).unwrap();
            log.record(&setup_event()).unwrap();
            log.record(&message(1, "P2", "ALL", "partial")).unwrap();
        }

        let raw = std::fs::read_to_string(dir.join(LOG_FILE)).unwrap();
        let events: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(events.len(), 2);
        let transcript = std::fs::read_to_string(dir.join(TRANSCRIPT_FILE)).unwrap();
        assert!(transcript.trim_end().ends_with(TRANSCRIPT_FOOTER));
        assert!(!dir.join(SUMMARY_FILE).exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn memory_log_fails_on_demand() {
        let mut log = MemoryEventLog::failing_after(1);
        assert!(log.record(&setup_event()).is_ok());
        assert!(matches!(log.record(&setup_event()), Err(LogError::Io { .. })));
        assert!(log.finish(&summary(None, EndReason::Aborted)).is_ok());
        assert!(log.is_finished());
        assert_eq!(log.events().len(), 1);
    }
}
