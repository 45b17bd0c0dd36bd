//! Visibility-scoped message history.
//!
//! The [`HistoryLedger`] is the append-only record of every delivered
//! message. Participants never hold their own copy; each view is derived
//! on demand by filtering the ledger:
//!
//! - the arbitrator sees every entry
//! - a broadcast is seen by everyone
//! - a direct message is seen by its sender and its listed recipients
//!
//! Views preserve ledger order, so a participant's history is always a
//! subsequence of the ledger.

use conclave_types::{HistoryEntry, MessageKind, Participant, ParticipantId, Submission};

/// Whether `viewer` may see `entry`.
pub fn is_visible(entry: &HistoryEntry, viewer: &Participant) -> bool {
    viewer.is_arbitrator() || entry.sender == viewer.id || entry.recipients.includes(&viewer.id)
}

/// Append-only ledger of delivered messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLedger {
    entries: Vec<HistoryEntry>,
}

impl HistoryLedger {
    /// An empty ledger.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append one delivered message.
    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Every entry in delivery order.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of delivered messages.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been delivered yet.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count of delivered messages of the given kind.
    pub fn count(&self, kind: MessageKind) -> usize {
        self.entries.iter().filter(|e| e.kind() == kind).count()
    }

    /// Entries `viewer` may see, in ledger order.
    pub fn visible_to<'a>(
        &'a self,
        viewer: &'a Participant,
    ) -> impl Iterator<Item = &'a HistoryEntry> + 'a {
        self.entries.iter().filter(move |e| is_visible(e, viewer))
    }

    /// Owned copy of the last `window` entries visible to `viewer`
    /// (`0` means no limit).
    ///
    /// Snapshots are what agents receive as context; later appends to the
    /// ledger do not affect a snapshot already taken.
    pub fn snapshot_for(&self, viewer: &Participant, window: usize) -> VisibleHistory {
        let mut entries: Vec<HistoryEntry> = self.visible_to(viewer).cloned().collect();
        let omitted = if window > 0 {
            entries.len().saturating_sub(window)
        } else {
            0
        };
        entries.drain(..omitted);

        VisibleHistory {
            entries,
            omitted,
        }
    }
}

/// One participant's view of the ledger at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleHistory {
    entries: Vec<HistoryEntry>,
    omitted: usize,
}

impl VisibleHistory {
    /// Visible entries, oldest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Older visible entries left out by the window.
    pub const fn omitted(&self) -> usize {
        self.omitted
    }

    /// One line per entry, see [`render_entry`].
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&render_entry(entry));
        }
        out
    }
}

/// `3: P1▶P2,P3: text`
pub fn render_entry(entry: &HistoryEntry) -> String {
    format!(
        "{}: {}▶{}: {}",
        entry.turn, entry.sender, entry.recipients, entry.text
    )
}

/// Render this turn's submissions for the arbitrator, one per line:
/// `P1: bid=0.7, to=ALL, msg='...', reason='...'`.
pub fn render_submissions(submissions: &[(ParticipantId, Submission)]) -> String {
    submissions
        .iter()
        .map(|(id, submission)| {
            format!(
                "{id}: bid={}, to={}, msg='{}', reason='{}'",
                submission.bid,
                submission.recipients,
                submission.message.trim(),
                submission.rationale.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
