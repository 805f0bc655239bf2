//! Accumulated compaction history.
//!
//! Every successful round appends one entry here, and the rendered history
//! is what the host swaps in for the compressed prefix. The ledger is
//! append-only and time-ordered; eviction only ever removes from the front.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed overhead counted per entry on top of its compressed tokens, covering
/// the section heading and separators the rendering adds.
pub(crate) const ENTRY_OVERHEAD_TOKENS: u64 = 50;

const RENDER_HEADER: &str = "[Compressed history from earlier in this session]";

/// One successful compaction round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Joined compressed forms of the swapped blocks.
    pub compressed: String,
    /// Token estimate of the raw text the round swapped out.
    pub tokens_raw: u64,
    /// Token estimate of `compressed`.
    pub tokens_compressed: u64,
    /// When the round finalized.
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// This entry's contribution to the tracked history total.
    #[must_use]
    pub fn tracked_tokens(&self) -> u64 {
        self.tokens_compressed + ENTRY_OVERHEAD_TOKENS
    }
}

/// Append-only compaction ledger for one session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompactionHistory {
    entries: Vec<HistoryEntry>,
}

impl CompactionHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a round's entry at the recent end.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// The oldest entry, if any.
    #[must_use]
    pub fn oldest(&self) -> Option<&HistoryEntry> {
        self.entries.first()
    }

    /// Remove and return the oldest entry.
    pub fn pop_oldest(&mut self) -> Option<HistoryEntry> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.entries.remove(0))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no rounds have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total tracked size: compressed tokens plus per-entry overhead.
    #[must_use]
    pub fn tracked_tokens(&self) -> u64 {
        self.entries.iter().map(HistoryEntry::tracked_tokens).sum()
    }

    /// Render the full history as dated sections, oldest first.
    ///
    /// This is the replacement payload handed to the host: every surviving
    /// entry appears every round, so the rebuilt context always carries the
    /// whole retained history.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from(RENDER_HEADER);
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&format!(
                "\n## {}\n\n{}\n",
                entry.timestamp.format("%Y-%m-%d %H:%M UTC"),
                entry.compressed.trim_end()
            ));
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
