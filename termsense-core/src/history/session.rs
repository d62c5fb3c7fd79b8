//! A single session's ordered command list and replay cursor.

use super::types::{Direction, HistoryEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Ordered, cursor-tracked command list for one terminal connection.
///
/// `entries` runs oldest to newest. The cursor always satisfies
/// `0 <= cursor <= entries.len()`; `cursor == entries.len()` means the user
/// is editing a fresh line past the newest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySession {
    session_id: String,
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    max_entries: usize,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl HistorySession {
    pub(crate) fn new(session_id: &str, max_entries: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            entries: VecDeque::new(),
            cursor: 0,
            max_entries,
            created_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn entries(&self) -> &VecDeque<HistoryEntry> {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Timestamp of the newest entry, or creation time for an empty session.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.entries
            .back()
            .map(|e| e.timestamp)
            .unwrap_or(self.created_at)
    }

    /// Append an entry, evicting the oldest past `max_entries`, and park the
    /// cursor on the blank line. Returns the evicted entries.
    pub(crate) fn push(&mut self, entry: HistoryEntry) -> Vec<HistoryEntry> {
        self.entries.push_back(entry);
        let evicted = self.trim();
        self.cursor = self.entries.len();
        evicted
    }

    pub(crate) fn set_max_entries(&mut self, max_entries: usize) -> Vec<HistoryEntry> {
        self.max_entries = max_entries;
        self.trim()
    }

    fn trim(&mut self) -> Vec<HistoryEntry> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.max_entries {
            if let Some(old) = self.entries.pop_front() {
                evicted.push(old);
            }
        }
        self.cursor = self.cursor.min(self.entries.len());
        evicted
    }

    pub(crate) fn clear(&mut self) -> Vec<HistoryEntry> {
        self.cursor = 0;
        self.entries.drain(..).collect()
    }

    pub(crate) fn reset_cursor(&mut self) {
        self.cursor = self.entries.len();
    }

    pub(crate) fn entry_mut(&mut self, id: uuid::Uuid) -> Option<&mut HistoryEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub(crate) fn contains(&self, id: uuid::Uuid) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Merge `incoming` entries not already present (by id), keep timestamp
    /// order and trim. Returns (added, evicted).
    pub(crate) fn merge(
        &mut self,
        incoming: impl IntoIterator<Item = HistoryEntry>,
    ) -> (Vec<HistoryEntry>, Vec<HistoryEntry>) {
        let mut added = Vec::new();
        for entry in incoming {
            if !self.contains(entry.id) {
                added.push(entry.clone());
                self.entries.push_back(entry);
            }
        }
        self.entries
            .make_contiguous()
            .sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let evicted = self.trim();
        self.cursor = self.entries.len();
        (added, evicted)
    }

    /// Restore invariants after deserializing untrusted data.
    pub(crate) fn normalize(&mut self, max_entries: usize) -> Vec<HistoryEntry> {
        if self.max_entries == 0 {
            self.max_entries = max_entries;
        }
        self.cursor = self.cursor.min(self.entries.len());
        self.trim()
    }

    /// Move the replay cursor. `Some("")` on the blank line, `None` without entries.
    pub(crate) fn navigate(&mut self, direction: Direction) -> Option<String> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }
        self.cursor = match direction {
            Direction::Up => self.cursor.saturating_sub(1),
            Direction::Down => (self.cursor + 1).min(len),
            Direction::First => 0,
            Direction::Last => len - 1,
        };
        Some(
            self.entries
                .get(self.cursor)
                .map(|e| e.command.clone())
                .unwrap_or_default(),
        )
    }
}
