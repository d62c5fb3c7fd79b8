//! Value types shared by the history store and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded command.
///
/// Immutable once created apart from `tags` and `favorite`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub command: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub favorite: bool,
}

impl HistoryEntry {
    pub(crate) fn new(command: &str, session_id: &str, metadata: CommandMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.to_string(),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            working_directory: metadata.working_directory,
            exit_code: metadata.exit_code,
            tags: Vec::new(),
            favorite: false,
        }
    }
}

/// Optional context recorded alongside a command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandMetadata {
    pub working_directory: Option<String>,
    pub exit_code: Option<i32>,
}

/// Replay navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Towards older entries.
    Up,
    /// Towards newer entries and finally the blank line.
    Down,
    /// Oldest entry.
    First,
    /// Newest entry.
    Last,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "first" => Ok(Direction::First),
            "last" => Ok(Direction::Last),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

/// Parameters for [`HistoryStore::search_history`](super::HistoryStore::search_history).
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: String,
    /// Session to search; the current session when `None`.
    pub session_id: Option<String>,
    pub case_sensitive: bool,
    pub limit: Option<usize>,
    /// Search the global list instead of a single session.
    pub include_global: bool,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn global(mut self) -> Self {
        self.include_global = true;
        self
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A search hit with the location of the first match, for highlighting.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub entry: HistoryEntry,
    /// Character offset of the first match within `entry.command`.
    pub match_index: usize,
    /// Match length in characters.
    pub match_length: usize,
}

/// How [`HistoryStore::import_history`](super::HistoryStore::import_history) treats existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Add entries whose id is not already present.
    #[default]
    Merge,
    /// Discard current sessions and settings first.
    Replace,
}

/// Aggregate usage numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_commands: usize,
    pub session_count: usize,
    pub unique_commands: usize,
    pub favorites: usize,
    /// Most used commands with their counts, most used first.
    pub top_commands: Vec<(String, usize)>,
}
