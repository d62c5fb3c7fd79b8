//! Command history store.
//!
//! Records every command per session and (optionally) in a global list,
//! supports replay navigation with a per-session cursor, and answers
//! substring searches through a word-level inverted index. State is
//! persisted through a [`KeyValueStore`](crate::persistence::KeyValueStore)
//! after every mutation; persistence failures never affect the in-memory
//! state.

mod index;
mod session;
mod types;

pub use index::InvertedIndex;
pub use session::HistorySession;
pub use types::{
    CommandMetadata, Direction, HistoryEntry, HistoryStats, ImportMode, SearchQuery, SearchResult,
};

use crate::error::HistoryError;
use crate::events::{EngineEvent, EventBus, SettingsPayload};
use crate::persistence::{self, SharedStore};
use crate::tokenizer::byte_to_char;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Storage key for sessions and global history.
pub const STATE_KEY: &str = "history.state";
/// Storage key for history settings.
pub const SETTINGS_KEY: &str = "history.settings";
/// Export format version written by [`HistoryStore::export_history`].
pub const EXPORT_VERSION: u32 = 1;
/// Session used when callers do not name one.
pub const DEFAULT_SESSION: &str = "default";

/// Shared handle used by providers and local commands.
pub type SharedHistory = Arc<RwLock<HistoryStore>>;

/// History behaviour settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Maximum entries kept per session and in the global list.
    pub max_entries: usize,
    /// Maximum number of sessions before the least recently used is evicted.
    pub max_sessions: usize,
    /// Skip a command identical to the session's previous one.
    pub ignore_duplicates: bool,
    /// Commands starting with any of these are never recorded.
    pub ignore_patterns: Vec<String>,
    /// Also record commands in the global list.
    pub persist_across_sessions: bool,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_sessions: 10,
            ignore_duplicates: true,
            ignore_patterns: vec![
                "passwd".into(),
                "sudo -S".into(),
                "mysql -p".into(),
                "psql".into(),
            ],
            persist_across_sessions: true,
        }
    }
}

/// Full export of sessions, global history and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExport {
    pub sessions: Vec<HistorySession>,
    #[serde(default)]
    pub global_history: Vec<HistoryEntry>,
    pub settings: HistorySettings,
    pub exported_at: DateTime<Utc>,
    pub version: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedHistory {
    sessions: Vec<HistorySession>,
    #[serde(default)]
    global_history: Vec<HistoryEntry>,
    #[serde(default)]
    current_session_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedHistoryRef<'a> {
    sessions: Vec<&'a HistorySession>,
    global_history: &'a VecDeque<HistoryEntry>,
    current_session_id: &'a str,
}

/// Per-session and global command history.
pub struct HistoryStore {
    settings: HistorySettings,
    sessions: HashMap<String, HistorySession>,
    global: VecDeque<HistoryEntry>,
    current_session: String,
    index: InvertedIndex,
    store: Option<SharedStore>,
    events: EventBus,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("sessions", &self.sessions.len())
            .field("global", &self.global.len())
            .field("current_session", &self.current_session)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl HistoryStore {
    /// Create an empty, in-memory store.
    pub fn new(settings: HistorySettings) -> Self {
        Self {
            settings,
            sessions: HashMap::new(),
            global: VecDeque::new(),
            current_session: DEFAULT_SESSION.to_string(),
            index: InvertedIndex::new(),
            store: None,
            events: EventBus::new(),
        }
    }

    /// Load persisted state from `store`.
    ///
    /// Settings saved by an earlier [`update_settings`](Self::update_settings)
    /// take precedence over `defaults`. Missing or corrupted data yields an
    /// empty store.
    pub fn open(defaults: HistorySettings, store: SharedStore) -> Self {
        let settings =
            persistence::load_json::<HistorySettings>(store.as_ref(), SETTINGS_KEY)
                .unwrap_or(defaults);
        let mut history = Self::new(settings);

        if let Some(state) = persistence::load_json::<PersistedHistory>(store.as_ref(), STATE_KEY)
        {
            let max = history.settings.max_entries;
            for mut session in state.sessions {
                session.normalize(max);
                history
                    .sessions
                    .insert(session.session_id().to_string(), session);
            }
            history.global = state.global_history.into();
            while history.global.len() > max {
                history.global.pop_front();
            }
            if let Some(current) = state.current_session_id {
                history.current_session = current;
            }
            history.rebuild_index();
            info!(
                sessions = history.sessions.len(),
                global = history.global.len(),
                "Loaded command history"
            );
        }

        history.store = Some(store);
        history
    }

    /// Use `events` for change notifications.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn into_shared(self) -> SharedHistory {
        Arc::new(RwLock::new(self))
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> &HistorySettings {
        &self.settings
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    /// Return the session named `session_id`, creating it if needed.
    pub fn create_session(&mut self, session_id: &str) -> &HistorySession {
        if !self.sessions.contains_key(session_id) {
            debug!(session_id, "Creating history session");
            self.sessions.insert(
                session_id.to_string(),
                HistorySession::new(session_id, self.settings.max_entries),
            );
            self.evict_sessions(session_id);
            self.persist();
        }
        &self.sessions[session_id]
    }

    pub fn session(&self, session_id: &str) -> Option<&HistorySession> {
        self.sessions.get(session_id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &HistorySession> {
        self.sessions.values()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn current_session_id(&self) -> &str {
        &self.current_session
    }

    /// Make `session_id` the default for calls without an explicit session.
    pub fn set_current_session(&mut self, session_id: &str) {
        self.current_session = session_id.to_string();
        self.create_session(session_id);
        self.persist();
    }

    pub fn global_history(&self) -> &VecDeque<HistoryEntry> {
        &self.global
    }

    fn resolve<'a>(&'a self, session_id: Option<&'a str>) -> &'a str {
        session_id.unwrap_or(&self.current_session)
    }

    fn evict_sessions(&mut self, keep: &str) {
        let limit = self.settings.max_sessions.max(1);
        while self.sessions.len() > limit {
            let victim = self
                .sessions
                .values()
                .filter(|s| s.session_id() != keep && s.session_id() != self.current_session)
                .min_by_key(|s| s.last_activity())
                .map(|s| s.session_id().to_string());
            let Some(victim) = victim else { break };
            if let Some(mut removed) = self.sessions.remove(&victim) {
                debug!(session_id = %victim, entries = removed.len(), "Evicted least recently used session");
                let dropped = removed.clear();
                self.unindex(&dropped);
            }
        }
    }

    // ── Recording ────────────────────────────────────────────────────────

    /// Record `command` in `session_id` (the current session when `None`).
    ///
    /// Returns `None` for blank or ignored commands. With
    /// `ignore_duplicates`, repeating the session's last command returns
    /// that existing entry instead of appending a new one.
    pub fn add_command(&mut self, command: &str, session_id: Option<&str>) -> Option<HistoryEntry> {
        self.add_command_with(command, session_id, CommandMetadata::default())
    }

    /// [`add_command`](Self::add_command) with working directory / exit code.
    pub fn add_command_with(
        &mut self,
        command: &str,
        session_id: Option<&str>,
        metadata: CommandMetadata,
    ) -> Option<HistoryEntry> {
        let command = command.trim();
        if command.is_empty() {
            return None;
        }
        if self.is_ignored(command) {
            debug!("Command matches an ignore pattern, not recording");
            return None;
        }

        let session_id = self.resolve(session_id).to_string();
        self.create_session(&session_id);

        if self.settings.ignore_duplicates {
            let last = self.sessions.get(&session_id).and_then(|s| s.last());
            if let Some(last) = last.filter(|e| e.command == command) {
                return Some(last.clone());
            }
        }

        let entry = HistoryEntry::new(command, &session_id, metadata);
        self.index.insert(entry.id, &entry.command);

        let mut evicted = match self.sessions.get_mut(&session_id) {
            Some(session) => session.push(entry.clone()),
            None => Vec::new(),
        };
        if self.settings.persist_across_sessions {
            self.global.push_back(entry.clone());
            while self.global.len() > self.settings.max_entries {
                if let Some(old) = self.global.pop_front() {
                    evicted.push(old);
                }
            }
        }
        self.unindex(&evicted);

        self.persist();
        self.events.emit(EngineEvent::CommandAdded(entry.clone()));
        Some(entry)
    }

    fn is_ignored(&self, command: &str) -> bool {
        self.settings
            .ignore_patterns
            .iter()
            .any(|p| !p.is_empty() && command.starts_with(p.as_str()))
    }

    /// Whether the entry is still held by its session or the global list.
    fn is_live(&self, entry: &HistoryEntry) -> bool {
        self.sessions
            .get(&entry.session_id)
            .is_some_and(|s| s.contains(entry.id))
            || self.global.iter().any(|e| e.id == entry.id)
    }

    fn unindex(&mut self, removed: &[HistoryEntry]) {
        for entry in removed {
            if !self.is_live(entry) {
                self.index.remove(entry.id, &entry.command);
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for entry in self.sessions.values().flat_map(|s| s.entries()) {
            self.index.insert(entry.id, &entry.command);
        }
        for entry in &self.global {
            self.index.insert(entry.id, &entry.command);
        }
    }

    // ── Navigation ───────────────────────────────────────────────────────

    /// Move the replay cursor and return the command under it.
    ///
    /// Returns `Some("")` when the cursor lands past the newest entry and
    /// `None` when the session is unknown or empty.
    pub fn navigate_history(
        &mut self,
        direction: Direction,
        session_id: Option<&str>,
    ) -> Option<String> {
        let session_id = self.resolve(session_id).to_string();
        self.sessions.get_mut(&session_id)?.navigate(direction)
    }

    /// Park the cursor past the newest entry.
    pub fn reset_cursor(&mut self, session_id: Option<&str>) {
        let session_id = self.resolve(session_id).to_string();
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.reset_cursor();
        }
    }

    // ── Search ───────────────────────────────────────────────────────────

    /// Newest-first substring search.
    ///
    /// Candidates come from the inverted index, narrowed to the searched
    /// entries; a full scan runs only when none of them are candidates
    /// (e.g. the query starts mid-word).
    pub fn search_history(&self, query: &SearchQuery) -> Vec<SearchResult> {
        let entries: Box<dyn DoubleEndedIterator<Item = &HistoryEntry> + '_> =
            if query.include_global {
                Box::new(self.global.iter())
            } else {
                match self.sessions.get(self.resolve(query.session_id.as_deref())) {
                    Some(session) => Box::new(session.entries().iter()),
                    None => return Vec::new(),
                }
            };
        let limit = query.limit.unwrap_or(usize::MAX);
        let needle = query.query.trim();

        if needle.is_empty() {
            return entries
                .rev()
                .take(limit)
                .map(|entry| SearchResult {
                    entry: entry.clone(),
                    match_index: 0,
                    match_length: 0,
                })
                .collect();
        }

        let entries: Vec<&HistoryEntry> = entries.collect();
        let scope: HashSet<Uuid> = entries.iter().map(|e| e.id).collect();
        let candidates: HashSet<Uuid> = self
            .index
            .candidates(needle)
            .into_iter()
            .filter(|id| scope.contains(id))
            .collect();
        let fast_path = !candidates.is_empty();
        let needle_cmp = if query.case_sensitive {
            needle.to_string()
        } else {
            needle.to_lowercase()
        };
        let match_length = needle.chars().count();

        let results: Vec<SearchResult> = entries
            .iter()
            .rev()
            .filter(|e| !fast_path || candidates.contains(&e.id))
            .filter_map(|entry| {
                let found = if query.case_sensitive {
                    entry
                        .command
                        .find(&needle_cmp)
                        .map(|byte| byte_to_char(&entry.command, byte))
                } else {
                    find_ignore_case(&entry.command, &needle_cmp)
                };
                found.map(|match_index| SearchResult {
                    entry: (*entry).clone(),
                    match_index,
                    match_length,
                })
            })
            .take(limit)
            .collect();

        debug!(
            fast_path,
            candidates = candidates.len(),
            results = results.len(),
            "History search"
        );
        results
    }

    /// Unique commands, newest first, from `session_id` then the global list.
    pub fn recent_commands(&self, session_id: Option<&str>, limit: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        let session_entries = self
            .sessions
            .get(self.resolve(session_id))
            .into_iter()
            .flat_map(|s| s.entries().iter().rev());
        session_entries
            .chain(self.global.iter().rev())
            .filter(|e| seen.insert(e.command.as_str()))
            .take(limit)
            .map(|e| e.command.clone())
            .collect()
    }

    // ── Clearing ─────────────────────────────────────────────────────────

    /// Clear one session, or every session and the global list.
    pub fn clear_history(&mut self, session_id: Option<&str>) {
        match session_id {
            Some(id) => {
                let removed = match self.sessions.get_mut(id) {
                    Some(session) => session.clear(),
                    None => return,
                };
                self.unindex(&removed);
                info!(session_id = id, cleared = removed.len(), "Cleared session history");
            }
            None => {
                for session in self.sessions.values_mut() {
                    session.clear();
                }
                self.global.clear();
                self.index.clear();
                info!("Cleared all command history");
            }
        }
        self.persist();
        self.events.emit(EngineEvent::HistoryCleared {
            session_id: session_id.map(str::to_string),
        });
    }

    // ── Metadata ─────────────────────────────────────────────────────────

    fn update_entry(&mut self, id: Uuid, mut apply: impl FnMut(&mut HistoryEntry)) -> bool {
        let mut found = false;
        for session in self.sessions.values_mut() {
            if let Some(entry) = session.entry_mut(id) {
                apply(entry);
                found = true;
            }
        }
        for entry in self.global.iter_mut().filter(|e| e.id == id) {
            apply(entry);
            found = true;
        }
        if found {
            self.persist();
        }
        found
    }

    /// Replace the tags of entry `id`. Returns `false` if no such entry.
    pub fn tag_entry(&mut self, id: Uuid, tags: Vec<String>) -> bool {
        self.update_entry(id, |e| e.tags = tags.clone())
    }

    pub fn set_favorite(&mut self, id: Uuid, favorite: bool) -> bool {
        self.update_entry(id, |e| e.favorite = favorite)
    }

    /// Favorite entries across all sessions, newest first.
    pub fn favorites(&self) -> Vec<HistoryEntry> {
        let mut favorites: Vec<HistoryEntry> = self
            .sessions
            .values()
            .flat_map(|s| s.entries())
            .filter(|e| e.favorite)
            .cloned()
            .collect();
        favorites.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        favorites
    }

    pub fn statistics(&self) -> HistoryStats {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut total = 0;
        let mut favorites = 0;
        for entry in self.sessions.values().flat_map(|s| s.entries()) {
            *counts.entry(entry.command.as_str()).or_default() += 1;
            total += 1;
            if entry.favorite {
                favorites += 1;
            }
        }
        let unique_commands = counts.len();
        let mut top: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(c, n)| (c.to_string(), n))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(10);

        HistoryStats {
            total_commands: total,
            session_count: self.sessions.len(),
            unique_commands,
            favorites,
            top_commands: top,
        }
    }

    // ── Settings ─────────────────────────────────────────────────────────

    /// Replace the settings, re-trimming sessions to the new limits.
    pub fn update_settings(&mut self, settings: HistorySettings) {
        let max = settings.max_entries;
        self.settings = settings;

        let mut evicted = Vec::new();
        for session in self.sessions.values_mut() {
            evicted.extend(session.set_max_entries(max));
        }
        while self.global.len() > max {
            if let Some(old) = self.global.pop_front() {
                evicted.push(old);
            }
        }
        self.unindex(&evicted);
        let current = self.current_session.clone();
        self.evict_sessions(&current);

        if let Some(store) = &self.store {
            persistence::save_json(store.as_ref(), SETTINGS_KEY, &self.settings);
        }
        self.persist();
        self.events.emit(EngineEvent::SettingsChanged(SettingsPayload::History(
            self.settings.clone(),
        )));
    }

    // ── Export / import ──────────────────────────────────────────────────

    pub fn export_history(&self) -> HistoryExport {
        HistoryExport {
            sessions: self.sorted_sessions().into_iter().cloned().collect(),
            global_history: self.global.iter().cloned().collect(),
            settings: self.settings.clone(),
            exported_at: Utc::now(),
            version: EXPORT_VERSION,
        }
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.export_history())
    }

    /// Parse and import an export document. Returns `false` on any parse
    /// or validation failure, leaving the store untouched.
    pub fn import_json(&mut self, json: &str, mode: ImportMode) -> bool {
        match self.try_import_json(json, mode) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Rejected history import");
                false
            }
        }
    }

    /// Like [`import_json`](Self::import_json), reporting why the document
    /// was rejected.
    pub fn try_import_json(&mut self, json: &str, mode: ImportMode) -> crate::Result<()> {
        let data: HistoryExport = serde_json::from_str(json)?;
        self.try_import(data, mode)?;
        Ok(())
    }

    /// Import `data`, merging by entry id unless `mode` is
    /// [`ImportMode::Replace`]. Replace also adopts the exported settings.
    pub fn import_history(&mut self, data: HistoryExport, mode: ImportMode) -> bool {
        match self.try_import(data, mode) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Rejected history import");
                false
            }
        }
    }

    fn try_import(&mut self, data: HistoryExport, mode: ImportMode) -> Result<(), HistoryError> {
        validate_import(&data)?;

        let settings = match mode {
            ImportMode::Replace => data.settings.clone(),
            ImportMode::Merge => self.settings.clone(),
        };
        let max = settings.max_entries;
        let (mut sessions, mut global) = match mode {
            ImportMode::Replace => (HashMap::new(), VecDeque::new()),
            ImportMode::Merge => (self.sessions.clone(), self.global.clone()),
        };

        let mut added = 0;
        let session_total = data.sessions.len();
        for mut incoming in data.sessions {
            let id = incoming.session_id().to_string();
            match sessions.get_mut(&id) {
                Some(existing) => {
                    let entries: Vec<HistoryEntry> = incoming.clear();
                    let (new, _) = existing.merge(entries);
                    added += new.len();
                }
                None => {
                    incoming.normalize(max);
                    incoming.set_max_entries(max);
                    added += incoming.len();
                    sessions.insert(id, incoming);
                }
            }
        }

        let known: HashSet<Uuid> = global.iter().map(|e| e.id).collect();
        global.extend(
            data.global_history
                .into_iter()
                .filter(|e| !known.contains(&e.id)),
        );
        global
            .make_contiguous()
            .sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        while global.len() > max {
            global.pop_front();
        }

        self.settings = settings;
        self.sessions = sessions;
        self.global = global;
        if !self.sessions.contains_key(&self.current_session) {
            let fallback = self
                .sorted_sessions()
                .first()
                .map(|s| s.session_id().to_string());
            if let Some(first) = fallback {
                self.current_session = first;
            }
        }
        let current = self.current_session.clone();
        self.evict_sessions(&current);
        self.rebuild_index();

        if let Some(store) = &self.store {
            persistence::save_json(store.as_ref(), SETTINGS_KEY, &self.settings);
        }
        self.persist();
        info!(sessions = session_total, entries = added, ?mode, "Imported command history");
        self.events.emit(EngineEvent::HistoryImported {
            sessions: session_total,
            entries: added,
        });
        Ok(())
    }

    fn sorted_sessions(&self) -> Vec<&HistorySession> {
        let mut sessions: Vec<&HistorySession> = self.sessions.values().collect();
        sessions.sort_by(|a, b| a.session_id().cmp(b.session_id()));
        sessions
    }

    fn persist(&self) {
        let Some(store) = &self.store else { return };
        let state = PersistedHistoryRef {
            sessions: self.sorted_sessions(),
            global_history: &self.global,
            current_session_id: &self.current_session,
        };
        persistence::save_json(store.as_ref(), STATE_KEY, &state);
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(HistorySettings::default())
    }
}

fn validate_import(data: &HistoryExport) -> Result<(), HistoryError> {
    if data.version > EXPORT_VERSION {
        return Err(HistoryError::UnsupportedVersion {
            found: data.version,
            supported: EXPORT_VERSION,
        });
    }
    if data.sessions.iter().any(|s| s.session_id().is_empty()) {
        return Err(HistoryError::ImportRejected {
            message: "session without id".to_string(),
        });
    }
    Ok(())
}

/// Char index of the first case-insensitive occurrence of `needle_lower` in
/// `haystack`, counted on `haystack` itself.
fn find_ignore_case(haystack: &str, needle_lower: &str) -> Option<usize> {
    haystack
        .char_indices()
        .position(|(byte, _)| haystack[byte..].to_lowercase().starts_with(needle_lower))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::persistence::{KeyValueStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store_with(commands: &[&str]) -> HistoryStore {
        let mut history = HistoryStore::default();
        for c in commands {
            history.add_command(c, Some("s1"));
        }
        history
    }

    #[test]
    fn test_create_session_is_idempotent() {
        let mut history = HistoryStore::default();
        let first = history.create_session("s1") as *const HistorySession;
        let second = history.create_session("s1") as *const HistorySession;
        assert_eq!(first, second);
        assert_eq!(history.session_count(), 1);
    }

    #[test]
    fn test_add_command_records_in_session_and_global() {
        let history = store_with(&["ls -la"]);
        let session = history.session("s1").unwrap();
        assert_eq!(session.len(), 1);
        assert_eq!(session.cursor(), 1);
        assert_eq!(history.global_history().len(), 1);
        assert_eq!(session.entries()[0].command, "ls -la");
    }

    #[test]
    fn test_add_command_trims_whitespace() {
        let history = store_with(&["   pwd  "]);
        assert_eq!(history.session("s1").unwrap().entries()[0].command, "pwd");
    }

    #[test]
    fn test_blank_command_not_recorded() {
        let mut history = HistoryStore::default();
        assert!(history.add_command("   ", Some("s1")).is_none());
        assert!(history.session("s1").is_none());
    }

    #[test]
    fn test_ignored_commands_not_recorded() {
        let mut history = HistoryStore::default();
        assert!(history.add_command("passwd", Some("s1")).is_none());
        assert!(history.add_command("psql -U admin", Some("s1")).is_none());
        assert!(history.add_command("mysql -p secret", Some("s1")).is_none());
        assert!(history.session("s1").is_none_or(|s| s.is_empty()));
        assert!(history.global_history().is_empty());
    }

    #[test]
    fn test_duplicate_returns_existing_entry() {
        let mut history = HistoryStore::default();
        let first = history.add_command("make", Some("s1")).unwrap();
        let second = history.add_command("make", Some("s1")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(history.session("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_duplicates_kept_when_disabled() {
        let mut history = HistoryStore::new(HistorySettings {
            ignore_duplicates: false,
            ..Default::default()
        });
        history.add_command("make", Some("s1"));
        history.add_command("make", Some("s1"));
        assert_eq!(history.session("s1").unwrap().len(), 2);
    }

    #[test]
    fn test_non_consecutive_duplicates_recorded() {
        let history = store_with(&["make", "ls", "make"]);
        assert_eq!(history.session("s1").unwrap().len(), 3);
    }

    #[test]
    fn test_global_disabled() {
        let mut history = HistoryStore::new(HistorySettings {
            persist_across_sessions: false,
            ..Default::default()
        });
        history.add_command("ls", Some("s1"));
        assert!(history.global_history().is_empty());
        assert_eq!(history.session("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_fifo_eviction_keeps_newest() {
        let mut history = HistoryStore::new(HistorySettings {
            max_entries: 3,
            ..Default::default()
        });
        for i in 0..5 {
            history.add_command(&format!("cmd {i}"), Some("s1"));
        }
        let cmds: Vec<String> = history
            .session("s1")
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.command.clone())
            .collect();
        assert_eq!(cmds, vec!["cmd 2", "cmd 3", "cmd 4"]);
        assert_eq!(history.global_history().len(), 3);
        // Evicted entries are gone from the index too
        assert!(
            history
                .search_history(&SearchQuery::new("cmd 0").in_session("s1"))
                .is_empty()
        );
    }

    #[test]
    fn test_default_session_used_when_none() {
        let mut history = HistoryStore::default();
        history.add_command("uptime", None);
        assert_eq!(history.session(DEFAULT_SESSION).unwrap().len(), 1);
    }

    #[test]
    fn test_navigate_unknown_session_is_none() {
        let mut history = HistoryStore::default();
        assert!(history.navigate_history(Direction::Up, Some("nope")).is_none());
    }

    #[test]
    fn test_navigate_down_at_end_returns_blank() {
        let mut history = store_with(&["a", "b"]);
        assert_eq!(
            history.navigate_history(Direction::Down, Some("s1")).as_deref(),
            Some("")
        );
        assert_eq!(
            history.navigate_history(Direction::Up, Some("s1")).as_deref(),
            Some("b")
        );
    }

    #[test]
    fn test_search_newest_first_via_index() {
        let history = store_with(&["git status", r#"git commit -m "x""#, "ls -la"]);
        let results = history.search_history(&SearchQuery::new("git").in_session("s1"));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.command, r#"git commit -m "x""#);
        assert_eq!(results[1].entry.command, "git status");
        assert_eq!(results[0].match_index, 0);
        assert_eq!(results[0].match_length, 3);
    }

    #[test]
    fn test_search_falls_back_to_scan_mid_word() {
        let history = store_with(&["git status", "ls -la"]);
        let results = history.search_history(&SearchQuery::new("tatus").in_session("s1"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_index, 5);
    }

    #[test]
    fn test_search_scans_when_index_hits_only_other_sessions() {
        let mut history = HistoryStore::default();
        history.add_command("mygit push", Some("s1"));
        history.add_command("git status", Some("s2"));

        let results = history.search_history(&SearchQuery::new("git").in_session("s1"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.command, "mygit push");
        assert_eq!(results[0].match_index, 2);
    }

    #[test]
    fn test_search_match_index_counts_original_chars() {
        let history = store_with(&["İstanbul git log"]);
        let results = history.search_history(&SearchQuery::new("git").in_session("s1"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_index, 9);
        let highlighted: String = results[0]
            .entry
            .command
            .chars()
            .skip(results[0].match_index)
            .take(results[0].match_length)
            .collect();
        assert_eq!(highlighted, "git");
    }

    #[test]
    fn test_search_case_sensitivity() {
        let history = store_with(&["Make all", "make test"]);
        let insensitive = history.search_history(&SearchQuery::new("make").in_session("s1"));
        assert_eq!(insensitive.len(), 2);
        let sensitive = history.search_history(
            &SearchQuery::new("Make")
                .in_session("s1")
                .case_sensitive(true),
        );
        assert_eq!(sensitive.len(), 1);
        assert_eq!(sensitive[0].entry.command, "Make all");
    }

    #[test]
    fn test_search_limit_and_global_scope() {
        let mut history = HistoryStore::default();
        history.add_command("echo one", Some("a"));
        history.add_command("echo two", Some("b"));
        history.add_command("echo three", Some("b"));

        let session_only = history.search_history(&SearchQuery::new("echo").in_session("a"));
        assert_eq!(session_only.len(), 1);

        let global = history.search_history(&SearchQuery::new("echo").global().limit(2));
        assert_eq!(global.len(), 2);
        assert_eq!(global[0].entry.command, "echo three");
    }

    #[test]
    fn test_search_blank_query_lists_recent() {
        let history = store_with(&["a", "b", "c"]);
        let results = history.search_history(&SearchQuery::new("").in_session("s1").limit(2));
        let cmds: Vec<&str> = results.iter().map(|r| r.entry.command.as_str()).collect();
        assert_eq!(cmds, vec!["c", "b"]);
    }

    #[test]
    fn test_clear_single_session_keeps_others() {
        let mut history = HistoryStore::default();
        history.add_command("ls", Some("a"));
        history.add_command("pwd", Some("b"));
        history.clear_history(Some("a"));
        assert!(history.session("a").unwrap().is_empty());
        assert_eq!(history.session("b").unwrap().len(), 1);
    }

    #[test]
    fn test_clear_all() {
        let mut history = store_with(&["ls", "pwd"]);
        history.clear_history(None);
        assert!(history.session("s1").unwrap().is_empty());
        assert!(history.global_history().is_empty());
        assert!(
            history
                .search_history(&SearchQuery::new("ls").global())
                .is_empty()
        );
    }

    #[test]
    fn test_lru_session_eviction() {
        let mut history = HistoryStore::new(HistorySettings {
            max_sessions: 2,
            ..Default::default()
        });
        history.add_command("one", Some("a"));
        history.add_command("two", Some("b"));
        history.add_command("three", Some("c"));
        assert_eq!(history.session_count(), 2);
        assert!(history.session("a").is_none());
        assert!(history.session("b").is_some() && history.session("c").is_some());
    }

    #[test]
    fn test_tags_and_favorites() {
        let mut history = HistoryStore::default();
        let entry = history.add_command("deploy prod", Some("s1")).unwrap();
        assert!(history.tag_entry(entry.id, vec!["ops".into()]));
        assert!(history.set_favorite(entry.id, true));
        let favorites = history.favorites();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].tags, vec!["ops".to_string()]);
        assert!(history.global_history()[0].favorite);
        assert!(!history.set_favorite(Uuid::new_v4(), true));
    }

    #[test]
    fn test_statistics() {
        let history = store_with(&["ls", "pwd", "ls"]);
        let stats = history.statistics();
        assert_eq!(stats.total_commands, 3);
        assert_eq!(stats.unique_commands, 2);
        assert_eq!(stats.top_commands[0], ("ls".to_string(), 2));
    }

    #[test]
    fn test_recent_commands_unique_newest_first() {
        let history = store_with(&["ls", "pwd", "ls", "make"]);
        assert_eq!(
            history.recent_commands(Some("s1"), 10),
            vec!["make", "ls", "pwd"]
        );
    }

    #[test]
    fn test_persist_and_reopen() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        {
            let mut history = HistoryStore::open(HistorySettings::default(), store.clone());
            history.set_current_session("prod");
            history.add_command("uptime", None);
            history.add_command("df -h", None);
        }
        let mut reopened = HistoryStore::open(HistorySettings::default(), store);
        assert_eq!(reopened.current_session_id(), "prod");
        assert_eq!(reopened.session("prod").unwrap().len(), 2);
        assert_eq!(
            reopened.navigate_history(Direction::Up, None).as_deref(),
            Some("df -h")
        );
        assert_eq!(
            reopened
                .search_history(&SearchQuery::new("uptime"))
                .len(),
            1
        );
    }

    #[test]
    fn test_open_with_corrupted_state_starts_empty() {
        let store = MemoryStore::new();
        store.set(STATE_KEY, "{{{garbage").unwrap();
        store.set(SETTINGS_KEY, "[1, 2").unwrap();
        let history = HistoryStore::open(HistorySettings::default(), Arc::new(store));
        assert_eq!(history.session_count(), 0);
        assert_eq!(history.settings(), &HistorySettings::default());
    }

    #[test]
    fn test_update_settings_trims_and_persists() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::open(HistorySettings::default(), store.clone());
        for c in ["a", "b", "c", "d"] {
            history.add_command(c, Some("s1"));
        }
        history.update_settings(HistorySettings {
            max_entries: 2,
            ..Default::default()
        });
        assert_eq!(history.session("s1").unwrap().len(), 2);

        let reopened = HistoryStore::open(HistorySettings::default(), store);
        assert_eq!(reopened.settings().max_entries, 2);
    }

    #[test]
    fn test_command_added_event() {
        let mut history = HistoryStore::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = history
            .events()
            .subscribe(EventKind::CommandAdded, move |event| {
                if let EngineEvent::CommandAdded(entry) = event {
                    assert_eq!(entry.command, "ls");
                    h.fetch_add(1, Ordering::SeqCst);
                }
            });
        history.add_command("ls", Some("s1"));
        history.add_command("ls", Some("s1"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        sub.unsubscribe();
    }

    #[test]
    fn test_export_import_merge_by_id() {
        let source = store_with(&["ls", "pwd"]);
        let export = source.export_history();

        let mut target = HistoryStore::default();
        target.add_command("uname -a", Some("s1"));
        assert!(target.import_history(export.clone(), ImportMode::Merge));
        assert_eq!(target.session("s1").unwrap().len(), 3);

        // Importing the same export again adds nothing
        assert!(target.import_history(export, ImportMode::Merge));
        assert_eq!(target.session("s1").unwrap().len(), 3);
        assert_eq!(target.global_history().len(), 3);
    }

    #[test]
    fn test_import_replace_adopts_settings() {
        let mut source = HistoryStore::new(HistorySettings {
            max_entries: 50,
            ..Default::default()
        });
        source.add_command("ls", Some("x"));
        let json = source.export_json().unwrap();

        let mut target = store_with(&["pwd"]);
        assert!(target.import_json(&json, ImportMode::Replace));
        assert!(target.session("s1").is_none());
        assert_eq!(target.session("x").unwrap().len(), 1);
        assert_eq!(target.settings().max_entries, 50);
        assert_eq!(target.current_session_id(), "x");
    }

    #[test]
    fn test_import_corrupted_leaves_state_untouched() {
        let mut history = store_with(&["ls"]);
        assert!(!history.import_json("{\"sessions\": 42}", ImportMode::Replace));
        assert!(!history.import_json("not json", ImportMode::Merge));
        assert_eq!(history.session("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_import_future_version_rejected() {
        let mut history = store_with(&["ls"]);
        let mut export = history.export_history();
        export.version = EXPORT_VERSION + 1;
        assert!(!history.import_history(export, ImportMode::Replace));
        assert_eq!(history.session("s1").unwrap().len(), 1);
    }
}
