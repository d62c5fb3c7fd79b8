//! Pluggable, cached completion engine.
//!
//! Each request parses a [`CompletionContext`] from the line and cursor,
//! consults a short-lived cache, and otherwise fans out to every provider
//! that can complete the context. Results are merged, deduplicated by
//! `(text, kind)`, ranked and truncated.
//!
//! Ranking is deterministic and independent of provider registration order:
//! priority descending, then text length ascending, then lexical order.

pub mod cache;
pub mod context;
pub mod matcher;
pub mod provider;
pub mod providers;

pub use cache::{CacheKey, CacheStats, CompletionCache};
pub use context::{CompletionContext, apply_suggestion};
pub use matcher::Matcher;
pub use provider::{CompletionProvider, ProviderBuilder};
pub use providers::{
    BUILTIN_PROVIDERS, CommandsProvider, FilesProvider, FlagsProvider, HistoryProvider,
    LocalPathSource, PathEntry, PathSource, StaticPathSource,
};

use crate::events::{EngineEvent, EventBus, SettingsPayload};
use crate::persistence::{self, SharedStore};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Storage key for completion settings.
pub const SETTINGS_KEY: &str = "completion.settings";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub enabled: bool,
    pub max_suggestions: usize,
    /// How long a cached result stays valid. `0` disables caching.
    pub cache_timeout_ms: u64,
    pub fuzzy_matching: bool,
    pub case_sensitive: bool,
    /// Minimum typed characters before history suggestions appear.
    pub min_characters: usize,
    pub show_descriptions: bool,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_suggestions: 10,
            cache_timeout_ms: 5000,
            fuzzy_matching: true,
            case_sensitive: false,
            min_characters: 1,
            show_descriptions: true,
        }
    }
}

/// What a suggestion completes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Command,
    Flag,
    Option,
    File,
    Directory,
    Variable,
    History,
    Alias,
    Custom,
}

impl std::fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SuggestionKind::Command => "command",
            SuggestionKind::Flag => "flag",
            SuggestionKind::Option => "option",
            SuggestionKind::File => "file",
            SuggestionKind::Directory => "directory",
            SuggestionKind::Variable => "variable",
            SuggestionKind::History => "history",
            SuggestionKind::Alias => "alias",
            SuggestionKind::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// Suggestion priority. Named levels map to fixed scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
    #[serde(untagged)]
    Value(i32),
}

impl Priority {
    pub fn score(self) -> i32 {
        match self {
            Priority::High => 100,
            Priority::Medium => 50,
            Priority::Low => 10,
            Priority::Value(v) => v,
        }
    }
}

impl From<i32> for Priority {
    fn from(v: i32) -> Self {
        Priority::Value(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSuggestion {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    #[serde(default)]
    pub priority: Priority,
}

impl CompletionSuggestion {
    pub fn new(text: impl Into<String>, kind: SuggestionKind) -> Self {
        Self {
            text: text.into(),
            insert_text: None,
            description: None,
            kind,
            priority: Priority::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_insert_text(mut self, insert_text: impl Into<String>) -> Self {
        self.insert_text = Some(insert_text.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Text to splice into the line.
    pub fn insert_text(&self) -> &str {
        self.insert_text.as_deref().unwrap_or(&self.text)
    }
}

/// Total order used for ranking.
fn rank_order(a: &CompletionSuggestion, b: &CompletionSuggestion) -> Ordering {
    b.priority
        .score()
        .cmp(&a.priority.score())
        .then_with(|| a.text.chars().count().cmp(&b.text.chars().count()))
        .then_with(|| a.text.cmp(&b.text))
        .then_with(|| a.kind.cmp(&b.kind))
        .then_with(|| a.description.cmp(&b.description))
        .then_with(|| a.insert_text.cmp(&b.insert_text))
}

/// Sort, drop `(text, kind)` duplicates keeping the best-ranked one, and
/// truncate to `max`.
pub fn rank_suggestions(
    mut suggestions: Vec<CompletionSuggestion>,
    max: usize,
) -> Vec<CompletionSuggestion> {
    suggestions.sort_by(rank_order);
    let mut seen = HashSet::new();
    suggestions.retain(|s| seen.insert((s.text.clone(), s.kind)));
    suggestions.truncate(max);
    suggestions
}

/// UI-facing popup state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionState {
    pub is_active: bool,
    pub suggestions: Vec<CompletionSuggestion>,
    pub selected_index: usize,
}

/// Partial update for [`CompletionEngine::set_state`].
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub is_active: Option<bool>,
    pub suggestions: Option<Vec<CompletionSuggestion>>,
    pub selected_index: Option<usize>,
}

impl StateUpdate {
    /// Show `suggestions` with the first one selected.
    pub fn show(suggestions: Vec<CompletionSuggestion>) -> Self {
        Self {
            is_active: Some(!suggestions.is_empty()),
            suggestions: Some(suggestions),
            selected_index: Some(0),
        }
    }

    /// Hide the popup and drop its suggestions.
    pub fn dismiss() -> Self {
        Self {
            is_active: Some(false),
            suggestions: Some(Vec::new()),
            selected_index: Some(0),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// The completion engine. All operations take `&self`; share it behind an
/// `Arc`.
pub struct CompletionEngine {
    settings: RwLock<CompletionSettings>,
    providers: RwLock<Vec<Arc<dyn CompletionProvider>>>,
    cache: Mutex<CompletionCache>,
    state: Mutex<CompletionState>,
    store: Option<SharedStore>,
    events: EventBus,
}

impl std::fmt::Debug for CompletionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionEngine")
            .field("providers", &self.provider_names())
            .field("cached", &lock(&self.cache).len())
            .finish()
    }
}

impl Default for CompletionEngine {
    fn default() -> Self {
        Self::new(CompletionSettings::default())
    }
}

impl CompletionEngine {
    /// Engine with no providers.
    pub fn new(settings: CompletionSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            providers: RwLock::new(Vec::new()),
            cache: Mutex::new(CompletionCache::new()),
            state: Mutex::new(CompletionState::default()),
            store: None,
            events: EventBus::new(),
        }
    }

    /// Engine whose settings persist in `store`; saved settings win over
    /// `defaults`.
    pub fn open(defaults: CompletionSettings, store: SharedStore) -> Self {
        let settings = persistence::load_json(store.as_ref(), SETTINGS_KEY).unwrap_or(defaults);
        let mut engine = Self::new(settings);
        engine.store = Some(store);
        engine
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> CompletionSettings {
        self.settings
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Replace the settings, invalidate the cache and persist.
    pub fn update_settings(&self, settings: CompletionSettings) {
        {
            let mut current = self.settings.write().unwrap_or_else(|p| p.into_inner());
            *current = settings.clone();
        }
        lock(&self.cache).clear();
        if let Some(store) = &self.store {
            persistence::save_json(store.as_ref(), SETTINGS_KEY, &settings);
        }
        debug!(?settings, "Completion settings updated");
        self.events
            .emit(EngineEvent::SettingsChanged(SettingsPayload::Completion(settings)));
    }

    // ── Providers ────────────────────────────────────────────────────────

    /// Register `provider`, replacing any provider with the same name.
    pub fn register_provider(&self, provider: Arc<dyn CompletionProvider>) {
        let name = provider.name().to_string();
        {
            let mut providers = self.providers.write().unwrap_or_else(|p| p.into_inner());
            providers.retain(|p| p.name() != name);
            providers.push(provider);
            providers.sort_by(|a, b| {
                b.priority()
                    .cmp(&a.priority())
                    .then_with(|| a.name().cmp(b.name()))
            });
        }
        lock(&self.cache).clear();
        debug!(provider = %name, "Registered completion provider");
        self.events
            .emit(EngineEvent::ProviderRegistered { name });
    }

    /// Remove a provider. Built-in providers stay; returns whether one was
    /// removed.
    pub fn unregister_provider(&self, name: &str) -> bool {
        if BUILTIN_PROVIDERS.contains(&name) {
            warn!(provider = %name, "Refusing to unregister built-in provider");
            return false;
        }
        let removed = {
            let mut providers = self.providers.write().unwrap_or_else(|p| p.into_inner());
            let before = providers.len();
            providers.retain(|p| p.name() != name);
            providers.len() != before
        };
        if removed {
            lock(&self.cache).clear();
            debug!(provider = %name, "Unregistered completion provider");
            self.events.emit(EngineEvent::ProviderUnregistered {
                name: name.to_string(),
            });
        }
        removed
    }

    /// Registered provider names, highest provider priority first.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .read()
            .map(|p| p.iter().map(|p| p.name().to_string()).collect())
            .unwrap_or_default()
    }

    // ── Completion ───────────────────────────────────────────────────────

    pub async fn get_completions(&self, input: &str, cursor: usize) -> Vec<CompletionSuggestion> {
        self.get_completions_in(None, input, cursor).await
    }

    /// Suggestions for `input` with the cursor at character `cursor`, in
    /// the context of `session_id`.
    pub async fn get_completions_in(
        &self,
        session_id: Option<&str>,
        input: &str,
        cursor: usize,
    ) -> Vec<CompletionSuggestion> {
        let settings = self.settings();
        if !settings.enabled {
            return Vec::new();
        }

        let ctx = CompletionContext::parse(input, cursor).with_session(session_id);
        let key = CacheKey::new(session_id, &ctx.full_line, ctx.cursor_position);
        if let Some(hit) = lock(&self.cache).get(&key, Instant::now()) {
            trace!(key = %key, "Completion cache hit");
            return hit;
        }

        let active: Vec<Arc<dyn CompletionProvider>> = self
            .providers
            .read()
            .map(|p| p.iter().filter(|p| p.can_complete(&ctx)).cloned().collect())
            .unwrap_or_default();

        let matcher = Matcher::from_settings(&settings);
        let batches = join_all(active.iter().map(|provider| {
            let ctx = &ctx;
            let matcher = &matcher;
            async move {
                match provider.get_completions(ctx, matcher).await {
                    Ok(suggestions) => suggestions,
                    Err(e) => {
                        warn!(provider = %provider.name(), error = %e, "Completion provider failed");
                        Vec::new()
                    }
                }
            }
        }))
        .await;

        let mut ranked = rank_suggestions(
            batches.into_iter().flatten().collect(),
            settings.max_suggestions,
        );
        if !settings.show_descriptions {
            for s in &mut ranked {
                s.description = None;
            }
        }

        if settings.cache_timeout_ms > 0 {
            lock(&self.cache).insert(
                key,
                ranked.clone(),
                Duration::from_millis(settings.cache_timeout_ms),
                Instant::now(),
            );
        }
        debug!(
            providers = active.len(),
            suggestions = ranked.len(),
            "Computed completions"
        );
        ranked
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        lock(&self.cache).clear();
        self.events.emit(EngineEvent::CacheCleared);
    }

    /// Remove expired cache entries now instead of on next lookup.
    pub fn purge_expired(&self) -> usize {
        lock(&self.cache).purge_expired(Instant::now())
    }

    pub fn cache_stats(&self) -> CacheStats {
        lock(&self.cache).stats()
    }

    // ── Popup state ──────────────────────────────────────────────────────

    pub fn state(&self) -> CompletionState {
        lock(&self.state).clone()
    }

    /// Apply a partial update; the selection is clamped to the suggestions.
    pub fn set_state(&self, update: StateUpdate) {
        let snapshot = {
            let mut state = lock(&self.state);
            if let Some(active) = update.is_active {
                state.is_active = active;
            }
            if let Some(suggestions) = update.suggestions {
                state.suggestions = suggestions;
                state.selected_index = 0;
            }
            if let Some(index) = update.selected_index {
                state.selected_index = index;
            }
            state.selected_index = state
                .selected_index
                .min(state.suggestions.len().saturating_sub(1));
            state.clone()
        };
        self.events
            .emit(EngineEvent::CompletionStateChanged(snapshot));
    }

    /// Move the selection down, wrapping around.
    pub fn select_next(&self) {
        self.move_selection(1);
    }

    /// Move the selection up, wrapping around.
    pub fn select_previous(&self) {
        self.move_selection(-1);
    }

    fn move_selection(&self, step: isize) {
        let snapshot = {
            let mut state = lock(&self.state);
            let len = state.suggestions.len();
            if len == 0 {
                return;
            }
            let current = state.selected_index as isize;
            state.selected_index = (current + step).rem_euclid(len as isize) as usize;
            state.clone()
        };
        self.events
            .emit(EngineEvent::CompletionStateChanged(snapshot));
    }

    /// The highlighted suggestion while the popup is active.
    pub fn selected(&self) -> Option<CompletionSuggestion> {
        let state = lock(&self.state);
        if !state.is_active {
            return None;
        }
        state.suggestions.get(state.selected_index).cloned()
    }
}
