//! Time-bounded memo of completion results.
//!
//! Entries are evicted lazily: an expired entry is dropped when it is next
//! looked up, or when [`CompletionCache::purge_expired`] runs.

use super::CompletionSuggestion;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Identifies one completion request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub session_id: Option<String>,
    pub line: String,
    pub cursor: usize,
}

impl CacheKey {
    pub fn new(session_id: Option<&str>, line: &str, cursor: usize) -> Self {
        Self {
            session_id: session_id.map(str::to_string),
            line: line.to_string(),
            cursor,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.session_id {
            Some(session) => write!(f, "{session}|{}:{}", self.line, self.cursor),
            None => write!(f, "{}:{}", self.line, self.cursor),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub suggestions: Vec<CompletionSuggestion>,
    pub created_at: Instant,
    pub expires_at: Instant,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
pub struct CompletionCache {
    entries: HashMap<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl CompletionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached suggestions for `key`, provided they have not expired at `now`.
    pub fn get(&mut self, key: &CacheKey, now: Instant) -> Option<Vec<CompletionSuggestion>> {
        match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => {
                self.hits += 1;
                Some(entry.suggestions.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(
        &mut self,
        key: CacheKey,
        suggestions: Vec<CompletionSuggestion>,
        ttl: Duration,
        now: Instant,
    ) {
        self.entries.insert(
            key,
            CacheEntry {
                suggestions,
                created_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Drop every entry expired at `now`. Returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| now < e.expires_at);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}
