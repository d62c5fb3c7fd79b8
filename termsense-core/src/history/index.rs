//! Word-level inverted index over history entries.
//!
//! Maps each lowercase whitespace-delimited word to the ids of the entries
//! containing it. Lookups are word-prefix based: the query word `sta` hits
//! entries containing `status` or `stash`. Words of a multi-word query are
//! intersected.

use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
pub struct InvertedIndex {
    words: BTreeMap<String, HashSet<Uuid>>,
}

/// Lowercase, deduplicated words of `text`.
pub(crate) fn index_words(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Uuid, command: &str) {
        for word in index_words(command) {
            self.words.entry(word).or_default().insert(id);
        }
    }

    pub fn remove(&mut self, id: Uuid, command: &str) {
        for word in index_words(command) {
            if let Some(ids) = self.words.get_mut(&word) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.words.remove(&word);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Number of distinct indexed words.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Entry ids matching every word of `query`. Empty for a blank query.
    pub fn candidates(&self, query: &str) -> HashSet<Uuid> {
        let mut result: Option<HashSet<Uuid>> = None;
        for word in index_words(query) {
            let hits = self.prefix_hits(&word);
            let next = match result {
                None => hits,
                Some(acc) => acc.intersection(&hits).copied().collect(),
            };
            if next.is_empty() {
                return next;
            }
            result = Some(next);
        }
        result.unwrap_or_default()
    }

    fn prefix_hits(&self, prefix: &str) -> HashSet<Uuid> {
        self.words
            .range(prefix.to_string()..)
            .take_while(|(word, _)| word.starts_with(prefix))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }
}
