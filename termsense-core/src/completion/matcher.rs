//! Candidate filtering shared by all completion providers.

use super::CompletionSettings;
use nucleo_matcher::pattern::{Atom, AtomKind, CaseMatching, Normalization};
use nucleo_matcher::{Config, Utf32Str};
use std::sync::Mutex;

/// Fuzzy (subsequence) or prefix matcher backed by `nucleo-matcher`.
///
/// Case-insensitive unless configured otherwise. An empty query matches
/// every candidate.
pub struct Matcher {
    fuzzy: bool,
    case_sensitive: bool,
    inner: Mutex<nucleo_matcher::Matcher>,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("fuzzy", &self.fuzzy)
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl Matcher {
    pub fn new(fuzzy: bool, case_sensitive: bool) -> Self {
        Self {
            fuzzy,
            case_sensitive,
            inner: Mutex::new(nucleo_matcher::Matcher::new(Config::DEFAULT)),
        }
    }

    pub fn from_settings(settings: &CompletionSettings) -> Self {
        Self::new(settings.fuzzy_matching, settings.case_sensitive)
    }

    pub fn is_fuzzy(&self) -> bool {
        self.fuzzy
    }

    /// Whether `candidate` matches `query`.
    pub fn matches(&self, candidate: &str, query: &str) -> bool {
        self.score(candidate, query).is_some()
    }

    /// Match score, higher is better. `None` when there is no match.
    pub fn score(&self, candidate: &str, query: &str) -> Option<u16> {
        if query.is_empty() {
            return Some(0);
        }
        let needle = if self.case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };
        let case = if self.case_sensitive {
            CaseMatching::Respect
        } else {
            CaseMatching::Ignore
        };
        let kind = if self.fuzzy {
            AtomKind::Fuzzy
        } else {
            AtomKind::Prefix
        };
        let atom = Atom::new(&needle, case, Normalization::Never, kind, false);

        let mut buf = Vec::new();
        let haystack = Utf32Str::new(candidate, &mut buf);
        let mut matcher = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        atom.score(haystack, &mut matcher)
    }

    /// Plain prefix test honouring the case setting. Providers use it to rank
    /// prefix hits above fuzzy-only hits.
    pub fn is_prefix(&self, candidate: &str, query: &str) -> bool {
        if self.case_sensitive {
            candidate.starts_with(query)
        } else {
            candidate.to_lowercase().starts_with(&query.to_lowercase())
        }
    }

    /// Keep the candidates that match `query`, in input order.
    pub fn filter<'a, I>(&self, candidates: I, query: &str) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter(|c| self.matches(c, query))
            .collect()
    }
}
