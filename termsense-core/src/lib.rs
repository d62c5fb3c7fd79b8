//! # Termsense Core
//!
//! Command intelligence for terminal clients: a per-session and global
//! command history with indexed search and replay navigation, a pluggable
//! completion engine with caching and fuzzy matching, and an alias and
//! local-command layer that decides whether each line is handled
//! client-side or forwarded to the remote shell.
//!
//! [`Engine`] wires the pieces together around a shared [`EventBus`] and an
//! optional [`KeyValueStore`] for persistence.

pub mod alias;
pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod persistence;
pub mod router;
pub mod tokenizer;

// Re-export commonly used types at the crate root.
pub use alias::{Alias, AliasSettings, AliasTable, Expansion, SharedAliases};
pub use completion::{
    CompletionContext, CompletionEngine, CompletionProvider, CompletionSettings, CompletionState,
    CompletionSuggestion, Priority, ProviderBuilder, SuggestionKind,
};
pub use config::{EngineConfig, StorageConfig, load_config};
pub use engine::Engine;
pub use error::{Result, TermsenseError};
pub use events::{EngineEvent, EventBus, EventKind, Subscription};
pub use history::{
    Direction, HistoryEntry, HistorySession, HistorySettings, HistoryStore, ImportMode,
    SearchQuery, SearchResult, SharedHistory,
};
pub use persistence::{FileStore, KeyValueStore, MemoryStore, SharedStore};
pub use router::{
    BufferedOutput, CommandRouter, LocalCommand, OutputSink, RouteOutcome, RouterSettings,
};
