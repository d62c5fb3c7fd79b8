//! Error types for the Termsense engine.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering history, aliases, completion providers, local commands, storage
//! and configuration. Most engine operations report failures through
//! sentinel values (`None`, `false`, empty results) and only log these
//! errors; they surface as `Err` where the caller has to react.

use std::path::PathBuf;

/// Top-level error type for the Termsense core library.
#[derive(Debug, thiserror::Error)]
pub enum TermsenseError {
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Alias error: {0}")]
    Alias(#[from] AliasError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the history store.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Import rejected: {message}")]
    ImportRejected { message: String },

    #[error("Unsupported export version {found} (expected <= {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Errors from alias management.
#[derive(Debug, thiserror::Error)]
pub enum AliasError {
    #[error("Invalid alias name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Alias '{name}' has an empty command template")]
    EmptyTemplate { name: String },

    #[error("Alias not found: {name}")]
    NotFound { name: String },

    #[error("Alias '{name}' is missing required parameter '{parameter}'")]
    MissingParameter { name: String, parameter: String },
}

/// Errors raised by completion providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider '{name}' failed: {message}")]
    Failed { name: String, message: String },

    #[error("Path listing failed for '{path}': {message}")]
    PathListing { path: String, message: String },
}

/// Errors from local command handlers.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Usage: {usage}")]
    Usage { usage: String },

    #[error("Invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("{command} failed: {message}")]
    ExecutionFailed { command: String, message: String },

    #[error(transparent)]
    Alias(#[from] AliasError),
}

/// Errors from the key-value persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to read key '{key}': {message}")]
    Read { key: String, message: String },

    #[error("Failed to write key '{key}': {message}")]
    Write { key: String, message: String },

    #[error("Invalid storage key '{key}'")]
    InvalidKey { key: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `TermsenseError`.
pub type Result<T> = std::result::Result<T, TermsenseError>;
