//! Termsense CLI: interactive line editor with command history, completion
//! and aliases in front of a remote shell.
//!
//! Runs the interactive editor by default, or a one-shot subcommand.

mod commands;
mod repl;
mod repl_input;

use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use termsense_core::completion::LocalPathSource;
use termsense_core::config::{load_config, load_config_file};
use termsense_core::history::DEFAULT_SESSION;
use termsense_core::{Engine, EngineConfig, FileStore, SharedStore};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Termsense: command history, completion and aliases for remote terminals
#[derive(Parser, Debug)]
#[command(name = "termsense", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces the layered lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// History session to use
    #[arg(short, long, default_value = DEFAULT_SESSION)]
    session: String,

    /// Keep all state in memory for this run
    #[arg(long)]
    no_persist: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect, export or import command history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Manage aliases
    Alias {
        #[command(subcommand)]
        action: AliasAction,
    },
    /// Print completions for a line
    Complete {
        /// The partial command line
        line: String,
        /// Cursor position in characters (defaults to end of line)
        #[arg(long)]
        cursor: Option<usize>,
        /// Print suggestions as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[derive(clap::Subcommand, Debug)]
enum HistoryAction {
    /// Search the history, newest first
    Search {
        /// Text to look for
        query: String,
        /// Search the global history instead of the session
        #[arg(short, long)]
        global: bool,
        /// Match case exactly
        #[arg(short, long)]
        case_sensitive: bool,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show usage statistics
    Stats,
    /// Write all history as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load history from a JSON export
    Import {
        /// Export file to read
        path: PathBuf,
        /// Replace existing history instead of merging
        #[arg(long)]
        replace: bool,
    },
    /// Clear the session's history
    Clear {
        /// Clear every session and the global history
        #[arg(long)]
        all: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
enum AliasAction {
    /// List aliases
    List,
    /// Define or replace an alias
    Add {
        /// Alias name
        name: String,
        /// Command template ({name}, $1, $@ placeholders)
        #[arg(required = true, num_args = 1..)]
        template: Vec<String>,
    },
    /// Remove an alias
    Remove {
        /// Alias name
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "termsense", "termsense")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "termsense.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => load_config(Some(&workspace), None)
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?,
    };
    if cli.no_persist {
        config.storage.enabled = false;
    }
    config.validate()?;

    let engine = build_engine(config, &workspace);

    match cli.command {
        Some(command) => commands::handle_command(command, &engine, &cli.session, &workspace).await,
        None if std::io::stdin().is_terminal() => {
            repl::run_interactive(&engine, &cli.session, &workspace).await
        }
        None => repl::run_piped(&engine, &cli.session).await,
    }
}

/// Wire the engine with a file store (unless persistence is off) and the
/// workspace as the file completion root.
fn build_engine(config: EngineConfig, workspace: &Path) -> Engine {
    let store: Option<SharedStore> = config.storage.resolve_dir().map(|dir| {
        tracing::debug!(dir = %dir.display(), "Using file store");
        Arc::new(FileStore::new(dir)) as SharedStore
    });
    let paths = Arc::new(LocalPathSource::new(workspace));
    Engine::new(config, store, paths)
}
