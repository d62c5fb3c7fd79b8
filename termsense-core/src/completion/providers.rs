//! Built-in completion providers.
//!
//! `commands`, `flags`, `history` and `files` are registered by the engine
//! composition root and cannot be unregistered.

use super::{
    CompletionContext, CompletionProvider, CompletionSuggestion, Matcher, Priority, SuggestionKind,
};
use crate::alias::SharedAliases;
use crate::error::ProviderError;
use crate::history::SharedHistory;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

pub const COMMANDS_PROVIDER: &str = "commands";
pub const FLAGS_PROVIDER: &str = "flags";
pub const HISTORY_PROVIDER: &str = "history";
pub const FILES_PROVIDER: &str = "files";

/// Names that `unregister_provider` refuses to remove.
pub const BUILTIN_PROVIDERS: [&str; 4] = [
    COMMANDS_PROVIDER,
    FLAGS_PROVIDER,
    HISTORY_PROVIDER,
    FILES_PROVIDER,
];

/// Prefix hits outrank fuzzy-only hits.
fn match_priority(matcher: &Matcher, candidate: &str, query: &str) -> Priority {
    if matcher.is_prefix(candidate, query) {
        Priority::High
    } else {
        Priority::Medium
    }
}

// ── Commands ─────────────────────────────────────────────────────────────

const COMMON_COMMANDS: &[(&str, &str)] = &[
    ("awk", "Pattern scanning and processing"),
    ("cat", "Concatenate and print files"),
    ("cd", "Change directory"),
    ("chmod", "Change file mode bits"),
    ("chown", "Change file owner and group"),
    ("clear", "Clear the terminal screen"),
    ("cp", "Copy files and directories"),
    ("curl", "Transfer data from or to a server"),
    ("df", "Report file system disk space usage"),
    ("diff", "Compare files line by line"),
    ("docker", "Manage containers"),
    ("du", "Estimate file space usage"),
    ("echo", "Display a line of text"),
    ("env", "Print or modify the environment"),
    ("exit", "Close the shell"),
    ("export", "Set an environment variable"),
    ("find", "Search for files"),
    ("free", "Display memory usage"),
    ("git", "Distributed version control"),
    ("grep", "Print lines matching a pattern"),
    ("head", "Output the first part of files"),
    ("htop", "Interactive process viewer"),
    ("journalctl", "Query the systemd journal"),
    ("kill", "Send a signal to a process"),
    ("kubectl", "Control Kubernetes clusters"),
    ("less", "Page through text"),
    ("ln", "Make links between files"),
    ("ls", "List directory contents"),
    ("make", "Run build recipes"),
    ("man", "Show manual pages"),
    ("mkdir", "Make directories"),
    ("mv", "Move or rename files"),
    ("nano", "Simple text editor"),
    ("ping", "Send ICMP echo requests"),
    ("ps", "Report process status"),
    ("pwd", "Print working directory"),
    ("rm", "Remove files or directories"),
    ("rsync", "Fast incremental file transfer"),
    ("scp", "Secure copy"),
    ("sed", "Stream editor"),
    ("ssh", "OpenSSH remote login client"),
    ("sudo", "Execute a command as another user"),
    ("systemctl", "Control the systemd system and service manager"),
    ("tail", "Output the last part of files"),
    ("tar", "Archive files"),
    ("top", "Display processes"),
    ("touch", "Change file timestamps"),
    ("uname", "Print system information"),
    ("vim", "Vi improved text editor"),
    ("wget", "Non-interactive network downloader"),
    ("whoami", "Print effective user name"),
];

/// Completes the first word of the line from a command catalog and the
/// alias table.
pub struct CommandsProvider {
    commands: RwLock<BTreeMap<String, Option<String>>>,
    aliases: Option<SharedAliases>,
}

impl Default for CommandsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandsProvider {
    /// Provider seeded with common shell commands.
    pub fn new() -> Self {
        let commands = COMMON_COMMANDS
            .iter()
            .map(|(name, desc)| (name.to_string(), Some(desc.to_string())))
            .collect();
        Self {
            commands: RwLock::new(commands),
            aliases: None,
        }
    }

    /// Also offer alias names.
    pub fn with_aliases(mut self, aliases: SharedAliases) -> Self {
        self.aliases = Some(aliases);
        self
    }

    /// Add command names, keeping existing descriptions.
    pub fn add_commands<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = (S, Option<String>)>,
        S: Into<String>,
    {
        let mut commands = self.commands.write().unwrap_or_else(|p| p.into_inner());
        for (name, description) in names {
            let entry = commands.entry(name.into()).or_insert(None);
            if entry.is_none() {
                *entry = description;
            }
        }
    }

    pub fn command_count(&self) -> usize {
        self.commands.read().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CompletionProvider for CommandsProvider {
    fn name(&self) -> &str {
        COMMANDS_PROVIDER
    }

    fn priority(&self) -> i32 {
        100
    }

    fn can_complete(&self, ctx: &CompletionContext) -> bool {
        ctx.is_command_position()
    }

    async fn get_completions(
        &self,
        ctx: &CompletionContext,
        matcher: &Matcher,
    ) -> Result<Vec<CompletionSuggestion>, ProviderError> {
        let query = ctx.current_word.as_str();
        let mut out: Vec<CompletionSuggestion> = {
            let commands = self.commands.read().unwrap_or_else(|p| p.into_inner());
            commands
                .iter()
                .filter(|(name, _)| matcher.matches(name, query))
                .map(|(name, desc)| {
                    let mut s = CompletionSuggestion::new(name.as_str(), SuggestionKind::Command)
                        .with_priority(match_priority(matcher, name, query));
                    s.description = desc.clone();
                    s
                })
                .collect()
        };

        if let Some(aliases) = &self.aliases {
            let table = aliases.read().unwrap_or_else(|p| p.into_inner());
            if table.settings().enabled {
                out.extend(
                    table
                        .all_aliases()
                        .into_iter()
                        .filter(|a| matcher.matches(&a.name, query))
                        .map(|a| {
                            CompletionSuggestion::new(a.name.as_str(), SuggestionKind::Alias)
                                .with_description(format!("alias for: {}", a.command_template))
                                .with_priority(match_priority(matcher, &a.name, query))
                        }),
                );
            }
        }
        Ok(out)
    }
}

// ── Flags ────────────────────────────────────────────────────────────────

type FlagTable = HashMap<&'static str, &'static [(&'static str, &'static str)]>;

fn default_flags() -> FlagTable {
    let mut t: FlagTable = HashMap::new();
    t.insert(
        "ls",
        &[
            ("-l", "Long listing format"),
            ("-a", "Show hidden entries"),
            ("-A", "Show hidden entries except . and .."),
            ("-h", "Human readable sizes"),
            ("-t", "Sort by modification time"),
            ("-r", "Reverse order"),
            ("-R", "List subdirectories recursively"),
            ("--all", "Show hidden entries"),
            ("--color", "Colorize the output"),
        ],
    );
    t.insert(
        "grep",
        &[
            ("-i", "Ignore case"),
            ("-r", "Search recursively"),
            ("-n", "Show line numbers"),
            ("-v", "Invert match"),
            ("-l", "Only print file names"),
            ("-E", "Extended regular expressions"),
            ("--include", "Only search matching files"),
            ("--color", "Highlight matches"),
        ],
    );
    t.insert(
        "git",
        &[
            ("-C", "Run as if started in the given path"),
            ("--version", "Print the git version"),
            ("--help", "Show help"),
            ("--no-pager", "Do not pipe output into a pager"),
        ],
    );
    t.insert(
        "docker",
        &[
            ("-d", "Run detached"),
            ("-it", "Interactive with a TTY"),
            ("-p", "Publish a port"),
            ("-v", "Bind mount a volume"),
            ("-e", "Set an environment variable"),
            ("--rm", "Remove the container on exit"),
            ("--name", "Assign a name"),
        ],
    );
    t.insert(
        "tar",
        &[
            ("-x", "Extract"),
            ("-c", "Create"),
            ("-v", "Verbose"),
            ("-f", "Archive file"),
            ("-z", "Filter through gzip"),
            ("-t", "List contents"),
        ],
    );
    t.insert(
        "ssh",
        &[
            ("-p", "Port"),
            ("-i", "Identity file"),
            ("-L", "Local port forward"),
            ("-R", "Remote port forward"),
            ("-v", "Verbose"),
            ("-A", "Forward the agent"),
        ],
    );
    t.insert(
        "ps",
        &[
            ("-e", "Select all processes"),
            ("-f", "Full format"),
            ("-u", "Filter by user"),
        ],
    );
    t.insert(
        "rm",
        &[
            ("-r", "Remove directories recursively"),
            ("-f", "Ignore missing files, never prompt"),
            ("-i", "Prompt before every removal"),
        ],
    );
    t.insert(
        "cp",
        &[
            ("-r", "Copy directories recursively"),
            ("-a", "Archive mode"),
            ("-v", "Verbose"),
            ("-i", "Prompt before overwrite"),
        ],
    );
    t
}

fn default_subcommands() -> FlagTable {
    let mut t: FlagTable = HashMap::new();
    t.insert(
        "git",
        &[
            ("add", "Add file contents to the index"),
            ("branch", "List, create, or delete branches"),
            ("checkout", "Switch branches or restore files"),
            ("commit", "Record changes to the repository"),
            ("diff", "Show changes"),
            ("fetch", "Download objects and refs"),
            ("log", "Show commit logs"),
            ("merge", "Join development histories"),
            ("pull", "Fetch and integrate"),
            ("push", "Update remote refs"),
            ("rebase", "Reapply commits on top of another base"),
            ("stash", "Stash changes away"),
            ("status", "Show the working tree status"),
        ],
    );
    t.insert(
        "docker",
        &[
            ("build", "Build an image"),
            ("exec", "Run a command in a running container"),
            ("images", "List images"),
            ("logs", "Fetch container logs"),
            ("ps", "List containers"),
            ("pull", "Pull an image"),
            ("run", "Run a command in a new container"),
            ("stop", "Stop containers"),
        ],
    );
    t.insert(
        "systemctl",
        &[
            ("disable", "Disable a unit"),
            ("enable", "Enable a unit"),
            ("restart", "Restart a unit"),
            ("start", "Start a unit"),
            ("status", "Show unit status"),
            ("stop", "Stop a unit"),
        ],
    );
    t
}

/// Per-command flag tables, plus subcommands for the second word of
/// `git`, `docker` and `systemctl`.
pub struct FlagsProvider {
    flags: FlagTable,
    subcommands: FlagTable,
}

impl Default for FlagsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagsProvider {
    pub fn new() -> Self {
        Self {
            flags: default_flags(),
            subcommands: default_subcommands(),
        }
    }

    fn completing_flag(
        &self,
        ctx: &CompletionContext,
    ) -> Option<&'static [(&'static str, &'static str)]> {
        let command = ctx.command()?;
        if !ctx.current_word.starts_with('-') {
            return None;
        }
        self.flags.get(command).copied()
    }

    fn completing_subcommand(
        &self,
        ctx: &CompletionContext,
    ) -> Option<&'static [(&'static str, &'static str)]> {
        if ctx.current_token_index != 1 || ctx.current_word.starts_with('-') {
            return None;
        }
        self.subcommands.get(ctx.command()?).copied()
    }
}

#[async_trait]
impl CompletionProvider for FlagsProvider {
    fn name(&self) -> &str {
        FLAGS_PROVIDER
    }

    fn priority(&self) -> i32 {
        75
    }

    fn can_complete(&self, ctx: &CompletionContext) -> bool {
        self.completing_flag(ctx).is_some() || self.completing_subcommand(ctx).is_some()
    }

    async fn get_completions(
        &self,
        ctx: &CompletionContext,
        matcher: &Matcher,
    ) -> Result<Vec<CompletionSuggestion>, ProviderError> {
        let query = ctx.current_word.as_str();
        if let Some(flags) = self.completing_flag(ctx) {
            return Ok(flags
                .iter()
                .filter(|(flag, _)| matcher.matches(flag, query))
                .map(|(flag, desc)| {
                    let kind = if flag.starts_with("--") {
                        SuggestionKind::Option
                    } else {
                        SuggestionKind::Flag
                    };
                    CompletionSuggestion::new(*flag, kind)
                        .with_description(*desc)
                        .with_priority(match_priority(matcher, flag, query))
                })
                .collect());
        }
        if let Some(subcommands) = self.completing_subcommand(ctx) {
            return Ok(subcommands
                .iter()
                .filter(|(sub, _)| matcher.matches(sub, query))
                .map(|(sub, desc)| {
                    CompletionSuggestion::new(*sub, SuggestionKind::Command)
                        .with_description(*desc)
                        .with_priority(match_priority(matcher, sub, query))
                })
                .collect());
        }
        Ok(Vec::new())
    }
}

// ── History ──────────────────────────────────────────────────────────────

/// How many recent commands the history provider looks at.
const HISTORY_SCAN_LIMIT: usize = 200;

/// Below `Priority::Low`.
const FUZZY_HISTORY_PRIORITY: i32 = 5;

/// Suggests previously recorded commands matching the line so far.
/// Accepting one replaces the whole line. Prefix matches rank above
/// fuzzy-only ones.
pub struct HistoryProvider {
    history: SharedHistory,
    min_characters: usize,
}

impl HistoryProvider {
    pub fn new(history: SharedHistory) -> Self {
        Self {
            history,
            min_characters: 1,
        }
    }

    pub fn with_min_characters(mut self, min_characters: usize) -> Self {
        self.min_characters = min_characters;
        self
    }
}

#[async_trait]
impl CompletionProvider for HistoryProvider {
    fn name(&self) -> &str {
        HISTORY_PROVIDER
    }

    fn priority(&self) -> i32 {
        50
    }

    fn can_complete(&self, ctx: &CompletionContext) -> bool {
        let typed = ctx.line_before_cursor().trim_start();
        !typed.is_empty() && typed.chars().count() >= self.min_characters
    }

    async fn get_completions(
        &self,
        ctx: &CompletionContext,
        matcher: &Matcher,
    ) -> Result<Vec<CompletionSuggestion>, ProviderError> {
        let typed = ctx.line_before_cursor().trim_start();
        let recent = {
            let history = self.history.read().map_err(|e| ProviderError::Failed {
                name: HISTORY_PROVIDER.to_string(),
                message: e.to_string(),
            })?;
            history.recent_commands(ctx.session_id.as_deref(), HISTORY_SCAN_LIMIT)
        };

        Ok(recent
            .into_iter()
            .filter(|cmd| cmd != typed && matcher.matches(cmd, typed))
            .map(|cmd| {
                let priority = if matcher.is_prefix(&cmd, typed) {
                    Priority::Low
                } else {
                    Priority::Value(FUZZY_HISTORY_PRIORITY)
                };
                CompletionSuggestion::new(cmd, SuggestionKind::History).with_priority(priority)
            })
            .collect())
    }
}

// ── Files ────────────────────────────────────────────────────────────────

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Where file names come from. For a remote session this is backed by the
/// remote host; locally by the file system.
#[async_trait]
pub trait PathSource: Send + Sync {
    /// List `dir`, given as typed by the user (`""` for the working directory,
    /// otherwise ending in `/`).
    async fn list(&self, dir: &str) -> Result<Vec<PathEntry>, ProviderError>;
}

/// Fixed in-memory tree, built from slash-separated paths. A trailing `/`
/// marks a directory.
#[derive(Debug, Clone, Default)]
pub struct StaticPathSource {
    dirs: BTreeMap<String, BTreeMap<String, bool>>,
}

impl StaticPathSource {
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dirs: BTreeMap<String, BTreeMap<String, bool>> = BTreeMap::new();
        for path in paths {
            let path = path.as_ref();
            let leaf_is_dir = path.ends_with('/');
            let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
            let mut dir = if path.starts_with('/') {
                "/".to_string()
            } else {
                String::new()
            };
            for (i, part) in parts.iter().enumerate() {
                let is_dir = i + 1 < parts.len() || leaf_is_dir;
                let slot = dirs
                    .entry(dir.clone())
                    .or_default()
                    .entry(part.to_string())
                    .or_insert(false);
                *slot |= is_dir;
                dir.push_str(part);
                dir.push('/');
            }
        }
        Self { dirs }
    }
}

#[async_trait]
impl PathSource for StaticPathSource {
    async fn list(&self, dir: &str) -> Result<Vec<PathEntry>, ProviderError> {
        Ok(self
            .dirs
            .get(dir)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(name, is_dir)| PathEntry {
                        name: name.clone(),
                        is_dir: *is_dir,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Lists directories on the local file system relative to `root`.
#[derive(Debug, Clone)]
pub struct LocalPathSource {
    root: PathBuf,
    max_entries: usize,
}

impl LocalPathSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_entries: 500,
        }
    }
}

#[async_trait]
impl PathSource for LocalPathSource {
    async fn list(&self, dir: &str) -> Result<Vec<PathEntry>, ProviderError> {
        let path = if dir.starts_with('/') {
            PathBuf::from(dir)
        } else {
            self.root.join(dir)
        };
        let listing_error = |e: std::io::Error| ProviderError::PathListing {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let mut reader = tokio::fs::read_dir(&path).await.map_err(listing_error)?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(listing_error)? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(PathEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
            if entries.len() >= self.max_entries {
                debug!(path = %path.display(), "Directory listing truncated");
                break;
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// Completes file and directory names for arguments, and for a first word
/// that looks like a path.
pub struct FilesProvider {
    source: Arc<dyn PathSource>,
}

impl FilesProvider {
    pub fn new(source: Arc<dyn PathSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl CompletionProvider for FilesProvider {
    fn name(&self) -> &str {
        FILES_PROVIDER
    }

    fn priority(&self) -> i32 {
        25
    }

    fn can_complete(&self, ctx: &CompletionContext) -> bool {
        !ctx.current_word.starts_with('-')
            && (!ctx.is_command_position() || ctx.current_word.contains('/'))
    }

    async fn get_completions(
        &self,
        ctx: &CompletionContext,
        matcher: &Matcher,
    ) -> Result<Vec<CompletionSuggestion>, ProviderError> {
        let word = ctx.current_word.as_str();
        let (dir, prefix) = match word.rfind('/') {
            Some(idx) => word.split_at(idx + 1),
            None => ("", word),
        };
        let show_hidden = prefix.starts_with('.');

        let entries = self.source.list(dir).await?;
        Ok(entries
            .into_iter()
            .filter(|e| show_hidden || !e.name.starts_with('.'))
            .filter(|e| matcher.matches(&e.name, prefix))
            .map(|e| {
                let priority = match_priority(matcher, &e.name, prefix);
                let (kind, suffix) = if e.is_dir {
                    (SuggestionKind::Directory, "/")
                } else {
                    (SuggestionKind::File, "")
                };
                CompletionSuggestion::new(format!("{dir}{}{suffix}", e.name), kind)
                    .with_priority(priority)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasTable;
    use crate::completion::rank_suggestions;
    use crate::history::{HistorySettings, HistoryStore};

    fn texts(s: &[CompletionSuggestion]) -> Vec<&str> {
        s.iter().map(|s| s.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_commands_on_empty_line() {
        let provider = CommandsProvider::new();
        let ctx = CompletionContext::parse("", 0);
        assert!(provider.can_complete(&ctx));
        let out = provider
            .get_completions(&ctx, &Matcher::default())
            .await
            .unwrap();
        assert_eq!(out.len(), provider.command_count());
    }

    #[tokio::test]
    async fn test_commands_prefix_ranked_high() {
        let provider = CommandsProvider::new();
        let ctx = CompletionContext::parse("gi", 2);
        let out = provider
            .get_completions(&ctx, &Matcher::default())
            .await
            .unwrap();
        let git = out.iter().find(|s| s.text == "git").unwrap();
        assert_eq!(git.priority, Priority::High);
        assert_eq!(git.kind, SuggestionKind::Command);
        assert!(git.description.is_some());
    }

    #[tokio::test]
    async fn test_commands_include_aliases_and_extra_names() {
        let aliases = AliasTable::with_defaults().into_shared();
        let provider = CommandsProvider::new().with_aliases(aliases);
        provider.add_commands([("history-search", Some("Search history".to_string()))]);
        let ctx = CompletionContext::parse("g", 1);
        let out = provider
            .get_completions(&ctx, &Matcher::new(false, false))
            .await
            .unwrap();
        assert!(out.iter().any(|s| s.text == "gs" && s.kind == SuggestionKind::Alias));

        let ctx = CompletionContext::parse("history-s", 9);
        let out = provider
            .get_completions(&ctx, &Matcher::new(false, false))
            .await
            .unwrap();
        assert_eq!(texts(&out), vec!["history-search"]);
    }

    #[test]
    fn test_commands_only_first_word() {
        let provider = CommandsProvider::new();
        assert!(!provider.can_complete(&CompletionContext::parse("ls -", 4)));
    }

    #[tokio::test]
    async fn test_flags_for_known_command() {
        let provider = FlagsProvider::new();
        let ctx = CompletionContext::parse("ls --a", 6);
        assert!(provider.can_complete(&ctx));
        let out = provider
            .get_completions(&ctx, &Matcher::new(false, false))
            .await
            .unwrap();
        assert_eq!(texts(&out), vec!["--all"]);
        assert_eq!(out[0].kind, SuggestionKind::Option);
    }

    #[test]
    fn test_flags_skip_unknown_command_and_plain_words() {
        let provider = FlagsProvider::new();
        assert!(!provider.can_complete(&CompletionContext::parse("frobnicate -", 12)));
        assert!(!provider.can_complete(&CompletionContext::parse("ls foo", 6)));
    }

    #[tokio::test]
    async fn test_git_subcommands() {
        let provider = FlagsProvider::new();
        let ctx = CompletionContext::parse("git st", 6);
        assert!(provider.can_complete(&ctx));
        let out = provider
            .get_completions(&ctx, &Matcher::new(false, false))
            .await
            .unwrap();
        assert_eq!(texts(&out), vec!["stash", "status"]);
    }

    #[tokio::test]
    async fn test_history_provider_matches_line_prefix() {
        let history = HistoryStore::new(HistorySettings::default()).into_shared();
        {
            let mut h = history.write().unwrap();
            h.add_command("git status", Some("s1"));
            h.add_command("git log --oneline", Some("s1"));
            h.add_command("ls -la", Some("s1"));
        }
        let provider = HistoryProvider::new(history);
        let ctx = CompletionContext::parse("git ", 4).with_session(Some("s1"));
        assert!(provider.can_complete(&ctx));
        let out = provider
            .get_completions(&ctx, &Matcher::default())
            .await
            .unwrap();
        assert_eq!(texts(&out), vec!["git log --oneline", "git status"]);
        assert!(out.iter().all(|s| s.kind == SuggestionKind::History));
    }

    #[tokio::test]
    async fn test_history_provider_follows_fuzzy_setting() {
        let history = HistoryStore::default().into_shared();
        {
            let mut h = history.write().unwrap();
            h.add_command("git checkout main", Some("s1"));
            h.add_command("gcc -o app main.c", Some("s1"));
            h.add_command("ls -la", Some("s1"));
        }
        let provider = HistoryProvider::new(history);
        let ctx = CompletionContext::parse("gc", 2).with_session(Some("s1"));

        let fuzzy = provider
            .get_completions(&ctx, &Matcher::new(true, false))
            .await
            .unwrap();
        let ranked = rank_suggestions(fuzzy, 10);
        assert_eq!(texts(&ranked), vec!["gcc -o app main.c", "git checkout main"]);
        assert_eq!(ranked[0].priority, Priority::Low);

        let prefix_only = provider
            .get_completions(&ctx, &Matcher::new(false, false))
            .await
            .unwrap();
        assert_eq!(texts(&prefix_only), vec!["gcc -o app main.c"]);
    }

    #[test]
    fn test_history_provider_min_characters() {
        let history = HistoryStore::default().into_shared();
        let provider = HistoryProvider::new(history).with_min_characters(3);
        assert!(!provider.can_complete(&CompletionContext::parse("gi", 2)));
        assert!(provider.can_complete(&CompletionContext::parse("git", 3)));
        assert!(!provider.can_complete(&CompletionContext::parse("", 0)));
    }

    #[tokio::test]
    async fn test_static_path_source_tree() {
        let source = StaticPathSource::from_paths(["src/main.rs", "src/lib.rs", "Cargo.toml", "docs/"]);
        let root = source.list("").await.unwrap();
        assert_eq!(
            root,
            vec![
                PathEntry { name: "Cargo.toml".into(), is_dir: false },
                PathEntry { name: "docs".into(), is_dir: true },
                PathEntry { name: "src".into(), is_dir: true },
            ]
        );
        assert_eq!(source.list("src/").await.unwrap().len(), 2);
        assert!(source.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_files_provider_completes_nested_paths() {
        let source = Arc::new(StaticPathSource::from_paths(["src/main.rs", "src/bin/", ".env"]));
        let provider = FilesProvider::new(source);
        let ctx = CompletionContext::parse("cat src/m", 9);
        assert!(provider.can_complete(&ctx));
        let out = provider
            .get_completions(&ctx, &Matcher::new(false, false))
            .await
            .unwrap();
        assert_eq!(texts(&out), vec!["src/main.rs"]);
        assert_eq!(out[0].kind, SuggestionKind::File);

        let ctx = CompletionContext::parse("cd src/", 7);
        let out = provider
            .get_completions(&ctx, &Matcher::default())
            .await
            .unwrap();
        assert_eq!(texts(&out), vec!["src/bin/", "src/main.rs"]);
        assert_eq!(out[0].kind, SuggestionKind::Directory);
    }

    #[tokio::test]
    async fn test_files_provider_hides_dotfiles_unless_asked() {
        let source = Arc::new(StaticPathSource::from_paths([".env", "README.md"]));
        let provider = FilesProvider::new(source);
        let out = provider
            .get_completions(&CompletionContext::parse("cat ", 4), &Matcher::default())
            .await
            .unwrap();
        assert_eq!(texts(&out), vec!["README.md"]);
        let out = provider
            .get_completions(&CompletionContext::parse("cat .", 5), &Matcher::new(false, false))
            .await
            .unwrap();
        assert_eq!(texts(&out), vec![".env"]);
    }

    #[tokio::test]
    async fn test_local_path_source_lists_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("logs")).unwrap();
        let source = LocalPathSource::new(dir.path());
        let entries = source.list("").await.unwrap();
        assert_eq!(
            entries,
            vec![
                PathEntry { name: "logs".into(), is_dir: true },
                PathEntry { name: "notes.txt".into(), is_dir: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_local_path_source_missing_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalPathSource::new(dir.path());
        let err = source.list("nope/").await.unwrap_err();
        assert!(matches!(err, ProviderError::PathListing { .. }));
    }
}
