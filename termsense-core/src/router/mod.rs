//! Per-line routing between local commands and the remote shell.
//!
//! Every submitted line passes through the same pipeline:
//!
//! 1. **Alias check**: the first word is looked up in the alias table and
//!    expanded once.
//! 2. **Dispatch**: if the (expanded) first word names a local command its
//!    handler runs and writes to the caller's [`OutputSink`]; otherwise the
//!    line is returned for forwarding to the remote shell.
//! 3. **Record**: the non-empty line is added to the session history.

pub mod builtins;
pub mod output;

pub use output::{BufferedOutput, NullOutput, OutputLine, OutputSink};

use crate::alias::{Expansion, SharedAliases};
use crate::error::CommandError;
use crate::history::SharedHistory;
use crate::tokenizer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Record the alias expansion instead of the typed line for forwarded
    /// commands.
    pub record_expanded: bool,
}

/// Help metadata for a local command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub usage: String,
    pub description: String,
}

/// A command executed client-side instead of being sent to the remote shell.
#[async_trait]
pub trait LocalCommand: Send + Sync {
    fn name(&self) -> &str;

    /// Usage pattern, e.g. `unalias <name>`.
    fn usage(&self) -> &str;

    /// One-line description shown by `local-help`.
    fn description(&self) -> &str;

    async fn execute(
        &self,
        args: &[String],
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError>;
}

/// What a local command handler can reach.
pub struct CommandContext<'a> {
    pub session_id: &'a str,
    pub history: &'a SharedHistory,
    pub aliases: &'a SharedAliases,
    /// Every registered local command, sorted by name.
    pub commands: &'a [CommandInfo],
    pub output: &'a mut dyn OutputSink,
}

/// How a line was routed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    pub handled_locally: bool,
    /// Text to send to the remote shell; `None` when handled locally.
    pub forward_line: Option<String>,
    pub expansion: Option<Expansion>,
    /// The caller should confirm the expanded line before forwarding it.
    pub needs_confirmation: bool,
}

pub struct CommandRouter {
    history: SharedHistory,
    aliases: SharedAliases,
    settings: RwLock<RouterSettings>,
    commands: RwLock<HashMap<String, Arc<dyn LocalCommand>>>,
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("commands", &self.command_names())
            .finish()
    }
}

impl CommandRouter {
    /// Router with the built-in local commands registered.
    pub fn new(history: SharedHistory, aliases: SharedAliases, settings: RouterSettings) -> Self {
        let router = Self::without_builtins(history, aliases, settings);
        builtins::register_all(&router);
        router
    }

    /// Router with an empty local command registry.
    pub fn without_builtins(
        history: SharedHistory,
        aliases: SharedAliases,
        settings: RouterSettings,
    ) -> Self {
        Self {
            history,
            aliases,
            settings: RwLock::new(settings),
            commands: RwLock::new(HashMap::new()),
        }
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    pub fn aliases(&self) -> &SharedAliases {
        &self.aliases
    }

    pub fn settings(&self) -> RouterSettings {
        self.settings
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn update_settings(&self, settings: RouterSettings) {
        let mut current = self.settings.write().unwrap_or_else(|p| p.into_inner());
        *current = settings;
    }

    // ── Registry ─────────────────────────────────────────────────────────

    /// Register `command`, replacing one with the same name.
    pub fn register_command(&self, command: Arc<dyn LocalCommand>) {
        let name = command.name().to_string();
        debug!(command = %name, "Registered local command");
        self.commands
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(name, command);
    }

    /// Remove a local command. Returns whether it existed.
    pub fn unregister_command(&self, name: &str) -> bool {
        let removed = self
            .commands
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(name)
            .is_some();
        if removed {
            debug!(command = %name, "Unregistered local command");
        }
        removed
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.commands
            .read()
            .map(|c| c.contains_key(name))
            .unwrap_or(false)
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands().into_iter().map(|c| c.name).collect()
    }

    /// Help metadata for every local command, sorted by name.
    pub fn commands(&self) -> Vec<CommandInfo> {
        let mut infos: Vec<CommandInfo> = self
            .commands
            .read()
            .map(|c| {
                c.values()
                    .map(|cmd| CommandInfo {
                        name: cmd.name().to_string(),
                        usage: cmd.usage().to_string(),
                        description: cmd.description().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    fn lookup(&self, name: &str) -> Option<Arc<dyn LocalCommand>> {
        self.commands.read().ok()?.get(name).cloned()
    }

    // ── Routing ──────────────────────────────────────────────────────────

    /// Route one submitted line for `session_id`.
    pub async fn route(
        &self,
        line: &str,
        session_id: &str,
        output: &mut dyn OutputSink,
    ) -> RouteOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return RouteOutcome {
                forward_line: Some(String::new()),
                ..Default::default()
            };
        }

        let (expansion, show_expansion, confirm) = {
            let mut aliases = self.aliases.write().unwrap_or_else(|p| p.into_inner());
            let settings = aliases.settings().clone();
            (
                aliases.expand_command(trimmed),
                settings.show_expansion,
                settings.confirm_expansion,
            )
        };
        let effective = expansion
            .as_ref()
            .map(|e| e.expanded_command.clone())
            .unwrap_or_else(|| trimmed.to_string());
        if let Some(e) = &expansion {
            debug!(alias = %e.alias_name, expanded = %e.expanded_command, "Expanded alias");
            if show_expansion {
                output.write_line(&format!("{} → {}", e.alias_name, e.expanded_command));
            }
        }

        let parsed = tokenizer::split(&effective);
        let handler = parsed.first().and_then(|t| self.lookup(&t.text));

        let outcome = match handler {
            Some(handler) => {
                let args: Vec<String> = parsed.into_iter().skip(1).map(|t| t.text).collect();
                let commands = self.commands();
                let mut ctx = CommandContext {
                    session_id,
                    history: &self.history,
                    aliases: &self.aliases,
                    commands: &commands,
                    output: &mut *output,
                };
                info!(command = %handler.name(), session = %session_id, "Running local command");
                if let Err(e) = handler.execute(&args, &mut ctx).await {
                    warn!(command = %handler.name(), error = %e, "Local command failed");
                    output.write_error(&format!("{}: {e}", handler.name()));
                }
                RouteOutcome {
                    handled_locally: true,
                    forward_line: None,
                    expansion,
                    needs_confirmation: false,
                }
            }
            None => {
                let needs_confirmation = confirm && expansion.is_some();
                RouteOutcome {
                    handled_locally: false,
                    forward_line: Some(effective.clone()),
                    expansion,
                    needs_confirmation,
                }
            }
        };

        let recorded = if !outcome.handled_locally && self.settings().record_expanded {
            effective.as_str()
        } else {
            trimmed
        };
        {
            let mut history = self.history.write().unwrap_or_else(|p| p.into_inner());
            history.add_command(recorded, Some(session_id));
            history.reset_cursor(Some(session_id));
        }
        outcome
    }

    /// Route `line` and report whether it was handled locally.
    pub async fn process_command(
        &self,
        line: &str,
        session_id: &str,
        output: &mut dyn OutputSink,
    ) -> bool {
        self.route(line, session_id, output).await.handled_locally
    }

    /// Closest local command name to `input`, for "did you mean" hints.
    pub fn suggest(&self, input: &str) -> Option<String> {
        self.command_names()
            .into_iter()
            .map(|name| (edit_distance(input, &name), name))
            .filter(|(dist, _)| *dist <= 3)
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, name)| name)
    }
}

/// Formatted listing of `commands` for `local-help`.
pub fn help_text(commands: &[CommandInfo]) -> String {
    let mut output = String::from("Local commands:\n");
    for cmd in commands {
        output.push_str(&format!("  {:<32} {}\n", cmd.usage, cmd.description));
    }
    output.push_str("\nEverything else is sent to the remote shell.");
    output
}

/// Levenshtein distance over bytes.
fn edit_distance(a: &str, b: &str) -> usize {
    let a = a.as_bytes();
    let b = b.as_bytes();

    let mut prev = (0..=b.len()).collect::<Vec<_>>();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
