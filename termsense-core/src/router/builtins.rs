//! Local commands available in every session.

use super::{CommandContext, CommandRouter, LocalCommand, help_text};
use crate::alias::{Alias, AliasTable, quote_arg};
use crate::error::{AliasError, CommandError};
use crate::history::{HistoryStore, SearchQuery};
use async_trait::async_trait;
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

const DEFAULT_LIST_LEN: usize = 20;

/// Register every built-in command on `router`.
pub fn register_all(router: &CommandRouter) {
    router.register_command(Arc::new(HistoryCommand));
    router.register_command(Arc::new(HistoryClearCommand));
    router.register_command(Arc::new(HistorySearchCommand));
    router.register_command(Arc::new(AliasCommand));
    router.register_command(Arc::new(UnaliasCommand));
    router.register_command(Arc::new(AliasesCommand));
    router.register_command(Arc::new(LocalHelpCommand));
}

fn poisoned(command: &str) -> CommandError {
    CommandError::ExecutionFailed {
        command: command.to_string(),
        message: "state lock poisoned".to_string(),
    }
}

fn read_history<'a>(
    ctx: &'a CommandContext<'_>,
    command: &str,
) -> Result<RwLockReadGuard<'a, HistoryStore>, CommandError> {
    ctx.history.read().map_err(|_| poisoned(command))
}

fn write_history<'a>(
    ctx: &'a CommandContext<'_>,
    command: &str,
) -> Result<RwLockWriteGuard<'a, HistoryStore>, CommandError> {
    ctx.history.write().map_err(|_| poisoned(command))
}

fn write_aliases<'a>(
    ctx: &'a CommandContext<'_>,
    command: &str,
) -> Result<RwLockWriteGuard<'a, AliasTable>, CommandError> {
    ctx.aliases.write().map_err(|_| poisoned(command))
}

fn parse_count(arg: &str) -> Result<usize, CommandError> {
    arg.parse().map_err(|_| CommandError::InvalidArgument {
        argument: arg.to_string(),
        reason: "expected a positive number".to_string(),
    })
}

fn format_alias(alias: &Alias) -> String {
    format!("  {:<12} = {}", alias.name, alias.command_template)
}

fn list_aliases(ctx: &mut CommandContext<'_>, command: &str) -> Result<(), CommandError> {
    let lines: Vec<String> = {
        let table = ctx.aliases.read().map_err(|_| poisoned(command))?;
        table.all_aliases().into_iter().map(format_alias).collect()
    };
    if lines.is_empty() {
        ctx.output.write_line("No aliases defined");
    }
    for line in lines {
        ctx.output.write_line(&line);
    }
    Ok(())
}

// ── history ──────────────────────────────────────────────────────────────

/// `history [--global] [n]`: list recent commands, oldest first.
pub struct HistoryCommand;

#[async_trait]
impl LocalCommand for HistoryCommand {
    fn name(&self) -> &str {
        "history"
    }

    fn usage(&self) -> &str {
        "history [--global] [n]"
    }

    fn description(&self) -> &str {
        "Show the last n commands of this session"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let mut global = false;
        let mut count = DEFAULT_LIST_LEN;
        for arg in args {
            match arg.as_str() {
                "--global" | "-g" => global = true,
                other => count = parse_count(other)?,
            }
        }

        let lines: Vec<String> = {
            let history = read_history(ctx, self.name())?;
            let commands: Vec<&str> = if global {
                history
                    .global_history()
                    .iter()
                    .map(|e| e.command.as_str())
                    .collect()
            } else {
                history
                    .session(ctx.session_id)
                    .map(|s| s.entries().iter().map(|e| e.command.as_str()).collect())
                    .unwrap_or_default()
            };
            let skip = commands.len().saturating_sub(count);
            commands
                .iter()
                .enumerate()
                .skip(skip)
                .map(|(i, cmd)| format!("{:>5}  {cmd}", i + 1))
                .collect()
        };

        if lines.is_empty() {
            ctx.output.write_line("No history yet");
        }
        for line in lines {
            ctx.output.write_line(&line);
        }
        Ok(())
    }
}

// ── history-clear ────────────────────────────────────────────────────────

/// `history-clear [--all]`
pub struct HistoryClearCommand;

#[async_trait]
impl LocalCommand for HistoryClearCommand {
    fn name(&self) -> &str {
        "history-clear"
    }

    fn usage(&self) -> &str {
        "history-clear [--all]"
    }

    fn description(&self) -> &str {
        "Clear this session's history, or everything with --all"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let all = match args {
            [] => false,
            [flag] if flag == "--all" => true,
            _ => {
                return Err(CommandError::Usage {
                    usage: self.usage().to_string(),
                });
            }
        };
        {
            let mut history = write_history(ctx, self.name())?;
            if all {
                history.clear_history(None);
            } else {
                history.clear_history(Some(ctx.session_id));
            }
        }
        if all {
            ctx.output.write_line("Cleared all history");
        } else {
            let message = format!("Cleared history for session {}", ctx.session_id);
            ctx.output.write_line(&message);
        }
        Ok(())
    }
}

// ── history-search ───────────────────────────────────────────────────────

/// `history-search [--global] [--case-sensitive] [--limit n] <query>`
pub struct HistorySearchCommand;

#[async_trait]
impl LocalCommand for HistorySearchCommand {
    fn name(&self) -> &str {
        "history-search"
    }

    fn usage(&self) -> &str {
        "history-search [--global] [--case-sensitive] [--limit n] <query>"
    }

    fn description(&self) -> &str {
        "Search recorded commands, newest first"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let mut words = Vec::new();
        let mut query = SearchQuery::default().in_session(ctx.session_id);
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--global" | "-g" => query = query.global(),
                "--case-sensitive" | "-c" => query = query.case_sensitive(true),
                "--limit" | "-n" => {
                    let value = iter.next().ok_or_else(|| CommandError::Usage {
                        usage: self.usage().to_string(),
                    })?;
                    query = query.limit(parse_count(value)?);
                }
                word => words.push(word),
            }
        }
        if words.is_empty() {
            return Err(CommandError::Usage {
                usage: self.usage().to_string(),
            });
        }
        query.query = words.join(" ");

        let lines: Vec<String> = {
            let history = read_history(ctx, self.name())?;
            history
                .search_history(&query)
                .into_iter()
                .map(|r| format!("  {}", r.entry.command))
                .collect()
        };

        if lines.is_empty() {
            let message = format!("No matches for '{}'", query.query);
            ctx.output.write_line(&message);
        }
        for line in lines {
            ctx.output.write_line(&line);
        }
        Ok(())
    }
}

// ── alias ────────────────────────────────────────────────────────────────

/// `alias`, `alias name`, `alias name=template` or `alias name template...`
pub struct AliasCommand;

#[async_trait]
impl LocalCommand for AliasCommand {
    fn name(&self) -> &str {
        "alias"
    }

    fn usage(&self) -> &str {
        "alias [name[=template] | name template...]"
    }

    fn description(&self) -> &str {
        "List, show or define aliases"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let (name, template) = match args {
            [] => return list_aliases(ctx, self.name()),
            [single] if !single.contains('=') => {
                let line = {
                    let table = ctx.aliases.read().map_err(|_| poisoned(self.name()))?;
                    table.get_alias(single).map(format_alias)
                };
                let line = line.ok_or_else(|| AliasError::NotFound {
                    name: single.clone(),
                })?;
                ctx.output.write_line(&line);
                return Ok(());
            }
            [first, rest @ ..] => match first.split_once('=') {
                Some((name, head)) => {
                    let mut parts = vec![head.to_string()];
                    parts.extend(rest.iter().map(|a| quote_arg(a)));
                    (name.to_string(), parts.join(" ").trim().to_string())
                }
                None => (first.clone(), join_quoted(rest)),
            },
        };

        let alias = write_aliases(ctx, self.name())?.create_alias(&name, &template)?;
        let message = format!("Defined alias {} = {}", alias.name, alias.command_template);
        ctx.output.write_line(&message);
        Ok(())
    }
}

fn join_quoted(words: &[String]) -> String {
    words
        .iter()
        .map(|w| quote_arg(w))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── unalias ──────────────────────────────────────────────────────────────

/// `unalias <name>`
pub struct UnaliasCommand;

#[async_trait]
impl LocalCommand for UnaliasCommand {
    fn name(&self) -> &str {
        "unalias"
    }

    fn usage(&self) -> &str {
        "unalias <name>"
    }

    fn description(&self) -> &str {
        "Remove an alias"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let [name] = args else {
            return Err(CommandError::Usage {
                usage: self.usage().to_string(),
            });
        };
        let removed = write_aliases(ctx, self.name())?.delete_alias(name);
        if !removed {
            return Err(AliasError::NotFound { name: name.clone() }.into());
        }
        let message = format!("Removed alias {name}");
        ctx.output.write_line(&message);
        Ok(())
    }
}

// ── aliases ──────────────────────────────────────────────────────────────

pub struct AliasesCommand;

#[async_trait]
impl LocalCommand for AliasesCommand {
    fn name(&self) -> &str {
        "aliases"
    }

    fn usage(&self) -> &str {
        "aliases"
    }

    fn description(&self) -> &str {
        "List all aliases"
    }

    async fn execute(
        &self,
        _args: &[String],
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        list_aliases(ctx, self.name())
    }
}

// ── local-help ───────────────────────────────────────────────────────────

/// `local-help [command]`
pub struct LocalHelpCommand;

#[async_trait]
impl LocalCommand for LocalHelpCommand {
    fn name(&self) -> &str {
        "local-help"
    }

    fn usage(&self) -> &str {
        "local-help [command]"
    }

    fn description(&self) -> &str {
        "Describe the commands handled locally"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let Some(topic) = args.first() else {
            for line in help_text(ctx.commands).lines() {
                ctx.output.write_line(line);
            }
            return Ok(());
        };
        match ctx.commands.iter().find(|c| &c.name == topic) {
            Some(info) => {
                let usage = format!("Usage: {}", info.usage);
                let description = info.description.clone();
                ctx.output.write_line(&usage);
                ctx.output.write_line(&description);
                Ok(())
            }
            None => Err(CommandError::InvalidArgument {
                argument: topic.clone(),
                reason: "not a local command".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::router::{BufferedOutput, CommandRouter, NullOutput, RouterSettings};
    use crate::alias::AliasTable;
    use crate::history::{HistorySettings, HistoryStore};

    fn router() -> CommandRouter {
        CommandRouter::new(
            HistoryStore::new(HistorySettings::default()).into_shared(),
            AliasTable::default().into_shared(),
            RouterSettings::default(),
        )
    }

    async fn run(router: &CommandRouter, line: &str) -> BufferedOutput {
        let mut out = BufferedOutput::new();
        assert!(router.process_command(line, "s1", &mut out).await);
        out
    }

    async fn submit(router: &CommandRouter, lines: &[&str]) {
        for line in lines {
            router.route(line, "s1", &mut NullOutput).await;
        }
    }

    #[tokio::test]
    async fn test_history_lists_session_commands() {
        let router = router();
        submit(&router, &["ls", "pwd", "whoami"]).await;
        let out = run(&router, "history 2").await;
        assert_eq!(out.text(), "    2  pwd\n    3  whoami");
    }

    #[tokio::test]
    async fn test_history_empty_session() {
        let router = router();
        let out = run(&router, "history").await;
        assert_eq!(out.text(), "No history yet");
    }

    #[tokio::test]
    async fn test_history_rejects_bad_count() {
        let router = router();
        let out = run(&router, "history lots").await;
        assert_eq!(
            out.errors(),
            vec!["history: Invalid argument 'lots': expected a positive number"]
        );
    }

    #[tokio::test]
    async fn test_history_clear_session() {
        let router = router();
        submit(&router, &["ls", "pwd"]).await;
        let out = run(&router, "history-clear").await;
        assert_eq!(out.text(), "Cleared history for session s1");
        let history = router.history().read().unwrap();
        let commands: Vec<&str> = history
            .session("s1")
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.command.as_str())
            .collect();
        assert_eq!(commands, vec!["history-clear"]);
    }

    #[tokio::test]
    async fn test_history_clear_usage() {
        let router = router();
        let out = run(&router, "history-clear --bogus").await;
        assert_eq!(
            out.errors(),
            vec!["history-clear: Usage: history-clear [--all]"]
        );
    }

    #[tokio::test]
    async fn test_history_search_newest_first() {
        let router = router();
        submit(&router, &["git status", "ls", "git log"]).await;
        let out = run(&router, "history-search git").await;
        assert_eq!(out.text(), "  git log\n  git status");
    }

    #[tokio::test]
    async fn test_history_search_limit_and_no_match() {
        let router = router();
        submit(&router, &["git status", "git log"]).await;
        let out = run(&router, "history-search --limit 1 git").await;
        assert_eq!(out.text(), "  git log");
        let out = run(&router, "history-search docker").await;
        assert_eq!(out.text(), "No matches for 'docker'");
    }

    #[tokio::test]
    async fn test_history_search_requires_query() {
        let router = router();
        let out = run(&router, "history-search").await;
        assert_eq!(out.errors().len(), 1);
        assert!(out.errors()[0].starts_with("history-search: Usage:"));
    }

    #[tokio::test]
    async fn test_alias_define_forms() {
        let router = router();
        run(&router, "alias ll='ls -la'").await;
        run(&router, "alias gl git log --oneline").await;
        let table = router.aliases().read().unwrap();
        assert_eq!(table.get_alias("ll").unwrap().command_template, "ls -la");
        assert_eq!(
            table.get_alias("gl").unwrap().command_template,
            "git log --oneline"
        );
    }

    #[tokio::test]
    async fn test_alias_template_keeps_quoted_words() {
        let router = router();
        run(&router, r#"alias gc git commit -m "fix the bug""#).await;
        run(&router, r#"alias gm=git commit -m 'say "hi"'"#).await;
        let table = router.aliases().read().unwrap();
        assert_eq!(
            table.get_alias("gc").unwrap().command_template,
            r#"git commit -m "fix the bug""#
        );
        assert_eq!(
            table.get_alias("gm").unwrap().command_template,
            r#"git commit -m 'say "hi"'"#
        );
    }

    #[tokio::test]
    async fn test_alias_show_and_missing() {
        let router = router();
        run(&router, "alias ll='ls -la'").await;
        let out = run(&router, "alias ll").await;
        assert_eq!(out.text(), "  ll           = ls -la");
        let out = run(&router, "alias nope").await;
        assert_eq!(out.errors(), vec!["alias: Alias not found: nope"]);
    }

    #[tokio::test]
    async fn test_alias_invalid_name_reported() {
        let router = router();
        let out = run(&router, "alias =ls").await;
        assert_eq!(out.errors().len(), 1);
        assert!(router.aliases().read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unalias() {
        let router = router();
        run(&router, "alias ll='ls -la'").await;
        let out = run(&router, "unalias ll").await;
        assert_eq!(out.text(), "Removed alias ll");
        let out = run(&router, "unalias ll").await;
        assert_eq!(out.errors(), vec!["unalias: Alias not found: ll"]);
        let out = run(&router, "unalias").await;
        assert_eq!(out.errors(), vec!["unalias: Usage: unalias <name>"]);
    }

    #[tokio::test]
    async fn test_aliases_listing() {
        let router = router();
        let out = run(&router, "aliases").await;
        assert_eq!(out.text(), "No aliases defined");
        run(&router, "alias b=echo b").await;
        run(&router, "alias a=echo a").await;
        let out = run(&router, "aliases").await;
        assert_eq!(out.text(), "  a            = echo a\n  b            = echo b");
    }

    #[tokio::test]
    async fn test_local_help() {
        let router = router();
        let out = run(&router, "local-help").await;
        assert!(out.text().starts_with("Local commands:"));
        assert!(out.text().contains("unalias <name>"));
        let out = run(&router, "local-help unalias").await;
        assert_eq!(out.text(), "Usage: unalias <name>\nRemove an alias");
        let out = run(&router, "local-help nope").await;
        assert_eq!(out.errors().len(), 1);
    }
}
