//! CLI subcommand handlers.

use crate::AliasAction;
use crate::Commands;
use crate::ConfigAction;
use crate::HistoryAction;
use std::path::Path;
use termsense_core::config::{WORKSPACE_DIR, save_workspace_config};
use termsense_core::{Engine, EngineConfig, ImportMode, SearchQuery};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    engine: &Engine,
    session_id: &str,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, engine.config(), workspace),
        Commands::History { action } => handle_history(action, engine, session_id),
        Commands::Alias { action } => handle_alias(action, engine),
        Commands::Complete { line, cursor, json } => {
            let cursor = cursor.unwrap_or_else(|| line.chars().count());
            let suggestions = engine.complete(session_id, &line, cursor).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&suggestions)?);
            } else {
                for s in &suggestions {
                    match &s.description {
                        Some(desc) => println!("{}\t{}", s.text, desc),
                        None => println!("{}", s.text),
                    }
                }
            }
            Ok(())
        }
    }
}

fn handle_config(action: ConfigAction, config: &EngineConfig, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace.join(WORKSPACE_DIR).join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let path = save_workspace_config(workspace, &EngineConfig::default())?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

fn handle_history(action: HistoryAction, engine: &Engine, session_id: &str) -> anyhow::Result<()> {
    match action {
        HistoryAction::Search {
            query,
            global,
            case_sensitive,
            limit,
        } => {
            let mut search = SearchQuery::new(&query)
                .case_sensitive(case_sensitive)
                .limit(limit);
            search = if global {
                search.global()
            } else {
                search.in_session(session_id)
            };
            let history = engine.history().read().unwrap_or_else(|p| p.into_inner());
            let results = history.search_history(&search);
            if results.is_empty() {
                println!("No matches for '{}'", query);
            }
            for r in results {
                println!(
                    "{}  [{}]  {}",
                    r.entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    r.entry.session_id,
                    r.entry.command
                );
            }
            Ok(())
        }
        HistoryAction::Stats => {
            let stats = engine
                .history()
                .read()
                .unwrap_or_else(|p| p.into_inner())
                .statistics();
            println!("Commands:  {}", stats.total_commands);
            println!("Unique:    {}", stats.unique_commands);
            println!("Sessions:  {}", stats.session_count);
            println!("Favorites: {}", stats.favorites);
            if !stats.top_commands.is_empty() {
                println!("\nMost used:");
                for (command, count) in &stats.top_commands {
                    println!("  {:>5}  {}", count, command);
                }
            }
            Ok(())
        }
        HistoryAction::Export { output } => {
            let json = engine
                .history()
                .read()
                .unwrap_or_else(|p| p.into_inner())
                .export_json()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Exported history to {}", path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }
        HistoryAction::Import { path, replace } => {
            let json = std::fs::read_to_string(&path)?;
            let mode = if replace {
                ImportMode::Replace
            } else {
                ImportMode::Merge
            };
            engine
                .history()
                .write()
                .unwrap_or_else(|p| p.into_inner())
                .try_import_json(&json, mode)
                .map_err(|e| anyhow::anyhow!("Cannot import '{}': {}", path.display(), e))?;
            println!("Imported history from {}", path.display());
            Ok(())
        }
        HistoryAction::Clear { all } => {
            let mut history = engine.history().write().unwrap_or_else(|p| p.into_inner());
            if all {
                history.clear_history(None);
                println!("Cleared all history");
            } else {
                history.clear_history(Some(session_id));
                println!("Cleared history for session {}", session_id);
            }
            Ok(())
        }
    }
}

fn handle_alias(action: AliasAction, engine: &Engine) -> anyhow::Result<()> {
    let mut aliases = engine.aliases().write().unwrap_or_else(|p| p.into_inner());
    match action {
        AliasAction::List => {
            let all = aliases.all_aliases();
            if all.is_empty() {
                println!("No aliases defined");
            }
            for alias in all {
                match &alias.description {
                    Some(desc) => println!(
                        "  {:<12} = {:<30} {}",
                        alias.name, alias.command_template, desc
                    ),
                    None => println!("  {:<12} = {}", alias.name, alias.command_template),
                }
            }
            Ok(())
        }
        AliasAction::Add { name, template } => {
            let alias = aliases.create_alias(&name, &template.join(" "))?;
            println!("Defined alias {} = {}", alias.name, alias.command_template);
            Ok(())
        }
        AliasAction::Remove { name } => {
            if !aliases.delete_alias(&name) {
                anyhow::bail!("No alias named '{}'", name);
            }
            println!("Removed alias {}", name);
            Ok(())
        }
    }
}
