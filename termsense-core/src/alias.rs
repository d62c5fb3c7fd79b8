//! Alias table: short names for longer command templates.
//!
//! Expansion is a single textual substitution of the first word of a line.
//! The result is never scanned again for alias names, so an alias whose
//! template starts with another alias cannot loop.
//!
//! Templates may reference arguments typed after the alias:
//! - `$1` .. `$9`: positional arguments
//! - `$@`: the raw remainder of the line
//! - `{name}`: the argument in the position of the declared parameter `name`
//!
//! A template without placeholders gets the remainder appended.

use crate::error::AliasError;
use crate::events::{EngineEvent, EventBus, SettingsPayload};
use crate::persistence::{self, KeyValueStore, SharedStore};
use crate::tokenizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Storage key for the alias map.
pub const ALIASES_KEY: &str = "aliases";
/// Storage key for alias settings.
pub const SETTINGS_KEY: &str = "aliases.settings";

/// Shared handle used by the router and completion providers.
pub type SharedAliases = Arc<RwLock<AliasTable>>;

/// A declared alias parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasParameter {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alias {
    pub name: String,
    pub command_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<AliasParameter>,
    #[serde(default)]
    pub use_count: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Alias {
    pub fn new(name: impl Into<String>, command_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_template: command_template.into(),
            description: None,
            parameters: Vec::new(),
            use_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, required: bool) -> Self {
        self.parameters.push(AliasParameter {
            name: name.into(),
            required,
            description: None,
        });
        self
    }
}

/// Alias behaviour settings.
///
/// `show_expansion` and `confirm_expansion` are hints for the caller; the
/// table expands regardless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasSettings {
    pub enabled: bool,
    /// Echo the expanded command before running it.
    pub show_expansion: bool,
    /// Ask the user before running an expanded command.
    pub confirm_expansion: bool,
    /// Install the stock aliases the first time a store is opened.
    pub seed_defaults: bool,
}

impl Default for AliasSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            show_expansion: true,
            confirm_expansion: false,
            seed_defaults: true,
        }
    }
}

/// Result of expanding a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub alias_name: String,
    pub expanded_command: String,
}

/// Name → alias mapping.
pub struct AliasTable {
    aliases: BTreeMap<String, Alias>,
    settings: AliasSettings,
    store: Option<SharedStore>,
    events: EventBus,
}

impl std::fmt::Debug for AliasTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasTable")
            .field("aliases", &self.aliases.len())
            .field("settings", &self.settings)
            .finish()
    }
}

fn default_aliases() -> Vec<Alias> {
    vec![
        Alias::new("ll", "ls -la").with_description("Long listing with hidden files"),
        Alias::new("la", "ls -A").with_description("List almost all entries"),
        Alias::new("..", "cd ..").with_description("Go to the parent directory"),
        Alias::new("gs", "git status").with_description("Git working tree status"),
    ]
}

fn validate_name(name: &str) -> Result<(), AliasError> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.chars().any(char::is_whitespace) {
        Some("contains whitespace")
    } else if name.contains(['=', '"', '\'']) {
        Some("contains '=' or quotes")
    } else if name.starts_with('-') {
        Some("starts with '-'")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(AliasError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Re-quote a word that would not survive whitespace splitting as one word.
pub(crate) fn quote_arg(arg: &str) -> String {
    if arg.contains('"') {
        format!("'{arg}'")
    } else if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '\'') {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}

/// Substitute `rest`/`args` into the alias template.
fn render(alias: &Alias, rest: &str, args: &[String]) -> Result<String, AliasError> {
    if let Some(missing) = alias
        .parameters
        .iter()
        .enumerate()
        .find(|(i, p)| p.required && args.get(*i).is_none())
    {
        return Err(AliasError::MissingParameter {
            name: alias.name.clone(),
            parameter: missing.1.name.clone(),
        });
    }

    let template = alias.command_template.as_str();
    let arg = |i: usize| args.get(i).map(|a| quote_arg(a)).unwrap_or_default();
    let mut out = String::with_capacity(template.len() + rest.len());
    let mut used_placeholder = false;
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '$' => match chars.peek().map(|(_, d)| *d) {
                Some(d @ '1'..='9') => {
                    chars.next();
                    let position = d.to_digit(10).map_or(0, |n| n as usize - 1);
                    out.push_str(&arg(position));
                    used_placeholder = true;
                }
                Some('@') => {
                    chars.next();
                    out.push_str(rest);
                    used_placeholder = true;
                }
                _ => out.push('$'),
            },
            '{' => {
                let close = template[i + 1..].find('}').map(|off| i + 1 + off);
                let position = close.and_then(|close| {
                    let name = &template[i + 1..close];
                    alias.parameters.iter().position(|p| p.name == name)
                });
                match (close, position) {
                    (Some(close), Some(pos)) => {
                        while chars.next_if(|(j, _)| *j <= close).is_some() {}
                        out.push_str(&arg(pos));
                        used_placeholder = true;
                    }
                    _ => out.push('{'),
                }
            }
            _ => out.push(c),
        }
    }

    if !used_placeholder && !rest.is_empty() {
        out.push(' ');
        out.push_str(rest);
    }
    Ok(out.trim_end().to_string())
}

impl AliasTable {
    /// Empty in-memory table.
    pub fn new(settings: AliasSettings) -> Self {
        Self {
            aliases: BTreeMap::new(),
            settings,
            store: None,
            events: EventBus::new(),
        }
    }

    /// In-memory table holding the stock aliases.
    pub fn with_defaults() -> Self {
        let mut table = Self::new(AliasSettings::default());
        table.install_defaults();
        table
    }

    /// Load aliases and settings from `store`.
    ///
    /// On first run (no alias map stored) the stock aliases are installed
    /// when `seed_defaults` is set.
    pub fn open(defaults: AliasSettings, store: SharedStore) -> Self {
        let settings = persistence::load_json::<AliasSettings>(store.as_ref(), SETTINGS_KEY)
            .unwrap_or(defaults);
        let mut table = Self::new(settings);

        let first_run = matches!(store.get(ALIASES_KEY), Ok(None));
        if let Some(aliases) =
            persistence::load_json::<BTreeMap<String, Alias>>(store.as_ref(), ALIASES_KEY)
        {
            table.aliases = aliases
                .into_iter()
                .filter(|(name, alias)| {
                    let ok = validate_name(name).is_ok() && name == &alias.name;
                    if !ok {
                        warn!(name = %name, "Dropping invalid persisted alias");
                    }
                    ok
                })
                .collect();
        }

        table.store = Some(store);
        if first_run && table.settings.seed_defaults {
            table.install_defaults();
        }
        debug!(count = table.aliases.len(), "Loaded aliases");
        table
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn into_shared(self) -> SharedAliases {
        Arc::new(RwLock::new(self))
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> &AliasSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: AliasSettings) {
        self.settings = settings;
        if let Some(store) = &self.store {
            persistence::save_json(store.as_ref(), SETTINGS_KEY, &self.settings);
        }
        self.events
            .emit(EngineEvent::SettingsChanged(SettingsPayload::Aliases(
                self.settings.clone(),
            )));
    }

    /// Add the stock aliases that are not already defined.
    pub fn install_defaults(&mut self) {
        for alias in default_aliases() {
            self.aliases.entry(alias.name.clone()).or_insert(alias);
        }
        self.changed();
    }

    /// Define or replace `name`.
    pub fn create_alias(
        &mut self,
        name: &str,
        command_template: &str,
    ) -> Result<Alias, AliasError> {
        self.create_alias_with(Alias::new(name, command_template))
    }

    /// Define or replace an alias with parameters and description.
    pub fn create_alias_with(&mut self, alias: Alias) -> Result<Alias, AliasError> {
        validate_name(&alias.name)?;
        if alias.command_template.trim().is_empty() {
            return Err(AliasError::EmptyTemplate { name: alias.name });
        }
        debug!(name = %alias.name, template = %alias.command_template, "Defining alias");
        self.aliases.insert(alias.name.clone(), alias.clone());
        self.changed();
        Ok(alias)
    }

    /// Remove `name`. Returns `false` if it was not defined.
    pub fn delete_alias(&mut self, name: &str) -> bool {
        let removed = self.aliases.remove(name).is_some();
        if removed {
            debug!(name, "Deleted alias");
            self.changed();
        }
        removed
    }

    pub fn get_alias(&self, name: &str) -> Option<&Alias> {
        self.aliases.get(name)
    }

    /// All aliases sorted by name.
    pub fn all_aliases(&self) -> Vec<&Alias> {
        self.aliases.values().collect()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// The `n` most used aliases, most used first.
    pub fn most_used(&self, n: usize) -> Vec<&Alias> {
        let mut aliases: Vec<&Alias> = self.aliases.values().collect();
        aliases.sort_by(|a, b| b.use_count.cmp(&a.use_count).then_with(|| a.name.cmp(&b.name)));
        aliases.truncate(n);
        aliases
    }

    /// Expand `line` if its first word names an alias.
    ///
    /// Returns `None` when aliases are disabled, the first word is not an
    /// alias, or a required parameter is missing.
    pub fn expand_command(&mut self, line: &str) -> Option<Expansion> {
        if !self.settings.enabled {
            return None;
        }
        let (name, rest) = tokenizer::first_word(line)?;
        let alias = self.aliases.get_mut(name)?;
        let args = tokenizer::split_args(rest);

        let expanded = match render(alias, rest, &args) {
            Ok(expanded) => expanded,
            Err(e) => {
                warn!(alias = name, error = %e, "Alias expansion skipped");
                return None;
            }
        };
        alias.use_count += 1;
        let expansion = Expansion {
            alias_name: alias.name.clone(),
            expanded_command: expanded,
        };
        self.persist();
        Some(expansion)
    }

    fn changed(&self) {
        self.persist();
        self.events.emit(EngineEvent::AliasesChanged(
            self.aliases.values().cloned().collect(),
        ));
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            persistence::save_json(store.as_ref(), ALIASES_KEY, &self.aliases);
        }
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new(AliasSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::persistence::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn expand(table: &mut AliasTable, line: &str) -> Option<String> {
        table.expand_command(line).map(|e| e.expanded_command)
    }

    #[test]
    fn test_simple_expansion() {
        let mut table = AliasTable::default();
        table.create_alias("ll", "ls -la").unwrap();
        let expansion = table.expand_command("ll").unwrap();
        assert_eq!(expansion.expanded_command, "ls -la");
        assert_eq!(expansion.alias_name, "ll");
        assert_eq!(table.get_alias("ll").unwrap().use_count, 1);
    }

    #[test]
    fn test_unknown_first_word_is_none() {
        let mut table = AliasTable::default();
        table.create_alias("ll", "ls -la").unwrap();
        assert!(table.expand_command("ls -la").is_none());
        assert!(table.expand_command("").is_none());
        assert!(table.expand_command("echo ll").is_none());
    }

    #[test]
    fn test_arguments_appended_without_placeholders() {
        let mut table = AliasTable::default();
        table.create_alias("ll", "ls -la").unwrap();
        assert_eq!(expand(&mut table, "ll /var/log").as_deref(), Some("ls -la /var/log"));
    }

    #[test]
    fn test_no_recursive_expansion() {
        let mut table = AliasTable::default();
        table.create_alias("a", "b --flag").unwrap();
        table.create_alias("b", "echo from-b").unwrap();
        assert_eq!(expand(&mut table, "a").as_deref(), Some("b --flag"));
    }

    #[test]
    fn test_self_referential_alias_terminates() {
        let mut table = AliasTable::default();
        table.create_alias("ls", "ls --color=auto").unwrap();
        assert_eq!(expand(&mut table, "ls -l").as_deref(), Some("ls --color=auto -l"));
    }

    #[test]
    fn test_positional_placeholders() {
        let mut table = AliasTable::default();
        table.create_alias("sshp", "ssh -p $2 $1").unwrap();
        assert_eq!(
            expand(&mut table, "sshp host.example 2222").as_deref(),
            Some("ssh -p 2222 host.example")
        );
    }

    #[test]
    fn test_all_args_placeholder_keeps_quotes() {
        let mut table = AliasTable::default();
        table.create_alias("gcm", "git commit -m $@").unwrap();
        assert_eq!(
            expand(&mut table, r#"gcm "fix login bug""#).as_deref(),
            Some(r#"git commit -m "fix login bug""#)
        );
    }

    #[test]
    fn test_named_parameters_and_literal_braces() {
        let mut table = AliasTable::default();
        table
            .create_alias_with(
                Alias::new("logs", "journalctl -u {unit} -n {lines} ${HOME}")
                    .with_parameter("unit", true)
                    .with_parameter("lines", false),
            )
            .unwrap();
        assert_eq!(
            expand(&mut table, "logs nginx 50").as_deref(),
            Some("journalctl -u nginx -n 50 ${HOME}")
        );
    }

    #[test]
    fn test_missing_required_parameter_skips_expansion() {
        let mut table = AliasTable::default();
        table
            .create_alias_with(Alias::new("svc", "systemctl status {unit}").with_parameter("unit", true))
            .unwrap();
        assert!(table.expand_command("svc").is_none());
        assert_eq!(table.get_alias("svc").unwrap().use_count, 0);
    }

    #[test]
    fn test_quoted_positional_argument_requoted() {
        let mut table = AliasTable::default();
        table.create_alias("f", "grep -r $1 .").unwrap();
        assert_eq!(
            expand(&mut table, r#"f "two words""#).as_deref(),
            Some(r#"grep -r "two words" ."#)
        );
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut table = AliasTable::default();
        assert!(matches!(
            table.create_alias("my alias", "ls"),
            Err(AliasError::InvalidName { .. })
        ));
        assert!(table.create_alias("a=b", "ls").is_err());
        assert!(table.create_alias("", "ls").is_err());
        assert!(matches!(
            table.create_alias("x", "   "),
            Err(AliasError::EmptyTemplate { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_delete_alias() {
        let mut table = AliasTable::default();
        table.create_alias("ll", "ls -la").unwrap();
        assert!(table.delete_alias("ll"));
        assert!(!table.delete_alias("ll"));
        assert!(table.expand_command("ll").is_none());
    }

    #[test]
    fn test_disabled_table_never_expands() {
        let mut table = AliasTable::with_defaults();
        table.update_settings(AliasSettings {
            enabled: false,
            ..Default::default()
        });
        assert!(table.expand_command("ll").is_none());
    }

    #[test]
    fn test_most_used() {
        let mut table = AliasTable::with_defaults();
        table.expand_command("gs");
        table.expand_command("gs");
        table.expand_command("ll");
        let top: Vec<&str> = table.most_used(2).iter().map(|a| a.name.as_str()).collect();
        assert_eq!(top, vec!["gs", "ll"]);
    }

    #[test]
    fn test_open_seeds_defaults_once() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        {
            let mut table = AliasTable::open(AliasSettings::default(), store.clone());
            assert!(table.get_alias("ll").is_some());
            table.delete_alias("ll");
        }
        let table = AliasTable::open(AliasSettings::default(), store);
        assert!(table.get_alias("ll").is_none());
        assert!(table.get_alias("gs").is_some());
    }

    #[test]
    fn test_open_corrupted_store_is_empty() {
        let store = MemoryStore::new();
        store.set(ALIASES_KEY, "not json").unwrap();
        let table = AliasTable::open(AliasSettings::default(), Arc::new(store));
        assert!(table.is_empty());
    }

    #[test]
    fn test_use_count_persisted() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        {
            let mut table = AliasTable::open(AliasSettings::default(), store.clone());
            table.expand_command("ll");
        }
        let table = AliasTable::open(AliasSettings::default(), store);
        assert_eq!(table.get_alias("ll").unwrap().use_count, 1);
    }

    #[test]
    fn test_aliases_changed_event() {
        let mut table = AliasTable::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = table
            .events()
            .subscribe(EventKind::AliasesChanged, move |event| {
                if let EngineEvent::AliasesChanged(all) = event {
                    h.fetch_add(all.len(), Ordering::SeqCst);
                }
            });
        table.create_alias("ll", "ls -la").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
