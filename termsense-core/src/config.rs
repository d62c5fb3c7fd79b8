//! Configuration system for Termsense.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/termsense/config.toml` and/or `.termsense/config.toml`
//! in the workspace directory.
//!
//! Settings changed at runtime through the stores are persisted separately
//! (see [`crate::persistence`]) and take precedence over these defaults.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::alias::AliasSettings;
use crate::completion::CompletionSettings;
use crate::error::ConfigError;
use crate::history::HistorySettings;
use crate::persistence;
use crate::router::RouterSettings;

/// Directory name for workspace-local configuration.
pub const WORKSPACE_DIR: &str = ".termsense";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history: HistorySettings,
    pub completion: CompletionSettings,
    pub aliases: AliasSettings,
    pub router: RouterSettings,
    pub storage: StorageConfig,
}

/// Where engine state is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persist history, aliases and settings. Memory only when `false`.
    pub enabled: bool,
    /// State directory. Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl StorageConfig {
    /// The state directory, or `None` when persistence is disabled or no
    /// home directory can be determined.
    pub fn resolve_dir(&self) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        self.dir
            .clone()
            .or_else(|| project_dirs().map(|d| d.data_dir().join("state")))
    }
}

/// Platform directories for Termsense.
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "termsense", "termsense")
}

impl EngineConfig {
    /// Reject settings the stores cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.max_entries == 0 {
            return Err(ConfigError::Invalid {
                message: "history.max_entries must be greater than 0".into(),
            });
        }
        if self.history.max_sessions == 0 {
            return Err(ConfigError::Invalid {
                message: "history.max_sessions must be greater than 0".into(),
            });
        }
        if self.completion.max_suggestions == 0 {
            return Err(ConfigError::Invalid {
                message: "completion.max_suggestions must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `TERMSENSE_`)
/// 3. Workspace-local config (`.termsense/config.toml`)
/// 4. User config (`~/.config/termsense/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&EngineConfig>,
) -> Result<EngineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_DIR).join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // TERMSENSE_HISTORY__MAX_ENTRIES, TERMSENSE_COMPLETION__FUZZY_MATCHING, ...
    figment = figment.merge(Env::prefixed("TERMSENSE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load a single TOML file on top of the defaults, without other layers.
pub fn load_config_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Figment::from(Serialized::defaults(EngineConfig::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

/// Check whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = project_dirs() {
        if dirs.config_dir().join("config.toml").exists() {
            return true;
        }
    }
    workspace.is_some_and(|ws| ws.join(WORKSPACE_DIR).join("config.toml").exists())
}

/// Write `config` to `<workspace>/.termsense/config.toml`. Returns the path.
pub fn save_workspace_config(
    workspace: &Path,
    config: &EngineConfig,
) -> Result<PathBuf, ConfigError> {
    let dir = workspace.join(WORKSPACE_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::Invalid {
        message: format!("cannot create {}: {e}", dir.display()),
    })?;
    let path = dir.join("config.toml");
    let text = toml::to_string_pretty(config).map_err(|e| ConfigError::Invalid {
        message: e.to_string(),
    })?;
    persistence::atomic_write(&path, text.as_bytes()).map_err(|e| ConfigError::Invalid {
        message: format!("cannot write {}: {e}", path.display()),
    })?;
    Ok(path)
}
