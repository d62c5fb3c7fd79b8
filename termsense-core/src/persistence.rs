//! Key-value persistence for engine state.
//!
//! The engine never talks to a concrete storage backend directly. Each store
//! (history, aliases, completion settings) serializes itself to JSON and
//! hands the string to a [`KeyValueStore`]. Writes are fire-and-forget: a
//! failure is logged and dropped, and the in-memory mutation that triggered
//! it is kept. Reads tolerate absence and corruption by falling back to
//! defaults.

use crate::error::StorageError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Minimal string key-value backend.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, `Ok(None)` if absent.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Shared handle to a storage backend.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// In-process store, used in tests and when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().map_err(|e| StorageError::Read {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|e| StorageError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|e| StorageError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        values.remove(key);
        Ok(())
    }
}

/// Directory-backed store: one `<key>.json` file per key, written atomically.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| StorageError::Read {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        atomic_write(&path, value.as_bytes()).map_err(|e| StorageError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Write {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Atomically write raw bytes to a file.
///
/// Writes to a `.tmp` sibling file, then renames over the target path.
/// Creates parent directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load and deserialize a JSON value from the store.
///
/// Absent keys, read failures and parse failures all yield `None`; the
/// latter two are logged.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "Failed to read persisted state, using defaults");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Ignoring corrupted persisted state");
            None
        }
    }
}

/// Serialize `value` and write it under `key`. Failures are logged and dropped.
pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            warn!(key, error = %e, "Failed to serialize state for persistence");
            return;
        }
    };
    match store.set(key, &json) {
        Ok(()) => debug!(key, bytes = json.len(), "Persisted state"),
        Err(e) => warn!(key, error = %e, "Persistence write failed, change kept in memory only"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        count: u32,
    }

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.get("a").unwrap().is_none());
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_roundtrip_json() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("state"));
        let data = TestData {
            name: "hello".into(),
            count: 42,
        };

        save_json(&store, "history.state", &data);
        let loaded: Option<TestData> = load_json(&store, "history.state");
        assert_eq!(loaded, Some(data));
        assert!(dir.path().join("state").join("history.state.json").exists());
    }

    #[test]
    fn test_file_store_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.set("../escape", "x"),
            Err(StorageError::InvalidKey { .. })
        ));
        assert!(store.get(".hidden").is_err());
    }

    #[test]
    fn test_file_store_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.remove("nothing").is_ok());
    }

    #[test]
    fn test_load_json_corrupted_returns_none() {
        let store = MemoryStore::new();
        store.set("aliases", "{not json").unwrap();
        let loaded: Option<TestData> = load_json(&store, "aliases");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_atomic_write_no_tmp_leftover() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clean.json");

        atomic_write(&path, b"{}").unwrap();

        let tmp = path.with_extension("tmp");
        assert!(!tmp.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
