// Key-Value Stores
// Durable per-device storage and ephemeral per-session storage

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// String-keyed storage backing the theme stores
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
    fn remove(&self, key: &str) -> Result<(), String>;
}

/// Validate a store key so it cannot escape the store directory
fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("Store key cannot be empty".to_string());
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(format!(
            "Store key '{key}' can only contain letters, numbers, underscores, and hyphens"
        ));
    }
    Ok(())
}

/// Durable store: one JSON file per key under the data directory
pub struct FileKeyValueStore {
    store_dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(app_data_dir: PathBuf) -> Self {
        let store_dir = app_data_dir.join("store");
        if let Err(e) = std::fs::create_dir_all(&store_dir) {
            log::warn!("Failed to create store directory {:?}: {e}", store_dir);
        }
        Self { store_dir }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, String> {
        validate_key(key)?;
        Ok(self.store_dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }

        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| format!("Failed to read {key}: {e}"))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let path = self.path_for(key)?;
        let tmp = self.store_dir.join(format!("{key}.json.tmp"));

        std::fs::create_dir_all(&self.store_dir)
            .map_err(|e| format!("Failed to create store directory: {e}"))?;

        std::fs::write(&tmp, value)
            .map_err(|e| format!("Failed to write temp {key}: {e}"))?;

        std::fs::rename(&tmp, &path)
            .map_err(|e| format!("Failed to replace {key}: {e}"))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        let path = self.path_for(key)?;
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| format!("Failed to delete {key}: {e}"))?;
        }
        Ok(())
    }
}

/// Ephemeral store that lives only as long as the process
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| {
            log::warn!("Memory store lock poisoned, recovering: {}", e);
            e.into_inner()
        })
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.lock().remove(key);
        Ok(())
    }
}
