// CustomThemeStore Service
// Operator-authored themes, persisted to the durable per-device store

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde_json::Value;

use crate::models::{ColorPalette, ThemeCategory, ThemeDescriptor, ThemeError, ThemeResult};
use crate::services::KeyValueStore;

/// Durable store key holding the JSON array of custom themes
pub const CUSTOM_THEMES_KEY: &str = "customThemes";

const CUSTOM_ID_PREFIX: &str = "custom";

/// Result of a store mutation.
///
/// The in-memory list always reflects the change; `durable` reports whether
/// the full list also reached the backing store.
#[must_use]
#[derive(Debug)]
pub struct StoreWrite<T> {
    pub value: T,
    pub durable: ThemeResult<()>,
}

impl<T> StoreWrite<T> {
    pub fn into_result(self) -> ThemeResult<T> {
        self.durable.map(|_| self.value)
    }
}

/// Manages the list of custom themes
pub struct CustomThemeStore {
    store: Arc<dyn KeyValueStore>,
    themes: RwLock<Vec<ThemeDescriptor>>,
}

impl CustomThemeStore {
    /// Create the store and load whatever the backing store holds
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let themes = load_themes(store.as_ref());
        log::info!("CustomThemeStore: loaded {} custom theme(s)", themes.len());
        Self {
            store,
            themes: RwLock::new(themes),
        }
    }

    pub fn list(&self) -> Vec<ThemeDescriptor> {
        self.read().clone()
    }

    pub fn find(&self, id: &str) -> Option<ThemeDescriptor> {
        self.read().iter().find(|theme| theme.id == id).cloned()
    }

    /// Append a new custom theme with a freshly generated id
    pub fn create(
        &self,
        name: &str,
        description: &str,
        palette: &ColorPalette,
        base_theme_id: Option<&str>,
    ) -> StoreWrite<ThemeDescriptor> {
        let mut themes = self.write();
        let now = Utc::now();
        let id = unique_id(&themes, now.timestamp_millis());

        let theme = ThemeDescriptor {
            id,
            name: name.to_string(),
            description: description.to_string(),
            category: Some(ThemeCategory::Custom),
            palette: palette.clone(),
            base_theme_id: base_theme_id.map(str::to_string),
            created_at: Some(now),
            updated_at: Some(now),
        };
        themes.push(theme.clone());
        log::info!("Created custom theme '{}' ({})", theme.name, theme.id);

        let durable = self.persist(&themes);
        StoreWrite { value: theme, durable }
    }

    /// Replace name, description and palette of an existing theme.
    /// Unknown ids are a no-op and yield `None`.
    pub fn update(
        &self,
        id: &str,
        name: &str,
        description: &str,
        palette: &ColorPalette,
    ) -> StoreWrite<Option<ThemeDescriptor>> {
        let mut themes = self.write();
        let Some(theme) = themes.iter_mut().find(|theme| theme.id == id) else {
            log::warn!("Custom theme '{id}' not found, update skipped");
            return StoreWrite { value: None, durable: Ok(()) };
        };

        theme.name = name.to_string();
        theme.description = description.to_string();
        theme.palette = palette.clone();
        theme.updated_at = Some(Utc::now());
        let updated = theme.clone();
        log::info!("Updated custom theme '{}' ({})", updated.name, updated.id);

        let durable = self.persist(&themes);
        StoreWrite { value: Some(updated), durable }
    }

    /// Remove a theme; yields whether anything was removed
    pub fn delete(&self, id: &str) -> StoreWrite<bool> {
        let mut themes = self.write();
        let before = themes.len();
        themes.retain(|theme| theme.id != id);
        if themes.len() == before {
            return StoreWrite { value: false, durable: Ok(()) };
        }
        log::info!("Deleted custom theme {id}");

        let durable = self.persist(&themes);
        StoreWrite { value: true, durable }
    }

    fn persist(&self, themes: &[ThemeDescriptor]) -> ThemeResult<()> {
        let content = serde_json::to_string(themes)
            .map_err(|e| ThemeError::Persistence(format!("Failed to serialize custom themes: {e}")))?;

        self.store.set(CUSTOM_THEMES_KEY, &content).map_err(|e| {
            log::error!("Failed to write custom themes: {e}");
            ThemeError::Persistence(e)
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ThemeDescriptor>> {
        self.themes.read().unwrap_or_else(|e| {
            log::warn!("Custom theme lock poisoned, recovering: {}", e);
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ThemeDescriptor>> {
        self.themes.write().unwrap_or_else(|e| {
            log::warn!("Custom theme lock poisoned, recovering: {}", e);
            e.into_inner()
        })
    }
}

/// Read the stored list; any failure degrades to an empty list
fn load_themes(store: &dyn KeyValueStore) -> Vec<ThemeDescriptor> {
    let content = match store.get(CUSTOM_THEMES_KEY) {
        Ok(Some(content)) => content,
        Ok(None) => return Vec::new(),
        Err(e) => {
            log::warn!("Failed to read custom themes: {e}");
            return Vec::new();
        }
    };

    let entries: Vec<Value> = match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Failed to parse custom themes: {e}");
            return Vec::new();
        }
    };

    // A single bad entry (e.g. a color no longer registered) only drops that entry
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ThemeDescriptor>(entry) {
            Ok(mut theme) => {
                theme.category = Some(ThemeCategory::Custom);
                Some(theme)
            }
            Err(e) => {
                log::warn!("Skipping invalid custom theme entry: {e}");
                None
            }
        })
        .collect()
}

fn unique_id(themes: &[ThemeDescriptor], millis: i64) -> String {
    let base = format!("{CUSTOM_ID_PREFIX}-{millis}");
    if !themes.iter().any(|theme| theme.id == base) {
        return base;
    }

    let mut suffix = 1;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !themes.iter().any(|theme| theme.id == candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
