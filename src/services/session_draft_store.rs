// SessionDraftStore Service
// Keeps the in-progress customization alive across editor navigation

use std::sync::Arc;

use crate::models::{DraftSession, EditorTab, SessionRecord};
use crate::services::KeyValueStore;

/// Session store key holding the serialized draft session
pub const SESSION_DRAFT_KEY: &str = "themeCustomizationState";

/// Per-session persistence of the customization draft.
///
/// Backed by an ephemeral store; nothing written here outlives the process.
pub struct SessionDraftStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionDraftStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn save(&self, session: &DraftSession, active_tab: EditorTab) -> Result<(), String> {
        let record = SessionRecord {
            session: session.clone(),
            active_tab,
        };
        let content = serde_json::to_string(&record)
            .map_err(|e| format!("Failed to serialize draft session: {e}"))?;

        self.store.set(SESSION_DRAFT_KEY, &content)
    }

    /// Load the stored session; missing or malformed data yields `None`
    pub fn load(&self) -> Option<SessionRecord> {
        let content = match self.store.get(SESSION_DRAFT_KEY) {
            Ok(Some(content)) => content,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Failed to read draft session: {e}");
                return None;
            }
        };

        match serde_json::from_str::<SessionRecord>(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Discarding malformed draft session: {e}");
                None
            }
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(SESSION_DRAFT_KEY) {
            log::warn!("Failed to clear draft session: {e}");
        }
    }
}
