// Draft Session Model
// In-progress customization state, mirrored into the per-session store

use serde::{Deserialize, Serialize};

use crate::models::ColorPalette;

/// Editor tab the operator was on; stored next to the draft as a hint for the screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorTab {
    Presets,
    Holiday,
    Custom,
    #[default]
    Customize,
}

impl EditorTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditorTab::Presets => "presets",
            EditorTab::Holiday => "holiday",
            EditorTab::Custom => "custom",
            EditorTab::Customize => "customize",
        }
    }
}

/// Working state of one customization session.
///
/// `original` is captured once when the session starts and is the target of
/// every reset; `draft` is the live working copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSession {
    pub draft: ColorPalette,
    pub original: ColorPalette,
    pub target_theme_id: Option<String>,
    #[serde(default)]
    pub base_theme_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl DraftSession {
    pub fn new(palette: ColorPalette) -> Self {
        Self {
            draft: palette.clone(),
            original: palette,
            target_theme_id: None,
            base_theme_id: None,
            name: String::new(),
            description: String::new(),
        }
    }

    /// Whether the draft differs from the snapshot taken at entry
    pub fn is_dirty(&self) -> bool {
        self.draft != self.original
    }
}

/// Serialized form kept under the session key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(flatten)]
    pub session: DraftSession,
    #[serde(default)]
    pub active_tab: EditorTab,
}
