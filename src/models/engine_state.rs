use serde::Serialize;

use crate::models::{ColorPalette, DraftSession, EditorTab};

/// Which source the effective palette is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeState {
    Idle,
    Previewing,
    Customizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Leave customization after a successful save
    Exit,
    /// Keep the session open; later saves update the same custom theme
    Continue,
}

/// Read-only view of the engine handed to the editor screen
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub state: ThemeState,
    pub effective_palette: ColorPalette,
    pub saved_palette: ColorPalette,
    pub previewing_theme_id: Option<String>,
    pub session: Option<DraftSession>,
    pub active_tab: EditorTab,
    pub current_preset: Option<String>,
    pub saving: bool,
}
