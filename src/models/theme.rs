use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ColorPalette;

/// Theme category. Standard built-ins carry no category at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeCategory {
    Holiday,
    Custom,
}

/// A named, described palette: either a shipped preset or an operator's custom theme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ThemeCategory>,
    pub palette: ColorPalette,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_theme_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ThemeDescriptor {
    pub fn is_custom(&self) -> bool {
        self.category == Some(ThemeCategory::Custom)
    }

    pub fn is_holiday(&self) -> bool {
        self.category == Some(ThemeCategory::Holiday)
    }
}

/// Every theme the editor can show, grouped the way the editor tabs are
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeListing {
    pub standard: Vec<ThemeDescriptor>,
    pub holiday: Vec<ThemeDescriptor>,
    pub custom: Vec<ThemeDescriptor>,
}
