// Palette Gateway
// Applies a palette as the live site palette

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::ColorPalette;
use crate::services::KeyValueStore;

/// Durable store key holding the live site palette
pub const SITE_PALETTE_KEY: &str = "sitePalette";

/// Site-wide "save": makes a palette the one every visitor sees
#[async_trait]
pub trait PaletteGateway: Send + Sync {
    /// Apply the palette and return what was actually stored
    async fn apply_palette(&self, palette: &ColorPalette) -> Result<ColorPalette, String>;
}

/// Gateway that stores the live palette in the durable store
pub struct SitePaletteStore {
    store: Arc<dyn KeyValueStore>,
}

impl SitePaletteStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Last applied palette, if one was ever stored and still parses
    pub fn load(&self) -> Option<ColorPalette> {
        let content = match self.store.get(SITE_PALETTE_KEY) {
            Ok(content) => content?,
            Err(e) => {
                log::warn!("Failed to read site palette: {e}");
                return None;
            }
        };

        serde_json::from_str(&content)
            .map_err(|e| log::warn!("Ignoring malformed site palette: {e}"))
            .ok()
    }
}

#[async_trait]
impl PaletteGateway for SitePaletteStore {
    async fn apply_palette(&self, palette: &ColorPalette) -> Result<ColorPalette, String> {
        let content = serde_json::to_string_pretty(palette)
            .map_err(|e| format!("Failed to serialize palette: {e}"))?;
        self.store.set(SITE_PALETTE_KEY, &content)?;
        log::info!("Site palette updated (primary {})", palette.primary.base);
        Ok(palette.clone())
    }
}
