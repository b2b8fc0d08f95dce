// Theme Catalog
// Read-only built-in themes, embedded at compile time

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::models::{ThemeCategory, ThemeDescriptor};

const CLASSIC_JSON: &str = include_str!("../../themes/classic.json");
const OCEAN_JSON: &str = include_str!("../../themes/ocean.json");
const FOREST_JSON: &str = include_str!("../../themes/forest.json");
const SUNSET_JSON: &str = include_str!("../../themes/sunset.json");
const MIDNIGHT_JSON: &str = include_str!("../../themes/midnight.json");
const MONOCHROME_JSON: &str = include_str!("../../themes/monochrome.json");
const WINTER_HOLIDAYS_JSON: &str = include_str!("../../themes/winter-holidays.json");
const HALLOWEEN_JSON: &str = include_str!("../../themes/halloween.json");
const VALENTINES_JSON: &str = include_str!("../../themes/valentines.json");
const SPRING_BLOOM_JSON: &str = include_str!("../../themes/spring-bloom.json");

static BUILTIN_CATALOG: OnceLock<ThemeCatalog> = OnceLock::new();

/// Immutable list of shipped theme descriptors
#[derive(Debug, Clone, Default)]
pub struct ThemeCatalog {
    themes: Vec<ThemeDescriptor>,
}

impl ThemeCatalog {
    /// Catalog of the themes bundled with the binary
    pub fn builtin() -> &'static ThemeCatalog {
        BUILTIN_CATALOG.get_or_init(|| {
            let theme_sources = [
                CLASSIC_JSON,
                OCEAN_JSON,
                FOREST_JSON,
                SUNSET_JSON,
                MIDNIGHT_JSON,
                MONOCHROME_JSON,
                WINTER_HOLIDAYS_JSON,
                HALLOWEEN_JSON,
                VALENTINES_JSON,
                SPRING_BLOOM_JSON,
            ];

            let mut themes = Vec::new();
            for json_str in theme_sources {
                match serde_json::from_str::<ThemeDescriptor>(json_str) {
                    Ok(theme) => themes.push(theme),
                    Err(e) => log::warn!("Failed to parse embedded theme JSON: {e}"),
                }
            }

            let catalog = ThemeCatalog::from_descriptors(themes);
            log::info!("Loaded {} embedded themes", catalog.themes.len());
            catalog
        })
    }

    /// Build a catalog, dropping custom-category entries and duplicate ids
    pub fn from_descriptors(descriptors: Vec<ThemeDescriptor>) -> Self {
        let mut themes = Vec::new();
        let mut seen_ids = HashSet::new();

        for theme in descriptors {
            if theme.category == Some(ThemeCategory::Custom) {
                log::warn!("Skipping custom theme '{}' in built-in catalog", theme.id);
                continue;
            }
            if !seen_ids.insert(theme.id.clone()) {
                log::warn!("Skipping duplicate built-in theme id '{}'", theme.id);
                continue;
            }
            themes.push(theme);
        }

        Self { themes }
    }

    pub fn list(&self) -> &[ThemeDescriptor] {
        &self.themes
    }

    /// Standard presets (no category)
    pub fn standard(&self) -> Vec<ThemeDescriptor> {
        self.themes
            .iter()
            .filter(|theme| theme.category.is_none())
            .cloned()
            .collect()
    }

    /// Seasonal presets
    pub fn holiday(&self) -> Vec<ThemeDescriptor> {
        self.themes
            .iter()
            .filter(|theme| theme.is_holiday())
            .cloned()
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&ThemeDescriptor> {
        self.themes.iter().find(|theme| theme.id == id)
    }
}
