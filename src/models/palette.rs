// Palette Model
// Canonical shape of a site theme: four fixed sections of color tokens

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{ColorToken, ThemeError, ThemeResult};

/// Named group of properties inside a palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteSection {
    Primary,
    Secondary,
    Text,
    Ui,
}

impl PaletteSection {
    pub const ALL: [PaletteSection; 4] = [
        PaletteSection::Primary,
        PaletteSection::Secondary,
        PaletteSection::Text,
        PaletteSection::Ui,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaletteSection::Primary => "primary",
            PaletteSection::Secondary => "secondary",
            PaletteSection::Text => "text",
            PaletteSection::Ui => "ui",
        }
    }

    /// Fixed property names of this section, in display order
    pub fn properties(&self) -> &'static [&'static str] {
        match self {
            PaletteSection::Primary => PrimaryColors::PROPERTIES,
            PaletteSection::Secondary => SecondaryColors::PROPERTIES,
            PaletteSection::Text => TextColors::PROPERTIES,
            PaletteSection::Ui => UiColors::PROPERTIES,
        }
    }
}

impl fmt::Display for PaletteSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaletteSection {
    type Err = ThemeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "primary" => Ok(PaletteSection::Primary),
            "secondary" => Ok(PaletteSection::Secondary),
            "text" => Ok(PaletteSection::Text),
            "ui" => Ok(PaletteSection::Ui),
            other => Err(ThemeError::UnknownSection(other.to_string())),
        }
    }
}

/// Brand colors used for buttons, links and highlights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryColors {
    pub base: ColorToken,
    pub light: ColorToken,
    pub lightest: ColorToken,
    pub dark: ColorToken,
    pub hover: ColorToken,
}

impl PrimaryColors {
    pub const PROPERTIES: &'static [&'static str] = &["base", "light", "lightest", "dark", "hover"];

    fn get(&self, property: &str) -> Option<ColorToken> {
        match property {
            "base" => Some(self.base),
            "light" => Some(self.light),
            "lightest" => Some(self.lightest),
            "dark" => Some(self.dark),
            "hover" => Some(self.hover),
            _ => None,
        }
    }

    fn slot(&mut self, property: &str) -> Option<&mut ColorToken> {
        match property {
            "base" => Some(&mut self.base),
            "light" => Some(&mut self.light),
            "lightest" => Some(&mut self.lightest),
            "dark" => Some(&mut self.dark),
            "hover" => Some(&mut self.hover),
            _ => None,
        }
    }
}

/// Accent colors for badges, sale banners and secondary actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryColors {
    pub base: ColorToken,
    pub light: ColorToken,
    pub dark: ColorToken,
    pub hover: ColorToken,
}

impl SecondaryColors {
    pub const PROPERTIES: &'static [&'static str] = &["base", "light", "dark", "hover"];

    fn get(&self, property: &str) -> Option<ColorToken> {
        match property {
            "base" => Some(self.base),
            "light" => Some(self.light),
            "dark" => Some(self.dark),
            "hover" => Some(self.hover),
            _ => None,
        }
    }

    fn slot(&mut self, property: &str) -> Option<&mut ColorToken> {
        match property {
            "base" => Some(&mut self.base),
            "light" => Some(&mut self.light),
            "dark" => Some(&mut self.dark),
            "hover" => Some(&mut self.hover),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextColors {
    pub base: ColorToken,
    pub light: ColorToken,
    pub dark: ColorToken,
    pub inverse: ColorToken,
}

impl TextColors {
    pub const PROPERTIES: &'static [&'static str] = &["base", "light", "dark", "inverse"];

    fn get(&self, property: &str) -> Option<ColorToken> {
        match property {
            "base" => Some(self.base),
            "light" => Some(self.light),
            "dark" => Some(self.dark),
            "inverse" => Some(self.inverse),
            _ => None,
        }
    }

    fn slot(&mut self, property: &str) -> Option<&mut ColorToken> {
        match property {
            "base" => Some(&mut self.base),
            "light" => Some(&mut self.light),
            "dark" => Some(&mut self.dark),
            "inverse" => Some(&mut self.inverse),
            _ => None,
        }
    }
}

/// Surfaces, borders and interactive chrome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiColors {
    pub background: ColorToken,
    pub surface: ColorToken,
    pub border: ColorToken,
    pub hover: ColorToken,
}

impl UiColors {
    pub const PROPERTIES: &'static [&'static str] = &["background", "surface", "border", "hover"];

    fn get(&self, property: &str) -> Option<ColorToken> {
        match property {
            "background" => Some(self.background),
            "surface" => Some(self.surface),
            "border" => Some(self.border),
            "hover" => Some(self.hover),
            _ => None,
        }
    }

    fn slot(&mut self, property: &str) -> Option<&mut ColorToken> {
        match property {
            "background" => Some(&mut self.background),
            "surface" => Some(&mut self.surface),
            "border" => Some(&mut self.border),
            "hover" => Some(&mut self.hover),
            _ => None,
        }
    }
}

/// Complete site palette.
///
/// Every property of every section is a struct field, so a palette can never
/// be missing a color and deserializing one with a missing or invalid token
/// fails as a whole. `Clone` yields a fully independent copy and `PartialEq`
/// is structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorPalette {
    pub primary: PrimaryColors,
    pub secondary: SecondaryColors,
    pub text: TextColors,
    pub ui: UiColors,
}

impl Default for ColorPalette {
    fn default() -> Self {
        default_palette()
    }
}

impl ColorPalette {
    /// Read a single property
    pub fn get(&self, section: PaletteSection, property: &str) -> ThemeResult<ColorToken> {
        let token = match section {
            PaletteSection::Primary => self.primary.get(property),
            PaletteSection::Secondary => self.secondary.get(property),
            PaletteSection::Text => self.text.get(property),
            PaletteSection::Ui => self.ui.get(property),
        };
        token.ok_or_else(|| unknown_property(section, property))
    }

    /// Copy of this palette with one property replaced
    pub fn with_color(
        &self,
        section: PaletteSection,
        property: &str,
        token: ColorToken,
    ) -> ThemeResult<ColorPalette> {
        let mut next = self.clone();
        let slot = next
            .slot(section, property)
            .ok_or_else(|| unknown_property(section, property))?;
        *slot = token;
        Ok(next)
    }

    /// Copy of this palette with one property taken from `source`
    pub fn with_color_from(
        &self,
        source: &ColorPalette,
        section: PaletteSection,
        property: &str,
    ) -> ThemeResult<ColorPalette> {
        let token = source.get(section, property)?;
        self.with_color(section, property, token)
    }

    /// Copy of this palette with a whole section taken from `source`
    pub fn with_section_from(&self, source: &ColorPalette, section: PaletteSection) -> ColorPalette {
        let mut next = self.clone();
        match section {
            PaletteSection::Primary => next.primary = source.primary.clone(),
            PaletteSection::Secondary => next.secondary = source.secondary.clone(),
            PaletteSection::Text => next.text = source.text.clone(),
            PaletteSection::Ui => next.ui = source.ui.clone(),
        }
        next
    }

    /// Every (section, property) whose token differs between the two palettes
    pub fn changed_properties(&self, other: &ColorPalette) -> Vec<(PaletteSection, &'static str)> {
        let mut changed = Vec::new();
        for section in PaletteSection::ALL {
            for property in section.properties() {
                let ours = self.get(section, property).ok();
                let theirs = other.get(section, property).ok();
                if ours != theirs {
                    changed.push((section, *property));
                }
            }
        }
        changed
    }

    fn slot(&mut self, section: PaletteSection, property: &str) -> Option<&mut ColorToken> {
        match section {
            PaletteSection::Primary => self.primary.slot(property),
            PaletteSection::Secondary => self.secondary.slot(property),
            PaletteSection::Text => self.text.slot(property),
            PaletteSection::Ui => self.ui.slot(property),
        }
    }
}

fn unknown_property(section: PaletteSection, property: &str) -> ThemeError {
    ThemeError::UnknownProperty {
        section: section.as_str().to_string(),
        property: property.to_string(),
    }
}

fn token(family: &'static str, shade: &'static str) -> ColorToken {
    // Defaults are registry members; a failure here is a programming error caught by tests
    ColorToken::validate(family, shade).unwrap_or_else(|e| panic!("default palette: {e}"))
}

/// Palette the site starts with before any theme is applied
pub fn default_palette() -> ColorPalette {
    ColorPalette {
        primary: PrimaryColors {
            base: token("indigo", "600"),
            light: token("indigo", "400"),
            lightest: token("indigo", "100"),
            dark: token("indigo", "800"),
            hover: token("indigo", "700"),
        },
        secondary: SecondaryColors {
            base: token("amber", "500"),
            light: token("amber", "300"),
            dark: token("amber", "700"),
            hover: token("amber", "600"),
        },
        text: TextColors {
            base: token("gray", "800"),
            light: token("gray", "500"),
            dark: token("gray", "900"),
            inverse: token("gray", "50"),
        },
        ui: UiColors {
            background: token("gray", "50"),
            surface: token("slate", "100"),
            border: token("gray", "200"),
            hover: token("gray", "100"),
        },
    }
}
