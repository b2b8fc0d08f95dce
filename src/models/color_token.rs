// Color Token Model
// A validated (family, shade) pair rendered as "family-shade"

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{ThemeError, ThemeResult};

const TOKEN_PATTERN: &str = r"^([a-z]+)-([0-9]{2,3})$";

/// Shades available on every chromatic scale
pub const FULL_SCALE: &[&str] = &[
    "50", "100", "200", "300", "400", "500", "600", "700", "800", "900", "950",
];

/// Grays carry no 950 stop in the storefront's design system
const GRAY_SCALE: &[&str] = &["50", "100", "200", "300", "400", "500", "600", "700", "800", "900"];

/// Registered color families and the shades each one allows
pub const COLOR_FAMILIES: &[(&str, &[&str])] = &[
    ("slate", GRAY_SCALE),
    ("gray", GRAY_SCALE),
    ("zinc", GRAY_SCALE),
    ("neutral", GRAY_SCALE),
    ("stone", GRAY_SCALE),
    ("red", FULL_SCALE),
    ("orange", FULL_SCALE),
    ("amber", FULL_SCALE),
    ("yellow", FULL_SCALE),
    ("lime", FULL_SCALE),
    ("green", FULL_SCALE),
    ("emerald", FULL_SCALE),
    ("teal", FULL_SCALE),
    ("cyan", FULL_SCALE),
    ("sky", FULL_SCALE),
    ("blue", FULL_SCALE),
    ("indigo", FULL_SCALE),
    ("violet", FULL_SCALE),
    ("purple", FULL_SCALE),
    ("fuchsia", FULL_SCALE),
    ("pink", FULL_SCALE),
    ("rose", FULL_SCALE),
];

static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

/// One color of the palette, always a registered family/shade pair.
///
/// Both halves point into the static registry, so a token can only be
/// obtained through [`ColorToken::validate`] or [`ColorToken::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct ColorToken {
    family: &'static str,
    shade: &'static str,
}

impl ColorToken {
    /// Validate a family/shade pair against the registry
    pub fn validate(family: &str, shade: &str) -> ThemeResult<Self> {
        let (registered_family, shades) = COLOR_FAMILIES
            .iter()
            .find(|(name, _)| *name == family)
            .ok_or_else(|| ThemeError::InvalidToken {
                token: format!("{family}-{shade}"),
            })?;

        let registered_shade = shades
            .iter()
            .find(|candidate| **candidate == shade)
            .ok_or_else(|| ThemeError::InvalidToken {
                token: format!("{family}-{shade}"),
            })?;

        Ok(Self {
            family: registered_family,
            shade: registered_shade,
        })
    }

    /// Parse the rendered "family-shade" form
    pub fn parse(token: &str) -> ThemeResult<Self> {
        let regex = TOKEN_REGEX.get_or_init(|| Regex::new(TOKEN_PATTERN).unwrap());
        let trimmed = token.trim();
        let captures = regex.captures(trimmed).ok_or_else(|| ThemeError::InvalidToken {
            token: token.to_string(),
        })?;

        Self::validate(&captures[1], &captures[2])
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    pub fn shade(&self) -> &'static str {
        self.shade
    }
}

impl fmt::Display for ColorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.family, self.shade)
    }
}

// The fields borrow from the static registry, not from the input, so the
// impl is written out to stay valid for any deserializer lifetime.
impl<'de> Deserialize<'de> for ColorToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl From<ColorToken> for String {
    fn from(token: ColorToken) -> Self {
        token.to_string()
    }
}

/// Shades registered for a family, if the family exists
pub fn shades_for(family: &str) -> Option<&'static [&'static str]> {
    COLOR_FAMILIES
        .iter()
        .find(|(name, _)| *name == family)
        .map(|(_, shades)| *shades)
}
