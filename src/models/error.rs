// Theme Errors
// Every failure the theme subsystem reports to its callers

/// Result type for theme operations
pub type ThemeResult<T> = Result<T, ThemeError>;

/// Errors that can occur during theme operations.
///
/// The `Display` text is shown to the operator as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThemeError {
    #[error("Invalid color token '{token}'")]
    InvalidToken { token: String },

    #[error("Unknown property '{property}' in {section} colors")]
    UnknownProperty { section: String, property: String },

    #[error("Unknown palette section '{0}'")]
    UnknownSection(String),

    #[error("No theme customization in progress")]
    NotCustomizing,

    #[error("Theme '{0}' not found")]
    ThemeNotFound(String),

    #[error("Theme name is required")]
    NameRequired,

    #[error("A theme save is already in progress")]
    SaveInProgress,

    #[error("Failed to persist theme: {0}")]
    Persistence(String),
}
