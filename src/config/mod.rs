pub mod settings;

pub use settings::{Settings, SourceToggles};

use std::path::PathBuf;

/// Matches pen-related tags or messages in the log stream
pub const DEFAULT_PEN_TAG_PATTERN: &str = r"(?i)(pen|stylus)";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid pattern in {field}: {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid accessibility rule: {0}")]
    Accessibility(#[from] crate::accessibility::AccessibilityError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
