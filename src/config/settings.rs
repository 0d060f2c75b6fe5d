use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ConfigError, Result, DEFAULT_PEN_TAG_PATTERN};
use crate::accessibility::{self, AccessibilityInferrer, AccessibilityRule};
use crate::detector::HistoryConfig;
use crate::events::{self, KeyMap, KeyOverride};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceToggles {
    pub logcat: bool,
    pub input: bool,
    pub accessibility: bool,
}

impl Default for SourceToggles {
    fn default() -> Self {
        Self { logcat: true, input: true, accessibility: true }
    }
}

/// Runtime configuration; every field falls back to its default when absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sources: SourceToggles,
    pub logcat_command: Vec<String>,
    pub accessibility_command: Vec<String>,
    /// Empty means autodetect devices with stylus buttons
    pub input_devices: Vec<PathBuf>,
    pub pen_tag_pattern: String,
    pub long_press_ms: u64,
    pub dedup_window_ms: u64,
    pub merge_window_ms: u64,
    pub accessibility_debounce_ms: u64,
    pub history_limit: usize,
    pub key_overrides: Vec<KeyOverride>,
    pub accessibility_rules: Vec<AccessibilityRule>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: SourceToggles::default(),
            logcat_command: crate::logcat::DEFAULT_LOGCAT_COMMAND.iter().map(|s| s.to_string()).collect(),
            accessibility_command: accessibility::DEFAULT_ACCESSIBILITY_COMMAND.iter().map(|s| s.to_string()).collect(),
            input_devices: Vec::new(),
            pen_tag_pattern: DEFAULT_PEN_TAG_PATTERN.to_string(),
            long_press_ms: events::DEFAULT_LONG_PRESS_MS,
            dedup_window_ms: events::DEFAULT_DEDUP_WINDOW_MS,
            merge_window_ms: events::DEFAULT_MERGE_WINDOW_MS,
            accessibility_debounce_ms: events::DEFAULT_ACCESSIBILITY_DEBOUNCE_MS,
            history_limit: events::DEFAULT_HISTORY_LIMIT,
            key_overrides: Vec::new(),
            accessibility_rules: accessibility::default_rules(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file and validate them
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let settings = Self::from_json(&text)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.logcat && self.logcat_command.is_empty() {
            return Err(ConfigError::Invalid("logcat_command is empty".into()));
        }
        if self.sources.accessibility && self.accessibility_command.is_empty() {
            return Err(ConfigError::Invalid("accessibility_command is empty".into()));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid("history_limit must be at least 1".into()));
        }
        if self.dedup_window_ms > self.merge_window_ms {
            return Err(ConfigError::Invalid("dedup_window_ms must not exceed merge_window_ms".into()));
        }
        Regex::new(&self.pen_tag_pattern).map_err(|source| ConfigError::InvalidPattern {
            field: "pen_tag_pattern".into(),
            source,
        })?;
        AccessibilityInferrer::new(&self.accessibility_rules, self.accessibility_debounce())?;
        Ok(())
    }

    pub fn keymap(&self) -> KeyMap {
        KeyMap::with_overrides(&self.key_overrides)
    }

    pub fn long_press(&self) -> Duration {
        Duration::from_millis(self.long_press_ms)
    }

    pub fn accessibility_debounce(&self) -> Duration {
        Duration::from_millis(self.accessibility_debounce_ms)
    }

    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            dedup_window: Duration::from_millis(self.dedup_window_ms),
            merge_window: Duration::from_millis(self.merge_window_ms),
            limit: self.history_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.logcat_command, vec!["logcat", "-v", "threadtime", "-T", "1"]);
        assert_eq!(settings.keymap().len(), 5);
        assert_eq!(settings.history_config().limit, 100);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings = Settings::from_json(
            r#"{ "sources": { "input": false }, "long_press_ms": 700,
                 "key_overrides": [ { "code": 308, "label": "Barrel" } ] }"#,
        )
        .unwrap();
        assert!(settings.sources.logcat);
        assert!(!settings.sources.input);
        assert_eq!(settings.long_press(), Duration::from_millis(700));
        assert_eq!(settings.merge_window_ms, events::DEFAULT_MERGE_WINDOW_MS);
        assert_eq!(settings.keymap().lookup_code(308).unwrap().label, "Barrel");
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            Settings::from_json(r#"{ "pen_tag_pattern": "(" }"#),
            Err(ConfigError::InvalidPattern { .. })
        ));
        assert!(matches!(Settings::from_json(r#"{ "history_limit": 0 }"#), Err(ConfigError::Invalid(_))));
        assert!(matches!(
            Settings::from_json(r#"{ "dedup_window_ms": 900, "merge_window_ms": 100 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(Settings::from_json("{ nope"), Err(ConfigError::Parse(_))));
        let rules = r#"{ "accessibility_rules": [ { "event_type": "*", "package": "[", "description": "bad" } ] }"#;
        assert!(matches!(Settings::from_json(rules), Err(ConfigError::Accessibility(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::load(Path::new("/nonexistent/penplus.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
