pub mod types;
pub mod keymap;
pub mod classify;

pub use types::*;
pub use keymap::{KeyMap, KeyOverride, PenKey, DEFAULT_KEYS};
pub use classify::{PressClassifier, PressOutcome};

// Timing defaults, all of them overridable through Settings
pub const DEFAULT_LONG_PRESS_MS: u64 = 500;
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 150;
pub const DEFAULT_MERGE_WINDOW_MS: u64 = 400;
pub const DEFAULT_ACCESSIBILITY_DEBOUNCE_MS: u64 = 800;
pub const DEFAULT_HISTORY_LIMIT: usize = 100;
