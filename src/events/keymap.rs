use serde::{Deserialize, Serialize};

/// Default pen key table: (Android keycode, KEYCODE_* name without prefix, label)
pub const DEFAULT_KEYS: [(u16, &str, &str); 5] = [
    (308, "STYLUS_BUTTON_PRIMARY", "Primary button"),
    (309, "STYLUS_BUTTON_SECONDARY", "Secondary button"),
    (310, "STYLUS_BUTTON_TERTIARY", "Tertiary button"),
    (311, "STYLUS_BUTTON_TAIL", "Tail button"),
    (120, "SYSRQ", "Screenshot key"),
];

const KEYCODE_PREFIX: &str = "KEYCODE_";

/// One entry of the key table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PenKey {
    /// Android keycode
    pub code: u16,
    /// Symbolic name without the `KEYCODE_` prefix
    pub name: String,
    pub label: String,
}

impl PenKey {
    pub fn new(code: u16, name: impl Into<String>, label: impl Into<String>) -> Self {
        Self { code, name: name.into(), label: label.into() }
    }

    pub fn keycode_name(&self) -> String {
        format!("{}{}", KEYCODE_PREFIX, self.name)
    }
}

/// Configuration entry that relabels or replaces a table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOverride {
    pub code: u16,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Existing code this entry takes the place of
    #[serde(default)]
    pub replaces: Option<u16>,
}

/// Fixed lookup table from keycodes to pen keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMap {
    keys: Vec<PenKey>,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self {
            keys: DEFAULT_KEYS
                .iter()
                .map(|(code, name, label)| PenKey::new(*code, *name, *label))
                .collect(),
        }
    }
}

impl KeyMap {
    /// Apply configuration overrides to the default table.
    /// Overrides that match no entry are skipped, the table never grows.
    pub fn with_overrides(overrides: &[KeyOverride]) -> Self {
        let mut map = Self::default();
        for entry in overrides {
            let target = entry.replaces.unwrap_or(entry.code);
            let Some(key) = map.keys.iter_mut().find(|k| k.code == target) else {
                log::warn!("Key override for code {} matches no table entry, skipped", target);
                continue;
            };
            key.code = entry.code;
            if let Some(name) = &entry.name {
                key.name = strip_prefix(name).to_ascii_uppercase();
            }
            if let Some(label) = &entry.label {
                key.label = label.clone();
            }
        }
        map
    }

    pub fn lookup_code(&self, code: u16) -> Option<PenKey> {
        self.keys.iter().find(|k| k.code == code).cloned()
    }

    /// Accepts `KEYCODE_STYLUS_BUTTON_PRIMARY` or `STYLUS_BUTTON_PRIMARY`, any case
    pub fn lookup_name(&self, name: &str) -> Option<PenKey> {
        let bare = strip_prefix(name.trim());
        self.keys.iter().find(|k| k.name.eq_ignore_ascii_case(bare)).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PenKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn strip_prefix(name: &str) -> &str {
    if name.len() >= KEYCODE_PREFIX.len() && name[..KEYCODE_PREFIX.len()].eq_ignore_ascii_case(KEYCODE_PREFIX) {
        &name[KEYCODE_PREFIX.len()..]
    } else {
        name
    }
}
