use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keymap::PenKey;

/// Observer that produced a piece of evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Privileged log stream (`logcat`)
    Logcat,
    /// Kernel input events
    InputEvent,
    /// Side effects seen through accessibility events
    Accessibility,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 3] = [
        DetectionMethod::Logcat,
        DetectionMethod::InputEvent,
        DetectionMethod::Accessibility,
    ];

    pub fn confidence(&self) -> Confidence {
        match self {
            DetectionMethod::Logcat | DetectionMethod::InputEvent => Confidence::High,
            DetectionMethod::Accessibility => Confidence::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Logcat => "logcat",
            DetectionMethod::InputEvent => "input",
            DetectionMethod::Accessibility => "accessibility",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    High,
}

/// Direction of a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    Down,
    Up,
    Repeat,
}

impl KeyAction {
    /// Android `KeyEvent` action: 0 = ACTION_DOWN, 1 = ACTION_UP, 2 = ACTION_MULTIPLE
    pub fn from_android_action(value: i64) -> Option<Self> {
        match value {
            0 => Some(KeyAction::Down),
            1 => Some(KeyAction::Up),
            2 => Some(KeyAction::Repeat),
            _ => None,
        }
    }

    /// Kernel `EV_KEY` value: 0 = release, 1 = press, 2 = autorepeat
    pub fn from_evdev_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyAction::Up),
            1 => Some(KeyAction::Down),
            2 => Some(KeyAction::Repeat),
            _ => None,
        }
    }
}

/// Kind of press a history entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    Click,
    LongPress,
    /// Seen only through a side effect; press duration unknown
    Inferred,
}

impl Gesture {
    pub fn label(&self) -> &'static str {
        match self {
            Gesture::Click => "click",
            Gesture::LongPress => "long press",
            Gesture::Inferred => "inferred press",
        }
    }
}

/// A single piece of evidence from one observer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub method: DetectionMethod,
    /// Unknown for sources that only see side effects
    pub key: Option<PenKey>,
    pub gesture: Gesture,
    pub observed_at: DateTime<Utc>,
    /// Raw line or description kept for diagnostics
    pub detail: String,
}

impl Observation {
    pub fn new(method: DetectionMethod, key: Option<PenKey>, gesture: Gesture, detail: impl Into<String>) -> Self {
        Self {
            method,
            key,
            gesture,
            observed_at: Utc::now(),
            detail: detail.into(),
        }
    }

    pub fn at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }
}

/// One reconciled button press in the history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonEvent {
    pub id: Uuid,
    pub key: Option<PenKey>,
    pub gesture: Gesture,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Observers that reported this press, in arrival order
    pub methods: Vec<DetectionMethod>,
    pub confidence: Confidence,
    pub details: Vec<String>,
}

impl ButtonEvent {
    pub fn from_observation(observation: Observation) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: observation.key,
            gesture: observation.gesture,
            first_seen: observation.observed_at,
            last_seen: observation.observed_at,
            methods: vec![observation.method],
            confidence: observation.method.confidence(),
            details: vec![observation.detail],
        }
    }

    pub fn has_method(&self, method: DetectionMethod) -> bool {
        self.methods.contains(&method)
    }

    pub fn label(&self) -> &str {
        self.key.as_ref().map(|k| k.label.as_str()).unwrap_or("Unknown button")
    }

    /// One-line text rendering used by the CLI
    pub fn summary(&self) -> String {
        let methods: Vec<&str> = self.methods.iter().map(|m| m.as_str()).collect();
        format!(
            "{} {} ({}) via [{}] confidence={:?}",
            self.first_seen.format("%H:%M:%S%.3f"),
            self.label(),
            self.gesture.label(),
            methods.join(", "),
            self.confidence,
        )
    }
}

/// Change to the history pushed to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum EventUpdate {
    New(ButtonEvent),
    Merged(ButtonEvent),
}

impl EventUpdate {
    pub fn event(&self) -> &ButtonEvent {
        match self {
            EventUpdate::New(event) | EventUpdate::Merged(event) => event,
        }
    }
}

/// Lifecycle of one observer as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SourceStatus {
    Idle,
    Starting,
    Listening,
    Stopped,
    Error(String),
}

impl SourceStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SourceStatus::Starting | SourceStatus::Listening)
    }
}

impl Default for SourceStatus {
    fn default() -> Self {
        SourceStatus::Idle
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceStatus::Idle => f.write_str("idle"),
            SourceStatus::Starting => f.write_str("starting"),
            SourceStatus::Listening => f.write_str("listening"),
            SourceStatus::Stopped => f.write_str("stopped"),
            SourceStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Status signal rendered by the UI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStatus {
    pub logcat: SourceStatus,
    pub input: SourceStatus,
    pub accessibility: SourceStatus,
    pub events_seen: u64,
}

impl DetectorStatus {
    pub fn get(&self, method: DetectionMethod) -> &SourceStatus {
        match method {
            DetectionMethod::Logcat => &self.logcat,
            DetectionMethod::InputEvent => &self.input,
            DetectionMethod::Accessibility => &self.accessibility,
        }
    }

    pub fn set(&mut self, method: DetectionMethod, status: SourceStatus) {
        match method {
            DetectionMethod::Logcat => self.logcat = status,
            DetectionMethod::InputEvent => self.input = status,
            DetectionMethod::Accessibility => self.accessibility = status,
        }
    }

    pub fn any_active(&self) -> bool {
        DetectionMethod::ALL.iter().any(|m| self.get(*m).is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_mappings_differ_between_android_and_evdev() {
        assert_eq!(KeyAction::from_android_action(0), Some(KeyAction::Down));
        assert_eq!(KeyAction::from_evdev_value(0), Some(KeyAction::Up));
        assert_eq!(KeyAction::from_android_action(7), None);
    }

    #[test]
    fn test_method_confidence() {
        assert_eq!(DetectionMethod::Logcat.confidence(), Confidence::High);
        assert_eq!(DetectionMethod::Accessibility.confidence(), Confidence::Low);
        assert!(Confidence::High > Confidence::Low);
    }

    #[test]
    fn test_status_accessors() {
        let mut status = DetectorStatus::default();
        assert!(!status.any_active());
        status.set(DetectionMethod::InputEvent, SourceStatus::Listening);
        assert_eq!(status.get(DetectionMethod::InputEvent), &SourceStatus::Listening);
        assert!(status.any_active());
    }
}
