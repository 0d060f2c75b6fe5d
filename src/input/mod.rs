use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::detector::source::{EventSource, ObservationSink, SourceResult, SourceSession};
use crate::events::{DetectionMethod, KeyAction, KeyMap, Observation, PressClassifier, PressOutcome, SourceStatus};

#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux;

// Kernel key codes from input-event-codes.h
pub const BTN_STYLUS: u16 = 0x14b;
pub const BTN_STYLUS2: u16 = 0x14c;
pub const BTN_STYLUS3: u16 = 0x149;
pub const KEY_SYSRQ: u16 = 99;

/// Kernel code -> Android keycode, as in the platform's Generic.kl
pub const KEY_LAYOUT: [(u16, u16); 4] = [
    (BTN_STYLUS, 308),
    (BTN_STYLUS2, 309),
    (BTN_STYLUS3, 310),
    (KEY_SYSRQ, 120),
];

pub fn android_keycode(linux_code: u16) -> Option<u16> {
    KEY_LAYOUT
        .iter()
        .find(|(linux, _)| *linux == linux_code)
        .map(|(_, android)| *android)
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("No input device with stylus buttons found")]
    NoDevices,

    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Input events unsupported on this platform")]
    Unsupported,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InputError>;

/// Platform-neutral key transition, already translated to an Android keycode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub code: u16,
    pub action: KeyAction,
    pub device: String,
    pub observed_at: DateTime<Utc>,
}

/// Input device exposing at least one stylus button
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub buttons: Vec<String>,
}

/// Classifies raw key transitions from one device
#[derive(Debug, Clone)]
pub struct InputObserver {
    keymap: KeyMap,
    classifier: PressClassifier,
}

impl InputObserver {
    pub fn new(keymap: KeyMap, long_press: Duration) -> Self {
        Self { keymap, classifier: PressClassifier::new(long_press) }
    }

    pub fn process(&mut self, event: &RawKeyEvent) -> Option<Observation> {
        let key = self.keymap.lookup_code(event.code)?;
        match self.classifier.feed(event.code, event.action, event.observed_at) {
            PressOutcome::Press(gesture) => {
                let detail = format!("{} {:?} on {}", key.keycode_name(), event.action, event.device);
                log::debug!("input: {} {}", key.label, gesture.label());
                Some(Observation::new(DetectionMethod::InputEvent, Some(key), gesture, detail).at(event.observed_at))
            }
            PressOutcome::Pending | PressOutcome::Ignored => None,
        }
    }

    /// Forget pending downs after the kernel dropped events; their ups may be lost
    pub fn resync(&mut self) {
        self.classifier.reset();
    }
}

/// Enumerate devices that report stylus buttons
pub fn list_stylus_devices() -> Result<Vec<InputDeviceInfo>> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        Ok(linux::list_stylus_devices())
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        Err(InputError::Unsupported)
    }
}

/// Observer reading kernel input events
pub struct InputSource {
    device_paths: Vec<PathBuf>,
    keymap: KeyMap,
    long_press: Duration,
    sessions: Vec<SourceSession>,
}

impl InputSource {
    pub fn new(device_paths: Vec<PathBuf>, keymap: KeyMap, long_press: Duration) -> Self {
        Self { device_paths, keymap, long_press, sessions: Vec::new() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.input_devices.clone(), settings.keymap(), settings.long_press())
    }

    fn resolve_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.device_paths.is_empty() {
            return Ok(self.device_paths.clone());
        }
        let found: Vec<PathBuf> = list_stylus_devices()?.into_iter().map(|d| d.path).collect();
        if found.is_empty() {
            return Err(InputError::NoDevices);
        }
        Ok(found)
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn start_devices(&mut self, paths: Vec<PathBuf>, sink: &ObservationSink) -> Result<()> {
        let mut last_error = None;
        for path in paths {
            let observer = InputObserver::new(self.keymap.clone(), self.long_press);
            match linux::spawn_reader(path.clone(), observer, sink.clone()) {
                Ok(session) => {
                    log::info!("Watching input device {}", path.display());
                    self.sessions.push(session);
                }
                Err(e) => {
                    log::warn!("{}", e);
                    last_error = Some(e);
                }
            }
        }
        match (self.sessions.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            (true, None) => Err(InputError::NoDevices),
            _ => Ok(()),
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn start_devices(&mut self, _paths: Vec<PathBuf>, _sink: &ObservationSink) -> Result<()> {
        Err(InputError::Unsupported)
    }
}

#[async_trait::async_trait]
impl EventSource for InputSource {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::InputEvent
    }

    async fn start(&mut self, sink: ObservationSink) -> SourceResult<()> {
        if !self.sessions.is_empty() {
            return Err("Input source already running".into());
        }
        sink.status(DetectionMethod::InputEvent, SourceStatus::Starting);

        let started = self.resolve_paths().and_then(|paths| self.start_devices(paths, &sink));
        match started {
            Ok(()) => {
                sink.status(DetectionMethod::InputEvent, SourceStatus::Listening);
                Ok(())
            }
            Err(e) => {
                // Keeps the queued Starting from landing after the detector's error status
                sink.status(DetectionMethod::InputEvent, SourceStatus::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    async fn stop(&mut self) -> SourceResult<()> {
        if self.sessions.is_empty() {
            return Err("Input source not running".into());
        }
        for session in self.sessions.drain(..) {
            session.shutdown().await;
        }
        Ok(())
    }
}

impl Drop for InputSource {
    fn drop(&mut self) {
        for session in self.sessions.drain(..) {
            session.task_handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Gesture;
    use chrono::TimeDelta;

    fn raw(code: u16, action: KeyAction, at: DateTime<Utc>) -> RawKeyEvent {
        RawKeyEvent { code, action, device: "test-pen".into(), observed_at: at }
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(android_keycode(BTN_STYLUS), Some(308));
        assert_eq!(android_keycode(BTN_STYLUS3), Some(310));
        assert_eq!(android_keycode(30), None);
    }

    #[test]
    fn test_observer_classifies_press() {
        let mut observer = InputObserver::new(KeyMap::default(), Duration::from_millis(500));
        let t0 = Utc::now();
        assert!(observer.process(&raw(308, KeyAction::Down, t0)).is_none());
        assert!(observer.process(&raw(308, KeyAction::Repeat, t0)).is_none());
        let obs = observer.process(&raw(308, KeyAction::Up, t0 + TimeDelta::milliseconds(700))).unwrap();
        assert_eq!(obs.method, DetectionMethod::InputEvent);
        assert_eq!(obs.gesture, Gesture::LongPress);
        assert_eq!(obs.observed_at, t0 + TimeDelta::milliseconds(700));
        assert!(obs.detail.contains("test-pen"));
    }

    #[test]
    fn test_resync_forgets_lost_up() {
        let mut observer = InputObserver::new(KeyMap::default(), Duration::from_millis(500));
        let t0 = Utc::now();
        assert!(observer.process(&raw(309, KeyAction::Down, t0)).is_none());
        // The up for that down never arrives
        observer.resync();
        let t1 = t0 + TimeDelta::seconds(3);
        assert!(observer.process(&raw(309, KeyAction::Down, t1)).is_none());
        let obs = observer.process(&raw(309, KeyAction::Up, t1 + TimeDelta::milliseconds(60))).unwrap();
        assert_eq!(obs.gesture, Gesture::Click);
    }

    #[test]
    fn test_observer_ignores_unmapped_codes() {
        let mut observer = InputObserver::new(KeyMap::default(), Duration::from_millis(500));
        assert!(observer.process(&raw(4, KeyAction::Up, Utc::now())).is_none());
    }
}
