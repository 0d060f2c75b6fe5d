use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use evdev::{Device, InputEventKind, Key, Synchronization};
use tokio::sync::mpsc;

use super::{android_keycode, InputDeviceInfo, InputError, InputObserver, RawKeyEvent, Result, KEY_LAYOUT};
use crate::detector::source::{ObservationSink, SourceSession};
use crate::events::{DetectionMethod, KeyAction, SourceStatus};

fn stylus_buttons(device: &Device) -> Vec<String> {
    let Some(keys) = device.supported_keys() else {
        return Vec::new();
    };
    KEY_LAYOUT
        .iter()
        .map(|(code, _)| Key::new(*code))
        .filter(|key| keys.contains(*key))
        .map(|key| format!("{:?}", key))
        .collect()
}

pub fn list_stylus_devices() -> Vec<InputDeviceInfo> {
    let mut devices: Vec<InputDeviceInfo> = evdev::enumerate()
        .filter_map(|(path, device)| {
            let buttons = stylus_buttons(&device);
            if buttons.is_empty() {
                return None;
            }
            Some(InputDeviceInfo {
                path,
                name: device.name().unwrap_or("unknown").to_string(),
                buttons,
            })
        })
        .collect();
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices
}

fn open(path: &Path) -> Result<Device> {
    Device::open(path).map_err(|source| InputError::Open { path: path.display().to_string(), source })
}

/// Open `path` and read its key events on a tokio task until stopped
pub fn spawn_reader(path: PathBuf, observer: InputObserver, sink: ObservationSink) -> Result<SourceSession> {
    let device = open(&path)?;
    let name = device.name().unwrap_or("unknown").to_string();
    let stream = device.into_event_stream()?;
    let (stop_tx, stop_rx) = mpsc::channel(1);

    let task_handle = tokio::spawn(async move {
        if let Err(e) = read_events(stream, &name, observer, &sink, stop_rx).await {
            log::error!("Input device {} failed: {}", path.display(), e);
            sink.status(DetectionMethod::InputEvent, SourceStatus::Error(format!("{}: {}", name, e)));
        } else {
            log::info!("Stopped reading input device {}", path.display());
        }
    });

    Ok(SourceSession { task_handle, stop_tx })
}

async fn read_events(
    mut stream: evdev::EventStream,
    name: &str,
    mut observer: InputObserver,
    sink: &ObservationSink,
    mut stop_rx: mpsc::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = stop_rx.recv() => return Ok(()),
            next = stream.next_event() => {
                let event = next?;
                let key = match event.kind() {
                    InputEventKind::Key(key) => key,
                    InputEventKind::Synchronization(sync) if sync == Synchronization::SYN_DROPPED => {
                        log::warn!("Input device {} dropped events", name);
                        observer.resync();
                        continue;
                    }
                    _ => continue,
                };
                let (Some(code), Some(action)) = (android_keycode(key.code()), KeyAction::from_evdev_value(event.value())) else {
                    continue;
                };
                let raw = RawKeyEvent {
                    code,
                    action,
                    device: name.to_string(),
                    observed_at: DateTime::<Utc>::from(event.timestamp()),
                };
                if let Some(observation) = observer.process(&raw) {
                    sink.observe(observation);
                }
            }
        }
    }
}
