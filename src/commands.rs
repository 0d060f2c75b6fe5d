use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::detector::Detector;
use crate::events::{ButtonEvent, DetectorStatus, PenKey};
use crate::input::{self, InputDeviceInfo};
use crate::replay::{self, ReplayReport};

/// Build a detector with the sources enabled in `settings`
pub async fn create_detector(settings: &Settings) -> Result<Arc<Detector>, String> {
    Detector::from_settings(settings)
        .await
        .map(Arc::new)
        .map_err(|e| format!("Failed to create detector: {}", e))
}

/// Start detection on every enabled source
pub async fn start_detection(detector: &Arc<Detector>) -> Result<(), String> {
    detector
        .start()
        .await
        .map_err(|e| format!("Failed to start detection: {}", e))
}

/// Stop detection
pub async fn stop_detection(detector: &Arc<Detector>) -> Result<(), String> {
    detector
        .stop()
        .await
        .map_err(|e| format!("Failed to stop detection: {}", e))
}

/// Get the merged event history, oldest first
pub async fn get_history(detector: &Arc<Detector>) -> Result<Vec<ButtonEvent>, String> {
    Ok(detector.history().await)
}

pub async fn clear_history(detector: &Arc<Detector>) -> Result<(), String> {
    detector.clear_history().await;
    Ok(())
}

/// Get per-source status
pub async fn get_status(detector: &Arc<Detector>) -> Result<DetectorStatus, String> {
    Ok(detector.status())
}

/// Effective key table after overrides
pub fn list_keys(settings: &Settings) -> Result<Vec<PenKey>, String> {
    Ok(settings.keymap().iter().cloned().collect())
}

/// List input devices exposing stylus buttons
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>, String> {
    input::list_stylus_devices().map_err(|e| format!("Failed to list input devices: {}", e))
}

/// Replay saved logcat and accessibility dumps
pub fn replay_dumps(
    settings: &Settings,
    log: Option<PathBuf>,
    accessibility: Option<PathBuf>,
) -> Result<ReplayReport, String> {
    replay::replay_files(settings, log.as_deref(), accessibility.as_deref()).map_err(|e| format!("Replay failed: {}", e))
}
