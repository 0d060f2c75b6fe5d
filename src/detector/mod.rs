pub mod history;
pub mod manager;
pub mod source;

pub use history::{EventHistory, HistoryConfig, Recorded};
pub use manager::Detector;
pub use source::{EventSource, ObservationSink, SourceMessage};

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Detector already running")]
    AlreadyRunning,

    #[error("Detector not running")]
    NotRunning,

    #[error("Detector was stopped and cannot be restarted")]
    Stopped,

    #[error("Logcat source error: {0}")]
    Logcat(#[from] crate::logcat::LogcatError),

    #[error("Accessibility source error: {0}")]
    Accessibility(#[from] crate::accessibility::AccessibilityError),
}

pub type Result<T> = std::result::Result<T, DetectorError>;
