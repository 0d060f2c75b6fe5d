pub mod parser;
pub mod reader;
pub mod source;

pub use parser::{parse_log_line, LogLine, LogMatch, LogRecord, LogYear, PenLogMatcher};
pub use reader::{LogcatMetrics, LogcatReader};
pub use source::LogcatSource;

/// Default log command; needs READ_LOGS or root on the device.
/// `-T 1` skips the buffered backlog.
pub const DEFAULT_LOGCAT_COMMAND: [&str; 5] = ["logcat", "-v", "threadtime", "-T", "1"];

#[derive(Debug, thiserror::Error)]
pub enum LogcatError {
    #[error("Invalid pen tag pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, LogcatError>;
