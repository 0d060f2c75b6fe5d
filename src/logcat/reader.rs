use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::parser::{parse_log_line, LogMatch, LogRecord, LogYear, PenLogMatcher};
use crate::events::{DetectionMethod, Observation, PressClassifier, PressOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogcatMetrics {
    pub lines_read: u64,
    pub pen_lines: u64,
    pub unparsed_lines: u64,
    pub unknown_codes: u64,
    pub separators: u64,
    /// Pen lines dated before the cutoff
    #[serde(default)]
    pub stale_lines: u64,
}

/// Turns logcat lines into pen observations
#[derive(Debug, Clone)]
pub struct LogcatReader {
    matcher: PenLogMatcher,
    classifier: PressClassifier,
    metrics: LogcatMetrics,
    clock: Option<LogYear>,
    not_before: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl LogcatReader {
    /// Without a clock every line is stamped with the caller's fallback time
    pub fn new(matcher: PenLogMatcher, long_press: Duration) -> Self {
        Self {
            matcher,
            classifier: PressClassifier::new(long_press),
            metrics: LogcatMetrics::default(),
            clock: None,
            not_before: None,
            last_timestamp: None,
        }
    }

    /// Resolve threadtime stamps through `clock`
    pub fn with_clock(mut self, clock: LogYear) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Skip pen lines dated before `not_before`
    pub fn with_cutoff(mut self, not_before: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn metrics(&self) -> &LogcatMetrics {
        &self.metrics
    }

    /// Most recent timestamp resolved from the log itself
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    /// Process one raw line. `fallback_time` is used when the line carries no
    /// usable timestamp or the reader has no clock.
    pub fn process_line(&mut self, line: &str, fallback_time: DateTime<Utc>) -> Option<Observation> {
        self.metrics.lines_read += 1;

        let entry = match parse_log_line(line) {
            Some(LogRecord::Entry(entry)) => entry,
            Some(LogRecord::Separator(buffer)) => {
                self.metrics.separators += 1;
                log::debug!("logcat buffer started: {}", buffer);
                return None;
            }
            None => {
                self.metrics.unparsed_lines += 1;
                log::trace!("Unparsed logcat line: {}", line);
                return None;
            }
        };

        let logged_at = self.clock.as_mut().and_then(|clock| clock.resolve(&entry));
        if logged_at.is_some() {
            self.last_timestamp = logged_at;
        }

        let (key, action) = match self.matcher.match_line(&entry) {
            LogMatch::NotPen => return None,
            LogMatch::UnknownCode(code) => {
                self.metrics.unknown_codes += 1;
                log::debug!("Pen log line with unmapped keycode {}: {}", code, line);
                return None;
            }
            LogMatch::Pen { key, action } => (key, action),
        };

        self.metrics.pen_lines += 1;
        if let (Some(logged_at), Some(not_before)) = (logged_at, self.not_before) {
            if logged_at < not_before {
                self.metrics.stale_lines += 1;
                log::trace!("Skipped backlog line: {}", line);
                return None;
            }
        }
        let at = logged_at.unwrap_or(fallback_time);

        match self.classifier.feed(key.code, action, at) {
            PressOutcome::Press(gesture) => {
                log::debug!("logcat: {} {} ({})", key.label, gesture.label(), entry.tag);
                Some(Observation::new(DetectionMethod::Logcat, Some(key), gesture, line).at(at))
            }
            PressOutcome::Pending | PressOutcome::Ignored => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Gesture, KeyMap};
    use chrono::TimeDelta;

    fn reader() -> LogcatReader {
        let matcher = PenLogMatcher::new(crate::config::DEFAULT_PEN_TAG_PATTERN, KeyMap::default()).unwrap();
        LogcatReader::new(matcher, Duration::from_millis(500))
    }

    #[test]
    fn test_down_up_pair_yields_one_observation() {
        let mut r = reader().with_clock(LogYear::new(2026));
        let now = Utc::now();
        let down = "10-19 12:00:00.000  900  901 D LenovoPenService: keyCode=308 action=0";
        let up = "10-19 12:00:00.080  900  901 D LenovoPenService: keyCode=308 action=1";
        assert!(r.process_line(down, now).is_none());
        let obs = r.process_line(up, now).expect("observation on up");
        assert_eq!(obs.method, DetectionMethod::Logcat);
        assert_eq!(obs.gesture, Gesture::Click);
        assert_eq!(obs.key.unwrap().code, 308);
        assert_eq!(r.metrics().pen_lines, 2);
        assert_eq!(r.last_timestamp(), Some(obs.observed_at));
    }

    #[test]
    fn test_long_press_uses_log_timestamps() {
        let mut r = reader().with_clock(LogYear::new(2026));
        let now = Utc::now();
        r.process_line("10-19 12:00:00.000  900  901 D PenKey: keyCode=310 action=0", now);
        let obs = r.process_line("10-19 12:00:00.900  900  901 D PenKey: keyCode=310 action=1", now).unwrap();
        assert_eq!(obs.gesture, Gesture::LongPress);
        assert_ne!(obs.observed_at, now);
    }

    #[test]
    fn test_without_clock_uses_fallback_time() {
        let mut r = reader();
        let now = Utc::now();
        let obs = r.process_line("10-19 12:00:00.000  900  901 D PenKey: code=120", now).unwrap();
        assert_eq!(obs.observed_at, now);
        assert_eq!(r.last_timestamp(), None);
    }

    #[test]
    fn test_cutoff_skips_backlog() {
        let clock = LogYear::new(2026);
        let mut reference = reader().with_clock(clock);
        let first = reference
            .process_line("10-19 12:00:01.000  900  901 D PenKey: code=309", Utc::now())
            .unwrap()
            .observed_at;

        let mut r = reader().with_clock(clock).with_cutoff(first);
        let now = Utc::now();
        assert!(r.process_line("10-19 12:00:00.000  900  901 D PenKey: keyCode=309 action=0", now).is_none());
        assert!(r.process_line("10-19 12:00:00.900  900  901 D PenKey: keyCode=309 action=1", now).is_none());
        let obs = r.process_line("10-19 12:00:01.000  900  901 D PenKey: code=309", now).unwrap();
        assert_eq!(obs.gesture, Gesture::Click);
        assert_eq!(r.metrics().stale_lines, 2);

        // Brief lines carry no date and are never stale
        let brief = r.process_line("D/PenKey( 900): code=308", first - TimeDelta::hours(1));
        assert!(brief.is_some());
    }

    #[test]
    fn test_metrics_count_noise() {
        let mut r = reader();
        let now = Utc::now();
        r.process_line("--------- beginning of system", now);
        r.process_line("not a log line", now);
        r.process_line("10-19 12:00:00.000  900  901 D PenKey: keyCode=42 action=1", now);
        r.process_line("10-19 12:00:00.000  900  901 D Wifi: rssi=-40", now);
        let m = r.metrics();
        assert_eq!(m.lines_read, 4);
        assert_eq!(m.separators, 1);
        assert_eq!(m.unparsed_lines, 1);
        assert_eq!(m.unknown_codes, 1);
        assert_eq!(m.pen_lines, 0);
    }
}
