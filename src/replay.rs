//! Offline replay of captured logcat and accessibility dumps.
//!
//! Lines go through the same readers the live sources use, and their
//! observations are reconciled by the same `EventHistory`. Logcat timestamps
//! drive the timeline; accessibility `EventTime` values (milliseconds since
//! boot) are anchored to the first pen line's timestamp.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::accessibility::{parse_accessibility_line, AccessibilityError, AccessibilityInferrer};
use crate::config::Settings;
use crate::detector::{EventHistory, Recorded};
use crate::events::{ButtonEvent, Observation};
use crate::logcat::{parse_log_line, LogRecord, LogYear, LogcatMetrics, LogcatReader, PenLogMatcher};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pen tag pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Accessibility rules error: {0}")]
    Accessibility(#[from] AccessibilityError),

    #[error("Nothing to replay")]
    NoInput,
}

pub type Result<T> = std::result::Result<T, ReplayError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStats {
    pub observations: u64,
    pub new_events: u64,
    pub merged: u64,
    pub duplicates: u64,
    pub accessibility_events: u64,
    pub logcat: LogcatMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub events: Vec<ButtonEvent>,
    pub stats: ReplayStats,
}

/// Replays in-memory dumps. `year` is the year of the log's last line;
/// earlier lines count back across any New Year the dump spans.
pub struct Replayer {
    matcher: PenLogMatcher,
    long_press: Duration,
    inferrer: AccessibilityInferrer,
    history: EventHistory,
    stats: ReplayStats,
    year: i32,
}

impl Replayer {
    pub fn new(settings: &Settings, year: i32) -> Result<Self> {
        Ok(Self {
            matcher: PenLogMatcher::new(&settings.pen_tag_pattern, settings.keymap())?,
            long_press: settings.long_press(),
            inferrer: AccessibilityInferrer::new(&settings.accessibility_rules, settings.accessibility_debounce())?,
            history: EventHistory::new(settings.history_config()),
            stats: ReplayStats::default(),
            year,
        })
    }

    /// Year of the log's first line
    fn starting_year(&self, log: &str) -> i32 {
        let mut rollovers = LogYear::new(0);
        for line in log.lines() {
            if let Some(LogRecord::Entry(entry)) = parse_log_line(line) {
                rollovers.advance(&entry);
            }
        }
        self.year - rollovers.year()
    }

    fn record(&mut self, observation: Observation) {
        self.stats.observations += 1;
        match self.history.record(observation) {
            Recorded::New(_) => self.stats.new_events += 1,
            Recorded::Merged(_) => self.stats.merged += 1,
            Recorded::Duplicate(_) => self.stats.duplicates += 1,
        }
    }

    pub fn run(mut self, log: Option<&str>, accessibility: Option<&str>) -> Result<ReplayReport> {
        if log.is_none() && accessibility.is_none() {
            return Err(ReplayError::NoInput);
        }

        let mut observations = Vec::new();
        let mut origin = None;

        if let Some(log) = log {
            let clock = LogYear::new(self.starting_year(log));
            let mut reader = LogcatReader::new(self.matcher.clone(), self.long_press).with_clock(clock);
            let mut last = DateTime::<Utc>::UNIX_EPOCH;
            for line in log.lines() {
                let pen_lines = reader.metrics().pen_lines;
                let observation = reader.process_line(line, last);
                if let Some(at) = reader.last_timestamp() {
                    last = at;
                }
                if origin.is_none() && reader.metrics().pen_lines > pen_lines {
                    origin = Some(last);
                }
                observations.extend(observation);
            }
            self.stats.logcat = reader.metrics().clone();
        }

        let origin = origin.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        if let Some(accessibility) = accessibility {
            let mut boot_origin: Option<u64> = None;
            let mut last = origin;
            for line in accessibility.lines() {
                let Some(event) = parse_accessibility_line(line) else {
                    continue;
                };
                if let Some(uptime) = event.event_time {
                    let base = *boot_origin.get_or_insert(uptime);
                    let offset = i64::try_from(uptime.saturating_sub(base)).unwrap_or(i64::MAX);
                    last = origin + TimeDelta::milliseconds(offset);
                }
                if let Some(observation) = self.inferrer.infer(&event, last) {
                    observations.push(observation);
                }
            }
            self.stats.accessibility_events = self.inferrer.events_seen();
        }

        // Feed in time order so merges see their neighbours
        observations.sort_by_key(|o| o.observed_at);
        for observation in observations {
            self.record(observation);
        }

        log::info!(
            "Replay finished: {} observations, {} events, {} merged, {} duplicates",
            self.stats.observations,
            self.history.len(),
            self.stats.merged,
            self.stats.duplicates
        );

        Ok(ReplayReport { events: self.history.events().to_vec(), stats: self.stats })
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| ReplayError::Io { path: path.to_path_buf(), source })
}

/// Replay dump files, resolving logcat timestamps against the current year
pub fn replay_files(settings: &Settings, log: Option<&Path>, accessibility: Option<&Path>) -> Result<ReplayReport> {
    let log_text = log.map(read).transpose()?;
    let accessibility_text = accessibility.map(read).transpose()?;
    Replayer::new(settings, Utc::now().year())?.run(log_text.as_deref(), accessibility_text.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DetectionMethod, Gesture};
    use chrono::Local;

    const LOG: &str = "\
--------- beginning of main
03-14 10:00:00.000  1234  1250 D PenService: onKeyEvent action=0 keyCode=308
03-14 10:00:00.080  1234  1250 D PenService: onKeyEvent action=1 keyCode=308
03-14 10:00:05.000  1234  1250 I ActivityManager: unrelated
03-14 10:00:05.000  1234  1250 D PenService: onKeyEvent action=0 keyCode=309
03-14 10:00:05.900  1234  1250 D PenService: onKeyEvent action=1 keyCode=309
";

    const EVENTS: &str = "\
EventType: TYPE_WINDOW_STATE_CHANGED; EventTime: 5000100; PackageName: com.lenovo.pennotes; Text: []
EventType: TYPE_VIEW_CLICKED; EventTime: 5002000; PackageName: com.android.launcher; Text: [Home]
";

    #[test]
    fn test_replay_merges_across_sources() {
        let report = Replayer::new(&Settings::default(), 2024)
            .unwrap()
            .run(Some(LOG), Some(EVENTS))
            .unwrap();

        assert_eq!(report.events.len(), 2);
        let first = &report.events[0];
        assert_eq!(first.key.as_ref().unwrap().code, 308);
        assert_eq!(first.gesture, Gesture::Click);
        // The window change lands before the key-up that completes the click
        assert_eq!(first.methods, vec![DetectionMethod::Accessibility, DetectionMethod::Logcat]);

        let second = &report.events[1];
        assert_eq!(second.key.as_ref().unwrap().code, 309);
        assert_eq!(second.gesture, Gesture::LongPress);
        assert_eq!(second.methods, vec![DetectionMethod::Logcat]);

        assert_eq!(report.stats.merged, 1);
        assert_eq!(report.stats.accessibility_events, 2);
        assert_eq!(report.stats.logcat.separators, 1);
    }

    #[test]
    fn test_accessibility_anchored_to_first_pen_line() {
        let log = format!("03-14 06:12:00.000  1000  1000 I ActivityManager: boot completed\n{}", LOG);
        let report = Replayer::new(&Settings::default(), 2024)
            .unwrap()
            .run(Some(&log), Some(EVENTS))
            .unwrap();
        assert_eq!(report.events.len(), 2);
        assert_eq!(report.events[0].methods, vec![DetectionMethod::Accessibility, DetectionMethod::Logcat]);
        assert_eq!(report.stats.merged, 1);
    }

    #[test]
    fn test_dump_across_new_year_stays_in_order() {
        let log = "\
12-31 23:59:58.000  1234  1250 D PenService: keyCode=308
01-01 00:00:02.000  1234  1250 D PenService: keyCode=309
";
        let report = Replayer::new(&Settings::default(), 2025).unwrap().run(Some(log), None).unwrap();
        assert_eq!(report.events.len(), 2);
        let first = &report.events[0];
        let second = &report.events[1];
        assert_eq!(first.key.as_ref().unwrap().code, 308);
        assert_eq!(second.key.as_ref().unwrap().code, 309);
        assert_eq!(first.first_seen.with_timezone(&Local).year(), 2024);
        assert_eq!(second.first_seen.with_timezone(&Local).year(), 2025);
        assert_eq!(second.first_seen - first.first_seen, TimeDelta::seconds(4));
    }

    #[test]
    fn test_accessibility_only_replay() {
        let report = Replayer::new(&Settings::default(), 2024).unwrap().run(None, Some(EVENTS)).unwrap();
        assert_eq!(report.events.len(), 1);
        assert!(report.events[0].key.is_none());
        assert_eq!(report.events[0].gesture, Gesture::Inferred);
    }

    #[test]
    fn test_empty_input_rejected() {
        let replayer = Replayer::new(&Settings::default(), 2024).unwrap();
        assert!(matches!(replayer.run(None, None), Err(ReplayError::NoInput)));
    }

    #[test]
    fn test_missing_file() {
        let err = replay_files(&Settings::default(), Some(Path::new("/nonexistent/log.txt")), None).unwrap_err();
        assert!(matches!(err, ReplayError::Io { .. }));
    }
}
