use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::events::{KeyAction, KeyMap, PenKey};

/// `MM-DD HH:MM:SS.mmm  PID  TID L Tag: message`
static THREADTIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<ts>\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d{3})\s+(?P<pid>\d+)\s+(?P<tid>\d+)\s+(?P<prio>[VDIWEFS])\s+(?P<tag>.*?)\s*:\s?(?P<msg>.*)$",
    )
    .expect("threadtime pattern")
});

/// `L/Tag( PID): message`
static BRIEF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<prio>[VDIWEFS])/(?P<tag>[^(]*?)\s*\(\s*(?P<pid>\d+)\):\s?(?P<msg>.*)$").expect("brief pattern")
});

static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-{9} beginning of (?P<buffer>\S+)").expect("separator pattern"));

static KEYCODE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:keycode|code)\s*[=:]\s*(?P<code>\d+)").expect("keycode pattern"));

static KEYCODE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bKEYCODE_(?P<name>[A-Z0-9_]+)").expect("keycode name pattern"));

static ACTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\baction\s*[=:]\s*(?P<action>ACTION_DOWN|ACTION_UP|ACTION_MULTIPLE|down|up|\d+)\b")
        .expect("action pattern")
});

static BARE_ACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bACTION_(?P<action>DOWN|UP|MULTIPLE)\b").expect("bare action pattern"));

static REPEAT_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\brepeatCount\s*=\s*(?P<count>\d+)").expect("repeat pattern"));

/// One parsed logcat entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// `MM-DD HH:MM:SS.mmm`, absent in brief format
    pub timestamp: Option<String>,
    pub pid: u32,
    pub tid: Option<u32>,
    pub priority: char,
    pub tag: String,
    pub message: String,
}

impl LogLine {
    /// Resolve the timestamp in local time; logcat omits the year
    pub fn timestamp_utc(&self, year: i32) -> Option<DateTime<Utc>> {
        let ts = self.timestamp.as_ref()?;
        let compact = ts.split_whitespace().collect::<Vec<_>>().join(" ");
        let naive = NaiveDateTime::parse_from_str(&format!("{}-{}", year, compact), "%Y-%m-%d %H:%M:%S%.3f").ok()?;
        naive.and_local_timezone(Local).earliest().map(|t| t.with_timezone(&Utc))
    }

    pub fn month(&self) -> Option<u32> {
        self.timestamp.as_ref()?.get(..2)?.parse().ok()
    }
}

/// Assigns years to logcat timestamps as a stream goes by.
/// A backwards jump of half a year or more in the month is taken as New Year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogYear {
    year: i32,
    last_month: Option<u32>,
    /// Live streams only: entries resolving past this belong to the previous year
    ceiling: Option<DateTime<Utc>>,
}

impl LogYear {
    pub fn new(year: i32) -> Self {
        Self { year, last_month: None, ceiling: None }
    }

    /// Clock for a stream starting at `now`
    pub fn live(now: DateTime<Utc>) -> Self {
        Self {
            year: now.with_timezone(&Local).year(),
            last_month: None,
            ceiling: Some(now + TimeDelta::days(1)),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Track the month of `line` without resolving it
    pub fn advance(&mut self, line: &LogLine) {
        let Some(month) = line.month() else {
            return;
        };
        if let Some(last) = self.last_month {
            if month + 6 <= last {
                self.year += 1;
            }
        }
        self.last_month = Some(month);
    }

    pub fn resolve(&mut self, line: &LogLine) -> Option<DateTime<Utc>> {
        self.advance(line);
        let at = line.timestamp_utc(self.year)?;
        match self.ceiling {
            Some(ceiling) if at > ceiling => {
                self.year -= 1;
                line.timestamp_utc(self.year)
            }
            _ => Some(at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Entry(LogLine),
    /// `--------- beginning of <buffer>`
    Separator(String),
}

/// Parse a single logcat line in threadtime or brief format
pub fn parse_log_line(line: &str) -> Option<LogRecord> {
    let line = line.trim_end();

    if let Some(caps) = SEPARATOR_RE.captures(line) {
        return Some(LogRecord::Separator(caps["buffer"].to_string()));
    }

    if let Some(caps) = THREADTIME_RE.captures(line) {
        return Some(LogRecord::Entry(LogLine {
            timestamp: Some(caps["ts"].to_string()),
            pid: caps["pid"].parse().ok()?,
            tid: caps["tid"].parse().ok(),
            priority: caps["prio"].chars().next()?,
            tag: caps["tag"].trim().to_string(),
            message: caps["msg"].to_string(),
        }));
    }

    if let Some(caps) = BRIEF_RE.captures(line) {
        return Some(LogRecord::Entry(LogLine {
            timestamp: None,
            pid: caps["pid"].parse().ok()?,
            tid: None,
            priority: caps["prio"].chars().next()?,
            tag: caps["tag"].trim().to_string(),
            message: caps["msg"].to_string(),
        }));
    }

    None
}

/// Classification of a log entry against the pen key table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMatch {
    NotPen,
    /// Pen line carrying a keycode outside the table
    UnknownCode(String),
    Pen { key: PenKey, action: KeyAction },
}

/// Decides whether a log entry is evidence of a pen button press
#[derive(Debug, Clone)]
pub struct PenLogMatcher {
    tag_pattern: Regex,
    keymap: KeyMap,
}

impl PenLogMatcher {
    pub fn new(tag_pattern: &str, keymap: KeyMap) -> Result<Self, regex::Error> {
        Ok(Self { tag_pattern: Regex::new(tag_pattern)?, keymap })
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn match_line(&self, line: &LogLine) -> LogMatch {
        if !self.tag_pattern.is_match(&line.tag) && !self.tag_pattern.is_match(&line.message) {
            return LogMatch::NotPen;
        }

        let key = if let Some(caps) = KEYCODE_NUMBER_RE.captures(&line.message) {
            let raw = &caps["code"];
            match raw.parse::<u16>().ok().and_then(|code| self.keymap.lookup_code(code)) {
                Some(key) => key,
                None => return LogMatch::UnknownCode(raw.to_string()),
            }
        } else if let Some(caps) = KEYCODE_NAME_RE.captures(&line.message) {
            let name = &caps["name"];
            match self.keymap.lookup_name(name) {
                Some(key) => key,
                None => return LogMatch::UnknownCode(format!("KEYCODE_{}", name)),
            }
        } else {
            return LogMatch::NotPen;
        };

        LogMatch::Pen { key, action: parse_action(&line.message) }
    }
}

/// Lines without an action are single-shot reports, treated as the up edge
fn parse_action(message: &str) -> KeyAction {
    let raw = ACTION_RE
        .captures(message)
        .or_else(|| BARE_ACTION_RE.captures(message))
        .map(|caps| caps["action"].to_ascii_uppercase());

    let action = match raw.as_deref() {
        Some("ACTION_DOWN") | Some("DOWN") => KeyAction::Down,
        Some("ACTION_UP") | Some("UP") => KeyAction::Up,
        Some("ACTION_MULTIPLE") | Some("MULTIPLE") => KeyAction::Repeat,
        Some(n) => n.parse::<i64>().ok().and_then(KeyAction::from_android_action).unwrap_or(KeyAction::Up),
        None => KeyAction::Up,
    };

    let repeat_count = REPEAT_COUNT_RE
        .captures(message)
        .and_then(|caps| caps["count"].parse::<u32>().ok())
        .unwrap_or(0);

    if action == KeyAction::Down && repeat_count > 0 {
        KeyAction::Repeat
    } else {
        action
    }
}
