pub mod debounce;
pub mod source;

pub use debounce::InferenceDebouncer;
pub use source::AccessibilitySource;

use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::events::{DetectionMethod, Gesture, Observation};

/// Prints accessibility events as text, one per line
pub const DEFAULT_ACCESSIBILITY_COMMAND: [&str; 2] = ["uiautomator", "events"];

static EVENT_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bEventType:\s*(?P<v>TYPE_[A-Z_]+)").expect("event type pattern"));
static EVENT_TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bEventTime:\s*(?P<v>\d+)").expect("event time pattern"));
static PACKAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bPackageName:\s*(?P<v>[^;\s\]]+)").expect("package pattern"));
static CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bClassName:\s*(?P<v>[^;\s\]]+)").expect("class pattern"));
static TEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bText:\s*\[(?P<v>[^\]]*)\]").expect("text pattern"));

#[derive(Debug, thiserror::Error)]
pub enum AccessibilityError {
    #[error("Invalid pattern in rule '{rule}': {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, AccessibilityError>;

/// Accessibility event as printed by `uiautomator events`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessibilityEvent {
    pub event_type: String,
    /// Milliseconds since boot
    pub event_time: Option<u64>,
    pub package: Option<String>,
    pub class_name: Option<String>,
    pub text: Option<String>,
}

/// Parse one line of `uiautomator events` output
pub fn parse_accessibility_line(line: &str) -> Option<AccessibilityEvent> {
    let event_type = EVENT_TYPE_RE.captures(line)?["v"].to_string();
    let field = |re: &Regex| {
        re.captures(line)
            .map(|c| c["v"].trim().to_string())
            .filter(|v| !v.is_empty() && v != "null")
    };

    Some(AccessibilityEvent {
        event_type,
        event_time: EVENT_TIME_RE.captures(line).and_then(|c| c["v"].parse().ok()),
        package: field(&PACKAGE_RE),
        class_name: field(&CLASS_RE),
        text: field(&TEXT_RE),
    })
}

/// Configured rule: which side effect implies a button press
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessibilityRule {
    /// Exact `TYPE_*` name, or `*` for any
    pub event_type: String,
    /// Regex on the package name
    pub package: String,
    /// Optional regex on the event text
    #[serde(default)]
    pub text: Option<String>,
    pub description: String,
}

pub fn default_rules() -> Vec<AccessibilityRule> {
    vec![
        AccessibilityRule {
            event_type: "TYPE_WINDOW_STATE_CHANGED".into(),
            package: r"(?i)^com\.lenovo\..*(pen|stylus|note)".into(),
            text: None,
            description: "Lenovo pen app brought to front".into(),
        },
        AccessibilityRule {
            event_type: "TYPE_WINDOW_STATE_CHANGED".into(),
            package: r"^com\.android\.systemui$".into(),
            text: Some(r"(?i)screenshot".into()),
            description: "Screenshot UI shown".into(),
        },
    ]
}

#[derive(Debug, Clone)]
struct InferenceRule {
    event_type: String,
    package: Regex,
    text: Option<Regex>,
    description: String,
}

impl InferenceRule {
    fn compile(rule: &AccessibilityRule) -> Result<Self> {
        let invalid = |source| AccessibilityError::InvalidPattern { rule: rule.description.clone(), source };
        Ok(Self {
            event_type: rule.event_type.clone(),
            package: Regex::new(&rule.package).map_err(invalid)?,
            text: rule.text.as_deref().map(Regex::new).transpose().map_err(invalid)?,
            description: rule.description.clone(),
        })
    }

    fn matches(&self, event: &AccessibilityEvent) -> bool {
        if self.event_type != "*" && self.event_type != event.event_type {
            return false;
        }
        let Some(package) = event.package.as_deref() else {
            return false;
        };
        if !self.package.is_match(package) {
            return false;
        }
        match &self.text {
            Some(text_re) => event.text.as_deref().map_or(false, |t| text_re.is_match(t)),
            None => true,
        }
    }
}

/// Infers button presses from accessibility side effects
#[derive(Debug, Clone)]
pub struct AccessibilityInferrer {
    rules: Vec<InferenceRule>,
    debouncer: InferenceDebouncer,
    events_seen: u64,
}

impl AccessibilityInferrer {
    pub fn new(rules: &[AccessibilityRule], debounce: Duration) -> Result<Self> {
        Ok(Self {
            rules: rules.iter().map(InferenceRule::compile).collect::<Result<Vec<_>>>()?,
            debouncer: InferenceDebouncer::new(debounce),
            events_seen: 0,
        })
    }

    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    pub fn infer(&mut self, event: &AccessibilityEvent, at: DateTime<Utc>) -> Option<Observation> {
        self.events_seen += 1;
        let rule = self.rules.iter().find(|r| r.matches(event))?;
        if !self.debouncer.accept(at) {
            return None;
        }
        let detail = format!(
            "{} ({} from {})",
            rule.description,
            event.event_type,
            event.package.as_deref().unwrap_or("?")
        );
        log::debug!("accessibility: {}", detail);
        Some(Observation::new(DetectionMethod::Accessibility, None, Gesture::Inferred, detail).at(at))
    }

    /// Parse and infer in one step
    pub fn process_line(&mut self, line: &str, at: DateTime<Utc>) -> Option<Observation> {
        let event = parse_accessibility_line(line)?;
        self.infer(&event, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const SCREENSHOT: &str = "EventType: TYPE_WINDOW_STATE_CHANGED; EventTime: 93475625; PackageName: com.android.systemui; MovementGranularity: 0; Action: 0; ContentChangeTypes: []; WindowChangeTypes: [] [ ClassName: android.widget.FrameLayout; Text: [Screenshot saved]; ContentDescription: null; ItemCount: -1; CurrentItemIndex: -1; Enabled: true ]; recordCount: 0";

    #[test]
    fn test_parse_uiautomator_line() {
        let event = parse_accessibility_line(SCREENSHOT).unwrap();
        assert_eq!(event.event_type, "TYPE_WINDOW_STATE_CHANGED");
        assert_eq!(event.event_time, Some(93475625));
        assert_eq!(event.package.as_deref(), Some("com.android.systemui"));
        assert_eq!(event.class_name.as_deref(), Some("android.widget.FrameLayout"));
        assert_eq!(event.text.as_deref(), Some("Screenshot saved"));
    }

    #[test]
    fn test_parse_rejects_non_event_lines() {
        assert!(parse_accessibility_line("Events of interest:").is_none());
        let sparse = parse_accessibility_line("EventType: TYPE_VIEW_CLICKED; PackageName: null; Text: []").unwrap();
        assert_eq!(sparse.package, None);
        assert_eq!(sparse.text, None);
    }

    #[test]
    fn test_rules_and_debounce() {
        let mut inferrer = AccessibilityInferrer::new(&default_rules(), Duration::from_millis(800)).unwrap();
        let base = Utc::now();
        let obs = inferrer.process_line(SCREENSHOT, base).expect("screenshot inferred");
        assert_eq!(obs.method, DetectionMethod::Accessibility);
        assert_eq!(obs.gesture, Gesture::Inferred);
        assert!(obs.key.is_none());
        assert!(inferrer.process_line(SCREENSHOT, base + TimeDelta::milliseconds(300)).is_none());
        assert!(inferrer.process_line(SCREENSHOT, base + TimeDelta::milliseconds(900)).is_some());
    }

    #[test]
    fn test_lenovo_package_rule() {
        let mut inferrer = AccessibilityInferrer::new(&default_rules(), Duration::from_millis(800)).unwrap();
        let line = "EventType: TYPE_WINDOW_STATE_CHANGED; EventTime: 1; PackageName: com.lenovo.penservice; [ ClassName: com.lenovo.penservice.QuickNoteActivity; Text: [] ]";
        assert!(inferrer.process_line(line, Utc::now()).is_some());
        let other = "EventType: TYPE_WINDOW_STATE_CHANGED; EventTime: 2; PackageName: com.android.settings; [ ClassName: x; Text: [Screenshot] ]";
        assert!(inferrer.process_line(other, Utc::now() + TimeDelta::seconds(5)).is_none());
        assert_eq!(inferrer.events_seen(), 2);
    }

    #[test]
    fn test_invalid_rule_pattern() {
        let rules = vec![AccessibilityRule {
            event_type: "*".into(),
            package: "(".into(),
            text: None,
            description: "broken".into(),
        }];
        let err = AccessibilityInferrer::new(&rules, Duration::from_millis(1)).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
