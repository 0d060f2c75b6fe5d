use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use penplus_probe_lib::detector::{EventHistory, HistoryConfig, Recorded};
use penplus_probe_lib::events::{Confidence, DetectionMethod, Gesture, KeyMap, Observation};

fn at(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(ms)
}

fn press(method: DetectionMethod, code: Option<u16>, ms: i64) -> Observation {
    let key = code.and_then(|c| KeyMap::default().lookup_code(c));
    let gesture = if key.is_some() { Gesture::Click } else { Gesture::Inferred };
    Observation::new(method, key, gesture, "test").at(at(ms))
}

#[test]
fn test_three_sources_collapse_to_one_press() {
    let mut history = EventHistory::default();
    let first = history.record(press(DetectionMethod::InputEvent, Some(309), 1000));
    let second = history.record(press(DetectionMethod::Logcat, Some(309), 1030));
    let third = history.record(press(DetectionMethod::Accessibility, None, 1250));

    assert!(matches!(first, Recorded::New(_)));
    assert_eq!(second, Recorded::Merged(first.id()));
    assert_eq!(third, Recorded::Merged(first.id()));
    assert_eq!(history.len(), 1);

    let event = history.latest().unwrap();
    assert_eq!(
        event.methods,
        vec![DetectionMethod::InputEvent, DetectionMethod::Logcat, DetectionMethod::Accessibility]
    );
    assert_eq!(event.confidence, Confidence::High);
    assert_eq!(event.gesture, Gesture::Click);
    assert_eq!(event.last_seen, at(1250));
}

#[test]
fn test_low_confidence_until_corroborated() {
    let mut history = EventHistory::default();
    history.record(press(DetectionMethod::Accessibility, None, 0));
    assert_eq!(history.events()[0].confidence, Confidence::Low);
    assert_eq!(history.events()[0].label(), "Unknown button");

    history.record(press(DetectionMethod::InputEvent, Some(308), 100));
    assert_eq!(history.events()[0].confidence, Confidence::High);
    assert_eq!(history.events()[0].label(), "Primary button");
}

#[test]
fn test_rapid_double_click_from_one_source() {
    let mut history = EventHistory::default();
    history.record(press(DetectionMethod::InputEvent, Some(308), 0));
    // Inside the dedup window: a bounce, not a second press
    let bounce = history.record(press(DetectionMethod::InputEvent, Some(308), 100));
    let second = history.record(press(DetectionMethod::InputEvent, Some(308), 350));
    assert!(matches!(bounce, Recorded::Duplicate(_)));
    assert!(matches!(second, Recorded::New(_)));
    assert_eq!(history.len(), 2);
}

#[test]
fn test_custom_windows() {
    let config = HistoryConfig {
        dedup_window: Duration::from_millis(10),
        merge_window: Duration::from_millis(50),
        limit: 10,
    };
    let mut history = EventHistory::new(config);
    history.record(press(DetectionMethod::Logcat, Some(310), 0));
    let late = history.record(press(DetectionMethod::InputEvent, Some(310), 80));
    assert!(matches!(late, Recorded::New(_)));
    assert_eq!(history.config().merge_window, Duration::from_millis(50));
}
