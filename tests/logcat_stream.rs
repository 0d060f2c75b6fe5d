use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use penplus_probe_lib::config::DEFAULT_PEN_TAG_PATTERN;
use penplus_probe_lib::events::{DetectionMethod, Gesture, KeyMap, KeyOverride};
use penplus_probe_lib::logcat::{LogYear, LogcatReader, PenLogMatcher};

fn reader(keymap: KeyMap) -> LogcatReader {
    let matcher = PenLogMatcher::new(DEFAULT_PEN_TAG_PATTERN, keymap).expect("pattern");
    LogcatReader::new(matcher, Duration::from_millis(500))
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[test]
fn test_threadtime_click_and_long_press() {
    let mut r = reader(KeyMap::default()).with_clock(LogYear::new(2024));
    let lines = [
        "--------- beginning of system",
        "06-01 09:15:00.000  2200  2210 D LenovoPenService: dispatchKey action=0 keyCode=308",
        "06-01 09:15:00.050  2200  2210 D LenovoPenService: dispatchKey action=1 keyCode=308",
        "06-01 09:15:01.000  2200  2210 D LenovoPenService: dispatchKey action=0 keyCode=310",
        "06-01 09:15:01.000  2200  2210 D LenovoPenService: dispatchKey action=0 keyCode=310 repeatCount=1",
        "06-01 09:15:01.700  2200  2210 D LenovoPenService: dispatchKey action=1 keyCode=310",
    ];
    let observations: Vec<_> = lines.iter().filter_map(|l| r.process_line(l, epoch())).collect();

    assert_eq!(observations.len(), 2);
    assert!(observations.iter().all(|o| o.method == DetectionMethod::Logcat));
    assert_eq!(observations[0].key.as_ref().unwrap().code, 308);
    assert_eq!(observations[0].gesture, Gesture::Click);
    assert_eq!(observations[1].key.as_ref().unwrap().code, 310);
    assert_eq!(observations[1].gesture, Gesture::LongPress);
    assert_eq!(observations[1].observed_at - observations[0].observed_at, TimeDelta::milliseconds(1650));

    let metrics = r.metrics();
    assert_eq!(metrics.lines_read, 6);
    assert_eq!(metrics.pen_lines, 5);
    assert_eq!(metrics.separators, 1);
}

#[test]
fn test_brief_format_uses_fallback_time() {
    let mut r = reader(KeyMap::default()).with_clock(LogYear::new(2024));
    let at = epoch() + TimeDelta::seconds(42);
    let observation = r.process_line("D/StylusButton( 777): KEYCODE_SYSRQ pressed", at).expect("press");
    assert_eq!(observation.key.unwrap().code, 120);
    assert_eq!(observation.observed_at, at);
}

#[test]
fn test_unknown_code_counted_not_reported() {
    let mut r = reader(KeyMap::default());
    assert!(r.process_line("D/PenService( 10): keyCode=4 action=1", epoch()).is_none());
    assert!(r.process_line("I/ActivityManager( 10): keyCode=308", epoch()).is_none());
    assert!(r.process_line("not a log line", epoch()).is_none());
    assert_eq!(r.metrics().unknown_codes, 1);
    assert_eq!(r.metrics().unparsed_lines, 1);
}

#[test]
fn test_overridden_code_is_recognised() {
    let keymap = KeyMap::with_overrides(&[KeyOverride {
        code: 600,
        name: Some("PEN_SIDE".into()),
        label: Some("Side button".into()),
        replaces: Some(311),
    }]);
    let mut r = reader(keymap);
    let observation = r.process_line("D/PenService( 10): keyCode=600", epoch()).expect("press");
    assert_eq!(observation.key.unwrap().label, "Side button");
    assert!(r.process_line("D/PenService( 10): keyCode=311", epoch()).is_none());
}
