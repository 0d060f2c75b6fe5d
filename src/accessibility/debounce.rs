use std::time::Duration;

use chrono::{DateTime, Utc};

/// Single debounce timer for inferred presses: once an inference is
/// accepted, everything inside the window after it is dropped.
#[derive(Debug, Clone)]
pub struct InferenceDebouncer {
    suppressing: bool,
    last_accepted: DateTime<Utc>,
    window: Duration,
}

impl InferenceDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            suppressing: false,
            last_accepted: DateTime::<Utc>::MIN_UTC,
            window,
        }
    }

    pub fn accept(&mut self, at: DateTime<Utc>) -> bool {
        if self.suppressing {
            let elapsed = (at - self.last_accepted).to_std().unwrap_or(Duration::ZERO);
            if elapsed < self.window {
                log::debug!("Accessibility inference debounced ({:?} after last)", elapsed);
                return false;
            }
        }
        self.suppressing = true;
        self.last_accepted = at;
        true
    }

    pub fn reset(&mut self) {
        self.suppressing = false;
    }
}
