use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::types::{Gesture, KeyAction};

/// Result of feeding one key transition to the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// Down recorded, waiting for the matching up
    Pending,
    /// Duplicate down or autorepeat
    Ignored,
    Press(Gesture),
}

/// Turns down/up transitions into clicks and long presses.
///
/// | action | pending down | outcome                     |
/// |--------|--------------|-----------------------------|
/// | Down   | no           | Pending                     |
/// | Down   | yes          | Ignored                     |
/// | Repeat | any          | Ignored                     |
/// | Up     | yes          | Click, or LongPress if held |
/// | Up     | no           | Click (orphan up)           |
///
/// The Pen Plus fires down and up together for a single click, which lands
/// in the Down-then-Up rows with zero hold time.
#[derive(Debug, Clone)]
pub struct PressClassifier {
    long_press: Duration,
    pending: HashMap<u16, DateTime<Utc>>,
}

impl PressClassifier {
    pub fn new(long_press: Duration) -> Self {
        Self { long_press, pending: HashMap::new() }
    }

    pub fn feed(&mut self, code: u16, action: KeyAction, at: DateTime<Utc>) -> PressOutcome {
        match (action, self.pending.get(&code).copied()) {
            (KeyAction::Repeat, _) | (KeyAction::Down, Some(_)) => PressOutcome::Ignored,
            (KeyAction::Down, None) => {
                self.pending.insert(code, at);
                PressOutcome::Pending
            }
            (KeyAction::Up, Some(down_at)) => {
                self.pending.remove(&code);
                let held = (at - down_at).to_std().unwrap_or(Duration::ZERO);
                if held >= self.long_press {
                    PressOutcome::Press(Gesture::LongPress)
                } else {
                    PressOutcome::Press(Gesture::Click)
                }
            }
            (KeyAction::Up, None) => PressOutcome::Press(Gesture::Click),
        }
    }

    pub fn is_pending(&self, code: u16) -> bool {
        self.pending.contains_key(&code)
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
