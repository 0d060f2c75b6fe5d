use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::events::{ButtonEvent, Gesture, Observation, PenKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Same-method repeats closer than this are dropped
    pub dedup_window: Duration,
    /// Other-method evidence closer than this joins the existing entry
    pub merge_window: Duration,
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_millis(crate::events::DEFAULT_DEDUP_WINDOW_MS),
            merge_window: Duration::from_millis(crate::events::DEFAULT_MERGE_WINDOW_MS),
            limit: crate::events::DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// What `EventHistory::record` did with an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    New(Uuid),
    Merged(Uuid),
    /// Spurious repeat of the given entry, dropped
    Duplicate(Uuid),
}

impl Recorded {
    pub fn id(&self) -> Uuid {
        match self {
            Recorded::New(id) | Recorded::Merged(id) | Recorded::Duplicate(id) => *id,
        }
    }
}

/// Ordered, deduplicated button press history
#[derive(Debug, Clone, Default)]
pub struct EventHistory {
    config: HistoryConfig,
    /// Sorted by `first_seen`
    events: Vec<ButtonEvent>,
}

fn keys_compatible(a: &Option<PenKey>, b: &Option<PenKey>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.code == b.code,
        _ => true,
    }
}

/// Distance from `at` to the `[first_seen, last_seen]` span of an entry
fn gap(event: &ButtonEvent, at: DateTime<Utc>) -> TimeDelta {
    if at < event.first_seen {
        event.first_seen - at
    } else if at > event.last_seen {
        at - event.last_seen
    } else {
        TimeDelta::zero()
    }
}

fn within(delta: TimeDelta, window: Duration) -> bool {
    delta.to_std().map_or(true, |d| d <= window)
}

impl EventHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self { config, events: Vec::new() }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn record(&mut self, observation: Observation) -> Recorded {
        let at = observation.observed_at;

        // Nearest compatible entry the observation's method already contributed to
        let duplicate = self
            .events
            .iter()
            .filter(|e| e.has_method(observation.method) && keys_compatible(&e.key, &observation.key))
            .map(|e| (gap(e, at), e.id))
            .filter(|(d, _)| within(*d, self.config.dedup_window))
            .min_by_key(|(d, _)| *d);
        if let Some((_, id)) = duplicate {
            log::debug!("Dropped repeat from {} for event {}", observation.method, id);
            return Recorded::Duplicate(id);
        }

        // A method reports presses in order, so it cannot join a press older
        // than one it already joined
        let claimed = self
            .events
            .iter()
            .filter(|e| e.has_method(observation.method))
            .map(|e| e.first_seen)
            .max();
        let merge_target = self
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.has_method(observation.method) && keys_compatible(&e.key, &observation.key))
            .filter(|(_, e)| claimed.map_or(true, |claimed| e.first_seen > claimed))
            .map(|(idx, e)| (gap(e, at), idx))
            .filter(|(d, _)| within(*d, self.config.merge_window))
            .min_by_key(|(d, _)| *d)
            .map(|(_, idx)| idx);

        if let Some(idx) = merge_target {
            let id = Self::merge_into(&mut self.events[idx], observation);
            self.resort();
            return Recorded::Merged(id);
        }

        let event = ButtonEvent::from_observation(observation);
        let id = event.id;
        let pos = self.events.partition_point(|e| e.first_seen <= event.first_seen);
        self.events.insert(pos, event);
        while self.events.len() > self.config.limit {
            let dropped = self.events.remove(0);
            log::trace!("History full, dropped {}", dropped.id);
        }
        Recorded::New(id)
    }

    fn merge_into(event: &mut ButtonEvent, observation: Observation) -> Uuid {
        event.methods.push(observation.method);
        event.confidence = event.confidence.max(observation.method.confidence());
        event.first_seen = event.first_seen.min(observation.observed_at);
        event.last_seen = event.last_seen.max(observation.observed_at);
        if event.key.is_none() {
            event.key = observation.key;
        }
        if event.gesture == Gesture::Inferred {
            event.gesture = observation.gesture;
        }
        event.details.push(observation.detail);
        event.id
    }

    fn resort(&mut self) {
        self.events.sort_by_key(|e| e.first_seen);
    }

    pub fn events(&self) -> &[ButtonEvent] {
        &self.events
    }

    pub fn get(&self, id: &Uuid) -> Option<&ButtonEvent> {
        self.events.iter().find(|e| e.id == *id)
    }

    pub fn latest(&self) -> Option<&ButtonEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
