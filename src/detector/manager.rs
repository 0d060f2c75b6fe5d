use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};

use super::history::{EventHistory, HistoryConfig, Recorded};
use super::source::{EventSource, ObservationSink, SourceMessage};
use super::{DetectorError, Result};
use crate::accessibility::AccessibilitySource;
use crate::config::Settings;
use crate::events::{ButtonEvent, DetectionMethod, DetectorStatus, EventUpdate, Observation, SourceStatus};
use crate::input::InputSource;
use crate::logcat::LogcatSource;

const EVENT_CAPACITY: usize = 64;

/// Central reconciliation point: owns the history, runs the observers and
/// publishes merged events plus the status signal
pub struct Detector {
    history: Arc<RwLock<EventHistory>>,
    events_tx: broadcast::Sender<EventUpdate>,
    status_tx: Arc<watch::Sender<DetectorStatus>>,
    status_rx: watch::Receiver<DetectorStatus>,
    sink_tx: mpsc::UnboundedSender<SourceMessage>,
    sink_rx: Mutex<Option<mpsc::UnboundedReceiver<SourceMessage>>>,
    sources: Mutex<Vec<Box<dyn EventSource>>>,
    pump_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Detector {
    pub fn new(config: HistoryConfig) -> Self {
        let (events_tx, _events_rx) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, status_rx) = watch::channel(DetectorStatus::default());
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        Self {
            history: Arc::new(RwLock::new(EventHistory::new(config))),
            events_tx,
            status_tx: Arc::new(status_tx),
            status_rx,
            sink_tx,
            sink_rx: Mutex::new(Some(sink_rx)),
            sources: Mutex::new(Vec::new()),
            pump_handle: Mutex::new(None),
        }
    }

    /// Build a detector with every source enabled in `settings` registered
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let detector = Self::new(settings.history_config());
        if settings.sources.logcat {
            detector.add_source(Box::new(LogcatSource::from_settings(settings)?)).await;
        }
        if settings.sources.input {
            detector.add_source(Box::new(InputSource::from_settings(settings))).await;
        }
        if settings.sources.accessibility {
            detector.add_source(Box::new(AccessibilitySource::from_settings(settings)?)).await;
        }
        Ok(detector)
    }

    pub async fn add_source(&self, source: Box<dyn EventSource>) {
        log::debug!("Registered {} source", source.method());
        self.sources.lock().await.push(source);
    }

    pub fn sink(&self) -> ObservationSink {
        ObservationSink::new(self.sink_tx.clone())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EventUpdate> {
        self.events_tx.subscribe()
    }

    pub fn status_receiver(&self) -> watch::Receiver<DetectorStatus> {
        self.status_rx.clone()
    }

    pub fn status(&self) -> DetectorStatus {
        self.status_rx.borrow().clone()
    }

    /// Start the message pump and every registered source.
    /// A source that fails to start reports an error status; the others keep running.
    pub async fn start(&self) -> Result<()> {
        self.start_pump().await?;

        let sink = self.sink();
        let mut sources = self.sources.lock().await;
        if sources.is_empty() {
            log::warn!("No sources enabled");
        }
        for source in sources.iter_mut() {
            let method = source.method();
            log::info!("Starting {} source", method);
            if let Err(e) = source.start(sink.clone()).await {
                log::error!("Failed to start {} source: {}", method, e);
                self.status_tx.send_modify(|s| s.set(method, SourceStatus::Error(e.to_string())));
            }
        }
        Ok(())
    }

    /// Stop every source and the pump
    pub async fn stop(&self) -> Result<()> {
        {
            let mut sources = self.sources.lock().await;
            for source in sources.iter_mut() {
                let method = source.method();
                let was_active = self.status_rx.borrow().get(method).is_active();
                if let Err(e) = source.stop().await {
                    log::debug!("Stopping {} source: {}", method, e);
                }
                if was_active {
                    self.status_tx.send_modify(|s| s.set(method, SourceStatus::Stopped));
                }
            }
        }

        let handle = self.pump_handle.lock().await.take().ok_or(DetectorError::NotRunning)?;
        handle.abort();
        log::info!("Detector stopped");
        Ok(())
    }

    async fn start_pump(&self) -> Result<()> {
        let mut pump_guard = self.pump_handle.lock().await;
        if pump_guard.is_some() {
            return Err(DetectorError::AlreadyRunning);
        }
        // The receiver goes with the first pump, so a stopped detector stays stopped
        let mut rx = self.sink_rx.lock().await.take().ok_or(DetectorError::Stopped)?;

        let history = self.history.clone();
        let events_tx = self.events_tx.clone();
        let status_tx = self.status_tx.clone();

        *pump_guard = Some(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    SourceMessage::Observation(observation) => {
                        Self::apply(&history, &events_tx, &status_tx, observation).await;
                    }
                    SourceMessage::Status { method, status } => {
                        log::info!("{} source: {}", method, status);
                        status_tx.send_modify(|s| s.set(method, status));
                    }
                }
            }
            log::debug!("Observation channel closed");
        }));
        Ok(())
    }

    async fn apply(
        history: &RwLock<EventHistory>,
        events_tx: &broadcast::Sender<EventUpdate>,
        status_tx: &watch::Sender<DetectorStatus>,
        observation: Observation,
    ) -> Recorded {
        let (recorded, update) = {
            let mut history = history.write().await;
            let recorded = history.record(observation);
            let update = match recorded {
                Recorded::New(id) => history.get(&id).cloned().map(EventUpdate::New),
                Recorded::Merged(id) => history.get(&id).cloned().map(EventUpdate::Merged),
                Recorded::Duplicate(_) => None,
            };
            (recorded, update)
        };

        if let Some(update) = update {
            if matches!(update, EventUpdate::New(_)) {
                status_tx.send_modify(|s| s.events_seen += 1);
            }
            // No subscribers is fine
            let _ = events_tx.send(update);
        }
        recorded
    }

    /// Record an observation directly, bypassing the sources
    pub async fn ingest(&self, observation: Observation) -> Recorded {
        Self::apply(&self.history, &self.events_tx, &self.status_tx, observation).await
    }

    pub async fn history(&self) -> Vec<ButtonEvent> {
        self.history.read().await.events().to_vec()
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
        log::info!("History cleared");
    }

    pub async fn methods(&self) -> Vec<DetectionMethod> {
        self.sources.lock().await.iter().map(|s| s.method()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Gesture, KeyMap};
    use chrono::{TimeDelta, Utc};

    fn click(method: DetectionMethod, code: u16, at: chrono::DateTime<Utc>) -> Observation {
        Observation::new(method, KeyMap::default().lookup_code(code), Gesture::Click, "test").at(at)
    }

    #[tokio::test]
    async fn test_ingest_broadcasts_new_and_merged() {
        let detector = Detector::new(HistoryConfig::default());
        let mut events = detector.subscribe_events();
        let t0 = Utc::now();

        detector.ingest(click(DetectionMethod::Logcat, 308, t0)).await;
        detector.ingest(click(DetectionMethod::InputEvent, 308, t0 + TimeDelta::milliseconds(30))).await;
        detector.ingest(click(DetectionMethod::InputEvent, 308, t0 + TimeDelta::milliseconds(60))).await;

        assert!(matches!(events.recv().await.unwrap(), EventUpdate::New(_)));
        let merged = events.recv().await.unwrap();
        assert!(matches!(merged, EventUpdate::Merged(_)));
        assert_eq!(merged.event().methods.len(), 2);
        assert!(events.try_recv().is_err());
        assert_eq!(detector.status().events_seen, 1);
        assert_eq!(detector.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pump_routes_sink_messages() {
        let detector = Detector::new(HistoryConfig::default());
        let mut events = detector.subscribe_events();
        let mut status = detector.status_receiver();
        detector.start().await.unwrap();

        let sink = detector.sink();
        sink.status(DetectionMethod::Logcat, SourceStatus::Listening);
        sink.observe(click(DetectionMethod::Logcat, 309, Utc::now()));

        let update = events.recv().await.unwrap();
        assert_eq!(update.event().key.as_ref().unwrap().code, 309);
        status.wait_for(|s| s.logcat == SourceStatus::Listening).await.unwrap();

        detector.stop().await.unwrap();
        assert!(matches!(detector.stop().await, Err(DetectorError::NotRunning)));
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let detector = Detector::new(HistoryConfig::default());
        detector.start().await.unwrap();
        assert!(matches!(detector.start().await, Err(DetectorError::AlreadyRunning)));
        detector.clear_history().await;
        assert!(detector.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_restart_after_stop_rejected() {
        let detector = Detector::new(HistoryConfig::default());
        detector.start().await.unwrap();
        detector.stop().await.unwrap();
        let err = detector.start().await.unwrap_err();
        assert!(matches!(err, DetectorError::Stopped));
        assert_eq!(err.to_string(), "Detector was stopped and cannot be restarted");
    }
}
