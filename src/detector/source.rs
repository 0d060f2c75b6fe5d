use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use crate::events::{DetectionMethod, Observation, SourceStatus};

pub type SourceResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Messages flowing from observers to the detector
#[derive(Debug, Clone)]
pub enum SourceMessage {
    Observation(Observation),
    Status { method: DetectionMethod, status: SourceStatus },
}

/// Handle observers use to report evidence and lifecycle changes
#[derive(Debug, Clone)]
pub struct ObservationSink {
    tx: mpsc::UnboundedSender<SourceMessage>,
}

impl ObservationSink {
    pub fn new(tx: mpsc::UnboundedSender<SourceMessage>) -> Self {
        Self { tx }
    }

    pub fn observe(&self, observation: Observation) {
        if self.tx.send(SourceMessage::Observation(observation)).is_err() {
            log::debug!("Detector closed, observation dropped");
        }
    }

    pub fn status(&self, method: DetectionMethod, status: SourceStatus) {
        let _ = self.tx.send(SourceMessage::Status { method, status });
    }
}

/// One independent observer of pen button presses
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    fn method(&self) -> DetectionMethod;

    /// Start observing; evidence and status go to `sink`
    async fn start(&mut self, sink: ObservationSink) -> SourceResult<()>;

    async fn stop(&mut self) -> SourceResult<()>;
}

/// Background task of a running source
pub struct SourceSession {
    pub task_handle: tokio::task::JoinHandle<()>,
    pub stop_tx: mpsc::Sender<()>,
}

impl SourceSession {
    /// Signal the task and wait for it to finish (with timeout)
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(()).await;
        if timeout(Duration::from_secs(2), self.task_handle).await.is_err() {
            log::warn!("Source task did not stop within 2s");
        }
    }
}
