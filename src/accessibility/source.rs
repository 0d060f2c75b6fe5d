use chrono::Utc;
use tokio::sync::mpsc;

use super::AccessibilityInferrer;
use crate::config::Settings;
use crate::detector::source::{EventSource, ObservationSink, SourceResult, SourceSession};
use crate::events::DetectionMethod;
use crate::process::LineProcess;

/// Observer inferring presses from accessibility events
pub struct AccessibilitySource {
    command: Vec<String>,
    inferrer: AccessibilityInferrer,
    session: Option<SourceSession>,
}

impl AccessibilitySource {
    pub fn new(command: Vec<String>, inferrer: AccessibilityInferrer) -> Self {
        Self { command, inferrer, session: None }
    }

    pub fn from_settings(settings: &Settings) -> super::Result<Self> {
        let inferrer = AccessibilityInferrer::new(&settings.accessibility_rules, settings.accessibility_debounce())?;
        Ok(Self::new(settings.accessibility_command.clone(), inferrer))
    }
}

#[async_trait::async_trait]
impl EventSource for AccessibilitySource {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Accessibility
    }

    async fn start(&mut self, sink: ObservationSink) -> SourceResult<()> {
        if self.session.is_some() {
            return Err("Accessibility source already running".into());
        }

        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        let mut process = LineProcess::new(self.command.clone());
        let mut inferrer = self.inferrer.clone();

        let task_handle = tokio::spawn(async move {
            let end = process
                .run(
                    &mut stop_rx,
                    |line| {
                        if let Some(observation) = inferrer.process_line(line, Utc::now()) {
                            sink.observe(observation);
                        }
                    },
                    |state| sink.status(DetectionMethod::Accessibility, state.to_source_status()),
                )
                .await;
            log::info!(
                "Accessibility source finished ({:?}): {} lines, {} events",
                end,
                process.lines_read(),
                inferrer.events_seen()
            );
        });

        self.session = Some(SourceSession { task_handle, stop_tx });
        Ok(())
    }

    async fn stop(&mut self) -> SourceResult<()> {
        match self.session.take() {
            Some(session) => {
                session.shutdown().await;
                Ok(())
            }
            None => Err("Accessibility source not running".into()),
        }
    }
}

impl Drop for AccessibilitySource {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task_handle.abort();
        }
    }
}
