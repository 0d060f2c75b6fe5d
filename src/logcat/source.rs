use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::{mpsc, watch};

use super::parser::{LogYear, PenLogMatcher};
use super::reader::{LogcatMetrics, LogcatReader};
use crate::config::Settings;
use crate::detector::source::{EventSource, ObservationSink, SourceResult, SourceSession};
use crate::events::DetectionMethod;
use crate::process::LineProcess;

/// Observer reading the privileged log stream
pub struct LogcatSource {
    command: Vec<String>,
    matcher: PenLogMatcher,
    long_press: Duration,
    metrics_tx: Arc<watch::Sender<LogcatMetrics>>,
    metrics_rx: watch::Receiver<LogcatMetrics>,
    session: Option<SourceSession>,
}

impl LogcatSource {
    pub fn new(command: Vec<String>, matcher: PenLogMatcher, long_press: Duration) -> Self {
        let (metrics_tx, metrics_rx) = watch::channel(LogcatMetrics::default());
        Self {
            command,
            matcher,
            long_press,
            metrics_tx: Arc::new(metrics_tx),
            metrics_rx,
            session: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> super::Result<Self> {
        let matcher = PenLogMatcher::new(&settings.pen_tag_pattern, settings.keymap())?;
        Ok(Self::new(settings.logcat_command.clone(), matcher, settings.long_press()))
    }

    pub fn metrics_receiver(&self) -> watch::Receiver<LogcatMetrics> {
        self.metrics_rx.clone()
    }
}

#[async_trait::async_trait]
impl EventSource for LogcatSource {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Logcat
    }

    async fn start(&mut self, sink: ObservationSink) -> SourceResult<()> {
        if self.session.is_some() {
            return Err("Logcat source already running".into());
        }

        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        let mut process = LineProcess::new(self.command.clone());
        // Lines from before the start are backlog, not presses
        let started = Utc::now();
        let mut reader = LogcatReader::new(self.matcher.clone(), self.long_press)
            .with_clock(LogYear::live(started))
            .with_cutoff(started - TimeDelta::seconds(1));
        let metrics_tx = self.metrics_tx.clone();

        let task_handle = tokio::spawn(async move {
            let end = process
                .run(
                    &mut stop_rx,
                    |line| {
                        if let Some(observation) = reader.process_line(line, Utc::now()) {
                            sink.observe(observation);
                        }
                        metrics_tx.send_replace(reader.metrics().clone());
                    },
                    |state| sink.status(DetectionMethod::Logcat, state.to_source_status()),
                )
                .await;
            let metrics = reader.metrics();
            log::info!(
                "Logcat source finished ({:?}): {} lines, {} pen lines, {} unparsed, {} stale",
                end,
                metrics.lines_read,
                metrics.pen_lines,
                metrics.unparsed_lines,
                metrics.stale_lines
            );
            if process.decode_errors() > 0 {
                log::warn!("Logcat stream had {} non UTF-8 lines", process.decode_errors());
            }
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
            None => Err("Logcat source not running".into()),
        }
    }
}

impl Drop for LogcatSource {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task_handle.abort();
        }
    }
}

