//! Line-oriented subprocess runner shared by the logcat and accessibility observers
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::events::SourceStatus;

/// Lifecycle of the observed subprocess
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Idle,
    Spawning,
    Streaming,
    /// Process ended; exit code when the platform reports one
    Exited(Option<i32>),
    Failed(String),
}

impl ProcessState {
    pub fn can_transition_to(&self, next: &ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Idle, Spawning)
                | (Spawning, Streaming)
                | (Spawning, Failed(_))
                | (Streaming, Exited(_))
                | (Streaming, Failed(_))
                | (Exited(_), Spawning)
                | (Failed(_), Spawning)
        )
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ProcessState::Exited(_) | ProcessState::Failed(_))
    }

    pub fn to_source_status(&self) -> SourceStatus {
        match self {
            ProcessState::Idle => SourceStatus::Idle,
            ProcessState::Spawning => SourceStatus::Starting,
            ProcessState::Streaming => SourceStatus::Listening,
            ProcessState::Exited(Some(0)) | ProcessState::Exited(None) => SourceStatus::Stopped,
            ProcessState::Exited(Some(code)) => SourceStatus::Error(format!("process exited with code {}", code)),
            ProcessState::Failed(reason) => SourceStatus::Error(reason.clone()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to capture stdout of '{0}'")]
    NoStdout(String),

    #[error("Invalid process transition {from:?} -> {to:?}")]
    InvalidTransition { from: ProcessState, to: ProcessState },
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Runs a command and feeds every stdout line to a callback
pub struct LineProcess {
    command: Vec<String>,
    state: ProcessState,
    lines_read: u64,
    decode_errors: u64,
}

impl LineProcess {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            state: ProcessState::Idle,
            lines_read: 0,
            decode_errors: 0,
        }
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    pub fn transition(&mut self, next: ProcessState) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(ProcessError::InvalidTransition { from: self.state.clone(), to: next });
        }
        log::debug!("'{}' {:?} -> {:?}", self.command_line(), self.state, next);
        self.state = next;
        Ok(())
    }

    fn enter<S>(&mut self, next: ProcessState, on_state: &mut S)
    where
        S: FnMut(&ProcessState),
    {
        match self.transition(next) {
            Ok(()) => on_state(&self.state),
            Err(e) => log::warn!("{}", e),
        }
    }

    /// Spawn the command and stream its output until it exits or `stop_rx` fires.
    /// Returns the final state, which is always `Exited` or `Failed`.
    pub async fn run<L, S>(&mut self, stop_rx: &mut mpsc::Receiver<()>, mut on_line: L, mut on_state: S) -> ProcessState
    where
        L: FnMut(&str),
        S: FnMut(&ProcessState),
    {
        self.enter(ProcessState::Spawning, &mut on_state);

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::error!("{}", e);
                self.enter(ProcessState::Failed(e.to_string()), &mut on_state);
                return self.state.clone();
            }
        };

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill().await;
                let e = ProcessError::NoStdout(self.command_line());
                self.enter(ProcessState::Failed(e.to_string()), &mut on_state);
                return self.state.clone();
            }
        };

        self.enter(ProcessState::Streaming, &mut on_state);
        log::info!("Streaming output of '{}'", self.command_line());

        let mut reader = BufReader::new(stdout);
        let mut buf: Vec<u8> = Vec::with_capacity(512);

        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    log::info!("Stopping '{}'", self.command_line());
                    let _ = child.kill().await;
                    let code = child.wait().await.ok().and_then(|s| s.code());
                    self.enter(ProcessState::Exited(code), &mut on_state);
                    break;
                }
                read = reader.read_until(b'\n', &mut buf) => {
                    match read {
                        Ok(0) => {
                            let code = child.wait().await.ok().and_then(|s| s.code());
                            log::info!("'{}' exited with {:?}", self.command_line(), code);
                            self.enter(ProcessState::Exited(code), &mut on_state);
                            break;
                        }
                        Ok(_) => {
                            let line = match std::str::from_utf8(&buf) {
                                Ok(s) => s.to_string(),
                                Err(_) => {
                                    self.decode_errors += 1;
                                    String::from_utf8_lossy(&buf).to_string()
                                }
                            };
                            buf.clear();
                            let line = line.trim_end_matches(['\n', '\r']);
                            if line.trim().is_empty() {
                                continue;
                            }
                            self.lines_read += 1;
                            on_line(line);
                        }
                        Err(e) => {
                            log::warn!("Read error on '{}': {}", self.command_line(), e);
                            let _ = child.kill().await;
                            self.enter(ProcessState::Failed(format!("Read error: {}", e)), &mut on_state);
                            break;
                        }
                    }
                }
            }
        }

        self.state.clone()
    }

    fn spawn(&self) -> Result<tokio::process::Child> {
        let (program, args) = self.command.split_first().ok_or(ProcessError::EmptyCommand)?;
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn { command: self.command_line(), source })
    }
}
