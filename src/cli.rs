//! Command-line interface.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use crate::commands;
use crate::config::Settings;
use crate::events::{DetectionMethod, DetectorStatus, EventUpdate};

/// Watch Lenovo Pen Plus button presses through logcat, input events and accessibility events
#[derive(Parser, Debug)]
#[command(name = "penplus-probe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// JSON settings file; defaults apply to anything it leaves out
    #[arg(long, short, global = true, env = "PENPLUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the enabled observers and print presses until Ctrl-C
    Watch(WatchArgs),

    /// Run saved dumps through the parsers and print the merged history
    Replay {
        /// Captured `logcat -v threadtime` output
        #[arg(long)]
        log: Option<PathBuf>,

        /// Captured `uiautomator events` output
        #[arg(long)]
        accessibility: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List input devices that report stylus buttons
    Devices,

    /// Print the effective key table
    Keys,
}

#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Print one JSON object per line
    #[arg(long)]
    json: bool,

    #[arg(long)]
    no_logcat: bool,

    #[arg(long)]
    no_input: bool,

    #[arg(long)]
    no_accessibility: bool,

    /// Input device to read, repeatable; autodetected when omitted
    #[arg(long = "device", value_name = "PATH")]
    devices: Vec<PathBuf>,

    /// Hold time that turns a click into a long press
    #[arg(long, value_name = "MS")]
    long_press_ms: Option<u64>,
}

impl WatchArgs {
    /// Flags win over the settings file
    fn apply(&self, settings: &mut Settings) {
        if self.no_logcat {
            settings.sources.logcat = false;
        }
        if self.no_input {
            settings.sources.input = false;
        }
        if self.no_accessibility {
            settings.sources.accessibility = false;
        }
        if !self.devices.is_empty() {
            settings.input_devices = self.devices.clone();
        }
        if let Some(ms) = self.long_press_ms {
            settings.long_press_ms = ms;
        }
    }
}

impl Cli {
    pub fn execute(self) -> anyhow::Result<()> {
        let mut settings = Settings::load_or_default(self.config.as_deref()).context("Failed to load settings")?;

        match self.command {
            Commands::Watch(args) => {
                args.apply(&mut settings);
                settings.validate().context("Invalid settings")?;
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .context("Failed to start async runtime")?;
                runtime.block_on(watch(settings, args.json))
            }
            Commands::Replay { log, accessibility, json } => {
                let report = commands::replay_dumps(&settings, log, accessibility).map_err(|e| anyhow!(e))?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    for event in &report.events {
                        println!("{}", event.summary());
                    }
                    println!(
                        "{} events from {} observations ({} merged, {} duplicates dropped)",
                        report.events.len(),
                        report.stats.observations,
                        report.stats.merged,
                        report.stats.duplicates
                    );
                }
                Ok(())
            }
            Commands::Devices => {
                let devices = commands::list_input_devices().map_err(|e| anyhow!(e))?;
                if devices.is_empty() {
                    println!("No stylus input devices found");
                }
                for device in devices {
                    println!("{}  {}  buttons: {}", device.path.display(), device.name, device.buttons.join(", "));
                }
                Ok(())
            }
            Commands::Keys => {
                for key in commands::list_keys(&settings).map_err(|e| anyhow!(e))? {
                    println!("{:>4}  {:<34} {}", key.code, key.keycode_name(), key.label);
                }
                Ok(())
            }
        }
    }
}

fn print_update(update: &EventUpdate, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(update)?);
    } else {
        let marker = match update {
            EventUpdate::New(_) => "+",
            EventUpdate::Merged(_) => "~",
        };
        println!("{} {}", marker, update.event().summary());
    }
    Ok(())
}

fn print_status(status: &DetectorStatus, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::json!({ "kind": "status", "status": status }));
    } else {
        let parts: Vec<String> = DetectionMethod::ALL
            .iter()
            .map(|m| format!("{}={}", m, status.get(*m)))
            .collect();
        println!("status: {}", parts.join("  "));
    }
    Ok(())
}

async fn watch(settings: Settings, json: bool) -> anyhow::Result<()> {
    let detector = commands::create_detector(&settings).await.map_err(|e| anyhow!(e))?;
    let mut events = detector.subscribe_events();
    let mut status = detector.status_receiver();

    commands::start_detection(&detector).await.map_err(|e| anyhow!(e))?;
    log::info!("Watching for pen buttons, press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            update = events.recv() => match update {
                Ok(update) => print_update(&update, json)?,
                Err(RecvError::Lagged(missed)) => log::warn!("Output fell behind, {} updates skipped", missed),
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                print_status(&snapshot, json)?;
            }
        }
    }

    commands::stop_detection(&detector).await.map_err(|e| anyhow!(e))?;
    if !json {
        println!("{} presses recorded", commands::get_history(&detector).await.map_err(|e| anyhow!(e))?.len());
    }
    Ok(())
}
