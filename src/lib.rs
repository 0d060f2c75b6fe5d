pub mod events;
pub mod process;
pub mod logcat;
pub mod input;
pub mod accessibility;
pub mod detector;
pub mod replay;
pub mod commands;
pub mod config;
pub mod cli;

use clap::Parser;

pub fn run() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    .format_timestamp_millis()
    .init();

  let cli = cli::Cli::parse();
  if let Err(err) = cli.execute() {
    eprintln!("penplus-probe: {:#}", err);
    std::process::exit(1);
  }
}
