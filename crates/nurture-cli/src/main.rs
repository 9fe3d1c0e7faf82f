//! nurture - replay harness for the sync core
//!
//! ## Usage
//!
//! ```bash
//! # Play a scenario with default collection names
//! nurture replay demos/first-week.ron
//!
//! # Override collection/field names and the log filter
//! nurture replay demos/first-week.ron --config nurture.ron
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use nurture_client::CoreConfig;

mod scenario;

use scenario::{Replay, Scenario};

#[derive(Parser, Debug)]
#[command(name = "nurture")]
#[command(about = "Replay auth and document-store scenarios against the nurture sync core")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a RON scenario script and print every derived-state change
    Replay {
        /// Scenario file
        script: PathBuf,

        /// Core config (RON); defaults are used when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("nurture: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Replay { script, config } => {
            let config = CoreConfig::load_or_default(config.as_deref())?;
            let _log_guard = nurture_telemetry::init("nurture-cli", &config.log_filter);

            let scenario = Scenario::load(&script)?;
            let today = scenario
                .today
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            tracing::info!(name = %scenario.name, steps = scenario.steps.len(), "replaying");

            let transcript = Replay::new(config, today, scenario.manual_timestamps).run(scenario.steps);
            for line in transcript {
                println!("{line}");
            }
            Ok(())
        }
    }
}
