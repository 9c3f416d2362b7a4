//! Mission program for the RCS flight computer.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use flight_software::config::FlightConfig;
use flight_software::sequencer;

#[derive(Parser, Debug)]
#[command(name = "gnc_flight")]
#[command(about = "Sounding-rocket RCS guidance, navigation and control")]
struct Args {
    /// Flight configuration JSON; built-in defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the log directory from the configuration
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => FlightConfig::load(path)?,
        None => FlightConfig::default(),
    };
    if let Some(log_dir) = args.log_dir {
        config.log_dir = log_dir;
    }

    sequencer::run(config)
}
