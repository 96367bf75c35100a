use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use nlistmd::config::SimConfig;
use nlistmd::core::Simulation;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "nlistmd",
    about = "Short-range molecular dynamics with skin neighbor lists",
    version
)]
struct Cli {
    /// TOML run configuration
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override `max_steps` from the configuration
    #[arg(short, long, value_name = "N")]
    steps: Option<u64>,

    /// Override `output_dir` from the configuration
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

fn run(cli: Cli) -> nlistmd::error::Result<()> {
    let config = SimConfig::from_path(&cli.config)?
        .validate()?
        .with_overrides(cli.steps, cli.output_dir);
    info!(config = %cli.config.display(), "loaded configuration");

    let steps = config.max_steps;
    let mut sim = Simulation::new(config)?;
    let summary = sim.run(steps)?;
    if let Some(last) = summary.last {
        info!(
            step = last.step,
            time = last.time,
            kinetic = last.kinetic_energy,
            potential = last.potential_energy(),
            total = last.total_energy(),
            "final state"
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
