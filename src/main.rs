//! CLI entry point for `integtest-check`.
//!
//! Checks the outputs of a DAQ integration-test run:
//! - log files, against per-file exclusion and requirement patterns
//! - raw data files, against the configured record and fragment expectations
//! - a whole run directory, discovering both of the above
//!
//! # Usage
//!
//! ```bash
//! integtest-check logs --config integtest.toml run/log_*.txt
//! integtest-check data --config integtest.toml run/integtest_raw_*.hdf5
//! integtest-check run --config integtest.toml --op-env integtest run/
//! ```
//!
//! The exit status is non-zero when any check fails.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_integtest::artifacts::RunArtifacts;
use daq_integtest::config::IntegtestConfig;
use daq_integtest::{runner, tracing_setup};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "integtest-check")]
#[command(about = "Validate log and data files produced by a DAQ integration-test run", long_about = None)]
struct Cli {
    /// Configuration file (TOML); INTEGTEST_* environment variables override it
    #[arg(long, global = true, default_value = daq_integtest::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check log files
    Logs {
        /// Log files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Check raw data files
    Data {
        /// HDF5 files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Discover and check everything in a run directory
    Run {
        /// Operational environment prefix of the data files
        #[arg(long, default_value = "integtest")]
        op_env: String,

        /// Run directory
        run_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<bool> {
    let cli = Cli::parse();

    let config = IntegtestConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.validate()?;
    tracing_setup::init_from_config(&config)?;

    let passed = match cli.command {
        Commands::Logs { files } => runner::check_logs(&files, &config.log_checks)?,
        Commands::Data { files } => runner::check_data_files(&files, &config.data_checks)?,
        Commands::Run { op_env, run_dir } => {
            let artifacts = RunArtifacts::discover(&run_dir, &op_env)?;
            runner::check_run(&artifacts, &config)?
        }
    };

    if passed {
        tracing::info!("all checks passed");
    } else {
        tracing::warn!("one or more checks failed");
    }
    Ok(passed)
}
