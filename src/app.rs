//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - sets up logging
//! - loads dictionaries or builds the synthetic dataset
//! - fits every spatial bin and writes the fit records
//! - prints the summary

use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};

use crate::cli::{Command, DemoArgs, FitArgs};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `sedfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    let _logger = setup_logging(&cli.log_level)?;

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Demo(args) => handle_demo(args),
    }
}

/// Log to stderr at `level`, unless `RUST_LOG` is set.
fn setup_logging(level: &str) -> Result<LoggerHandle, AppError> {
    Logger::try_with_env_or_str(level)
        .and_then(|logger| logger.log_to_stderr().start())
        .map_err(|e| AppError::new(2, format!("Logger initialization failed: {e}")))
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = pipeline::fit_config_from_args(&args.model);
    let run = pipeline::run_config_from_args(&args);
    let output = pipeline::run_fit(&run, &config, args.model.method)?;

    let title = format!(
        "{} {} (low-energy range {} GeV)",
        run.input.as_str(),
        run.data_class.as_str(),
        run.energy_range.label()
    );
    println!(
        "{}",
        crate::report::format_run_summary(&title, &output.grids, config.reference_energy)
    );
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = pipeline::fit_config_from_args(&args.model);
    let output = pipeline::run_demo(&args, &config)?;

    let title = format!(
        "synthetic demo ({}x{} bins, seed {})",
        output.dataset.n_lat(),
        output.dataset.n_lon(),
        args.seed
    );
    println!(
        "{}",
        crate::report::format_run_summary(&title, &output.grids, config.reference_energy)
    );
    Ok(())
}
