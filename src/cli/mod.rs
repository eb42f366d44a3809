//! Command-line parsing for the SED fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{DataClass, InputSource, LowEnergyRange, ModelKind};
use crate::fit::FitMethod;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "sedfit", version, about = "Gamma-ray SED fitting per spatial bin")]
pub struct Cli {
    /// Log level (`error`, `warn`, `info`, `debug`, `trace`); `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit spectral models to every spatial bin of a profile dictionary.
    Fit(FitArgs),
    /// Fit a seeded synthetic dataset and print the summary.
    Demo(DemoArgs),
}

/// Options shared by `fit` and `demo`.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Models to fit (comma separated).
    #[arg(long = "model", value_enum, value_delimiter = ',', default_values_t = [ModelKind::LogParabola])]
    pub models: Vec<ModelKind>,

    /// Objective: staged Poisson likelihood or single-stage chi-square.
    #[arg(long, value_enum, default_value_t = FitMethod::Likelihood)]
    pub method: FitMethod,

    /// Fit power-law, IC and pi0 models without the exponential cutoff.
    #[arg(long)]
    pub no_cutoff: bool,

    /// First energy bin of the fit window.
    #[arg(long, default_value_t = 4)]
    pub fit_min: usize,

    /// One past the last energy bin of the fit window.
    #[arg(long, default_value_t = 18)]
    pub fit_max: usize,

    /// Standard deviations below this many counts are raised to it (0 disables).
    #[arg(long, default_value_t = 1.0)]
    pub uncertainty_floor: f64,

    /// Flat offset added to the SED error bars.
    #[arg(long, default_value_t = 0.0)]
    pub uncertainty_offset: f64,

    /// Wall-clock limit per minimization stage, in seconds (0 disables).
    #[arg(long, default_value_t = 120)]
    pub stage_timeout: u64,
}

/// Options of `sedfit fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Event class of the photon selection.
    #[arg(short = 'c', long, value_enum, default_value_t = DataClass::Source)]
    pub data_class: DataClass,

    /// Low-energy range of the dictionaries (0: 0.3-1.0, 1: 0.3-0.5, 2: 0.5-1.0, 3: 1.0-2.2 GeV).
    #[arg(short = 'E', long = "lowE-range", value_enum, default_value_t = LowEnergyRange::Baseline)]
    pub energy_range: LowEnergyRange,

    /// Input selection of the signal profiles.
    #[arg(short = 'i', long, value_enum, default_value_t = InputSource::LowE)]
    pub input_data: InputSource,

    /// Directory containing `dct/Low_energy_range*/`.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Directory with the `Standard_0_0_{height}_Flux.csv` ISRF tables.
    #[arg(long, default_value = "ISRF_flux")]
    pub isrf_dir: PathBuf,

    /// Output directory of the fit records.
    #[arg(long, default_value = "plot_dct")]
    pub out: PathBuf,

    /// Do not write per-bin fit records.
    #[arg(long)]
    pub no_save: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// Options of `sedfit demo`.
#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Number of latitude rows.
    #[arg(long, default_value_t = 3)]
    pub n_lat: usize,

    /// Number of longitude columns.
    #[arg(long, default_value_t = 2)]
    pub n_lon: usize,

    /// Seed of the synthetic noise.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Also write fit records into this directory.
    #[arg(long)]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,
}
