//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to YAML/JSON fit records
//! - reloaded later for plotting or comparisons

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::math::log10_arange;

/// Emission model fitted to a spatial bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum ModelKind {
    /// `N0 (E/E0)^-Γ`, optionally times `exp(-E invEcut)`.
    #[serde(rename = "plaw")]
    #[value(name = "plaw")]
    PowerLaw,
    /// `N0 E^(-α - β ln E)`.
    #[serde(rename = "logpar")]
    #[value(name = "logpar")]
    LogParabola,
    /// Inverse-Compton up-scattering of the target photon field.
    #[serde(rename = "ic")]
    #[value(name = "ic")]
    InverseCompton,
    /// Gamma rays from neutral-pion decay after pp collisions.
    #[serde(rename = "pi0")]
    #[value(name = "pi0")]
    PionDecay,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::PowerLaw,
        ModelKind::LogParabola,
        ModelKind::InverseCompton,
        ModelKind::PionDecay,
    ];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::PowerLaw => "PL",
            ModelKind::LogParabola => "LogPar",
            ModelKind::InverseCompton => "IC",
            ModelKind::PionDecay => "pi0",
        }
    }

    /// Tag used in output file names.
    pub fn file_tag(self) -> &'static str {
        match self {
            ModelKind::PowerLaw => "Plaw",
            ModelKind::LogParabola => "LogPar",
            ModelKind::InverseCompton => "IC",
            ModelKind::PionDecay => "pi0",
        }
    }

    /// Parameter names in the order the models consume them.
    pub fn param_names(self) -> [&'static str; 3] {
        match self {
            ModelKind::LogParabola => ["N_0", "alpha", "beta"],
            _ => ["N_0", "gamma", "Ecut_inv"],
        }
    }

    /// Whether the third parameter is an inverse cutoff (as opposed to a curvature).
    pub fn has_cutoff_param(self) -> bool {
        !matches!(self, ModelKind::LogParabola)
    }

    /// Whether the curvature/cutoff stage runs for this model.
    ///
    /// The log-parabola always frees β; cutoff models only when asked to.
    pub fn runs_third_stage(self, cutoff: bool) -> bool {
        match self {
            ModelKind::LogParabola => true,
            _ => cutoff,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Event class of the photon selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DataClass {
    Source,
    #[value(name = "ultraclean")]
    UltraClean,
}

impl DataClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DataClass::Source => "source",
            DataClass::UltraClean => "ultraclean",
        }
    }
}

/// Low-energy range used when the profiles were extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum LowEnergyRange {
    #[value(name = "0")]
    Baseline,
    #[value(name = "1")]
    Narrow,
    #[value(name = "2")]
    Middle,
    #[value(name = "3")]
    High,
}

impl LowEnergyRange {
    pub fn index(self) -> u8 {
        match self {
            LowEnergyRange::Baseline => 0,
            LowEnergyRange::Narrow => 1,
            LowEnergyRange::Middle => 2,
            LowEnergyRange::High => 3,
        }
    }

    /// Energy interval (GeV) of the range.
    pub fn label(self) -> &'static str {
        match self {
            LowEnergyRange::Baseline => "0.3-1.0",
            LowEnergyRange::Narrow => "0.3-0.5",
            LowEnergyRange::Middle => "0.5-1.0",
            LowEnergyRange::High => "1.0-2.2",
        }
    }

    /// Number of leading exposure / ΔE bins that are not part of the grid.
    pub fn bin_offset(self) -> usize {
        match self {
            LowEnergyRange::High => 2,
            _ => 0,
        }
    }
}

/// Which map the signal profiles were extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum InputSource {
    #[serde(rename = "data")]
    #[value(name = "data")]
    Data,
    #[serde(rename = "lowE")]
    #[value(name = "lowE")]
    LowE,
    #[serde(rename = "boxes")]
    #[value(name = "boxes")]
    Boxes,
    #[serde(rename = "GALPROP")]
    #[value(name = "GALPROP")]
    Galprop,
}

impl InputSource {
    pub fn as_str(self) -> &'static str {
        match self {
            InputSource::Data => "data",
            InputSource::LowE => "lowE",
            InputSource::Boxes => "boxes",
            InputSource::Galprop => "GALPROP",
        }
    }
}

/// Strictly increasing, log-uniform photon energy grid (GeV).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyGrid {
    energies: Vec<f64>,
}

impl EnergyGrid {
    /// Relative tolerance on the logarithmic bin width.
    const LOG_WIDTH_TOL: f64 = 1e-2;

    pub fn new(energies: Vec<f64>) -> Result<Self, FitError> {
        if energies.len() < 2 {
            return Err(FitError::InvalidConfig(format!(
                "energy grid needs at least 2 bins, got {}",
                energies.len()
            )));
        }
        if energies.iter().any(|e| !(e.is_finite() && *e > 0.0)) {
            return Err(FitError::InvalidConfig("energy grid must be finite and positive".into()));
        }
        let widths: Vec<f64> = energies.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
        if widths.iter().any(|w| *w <= 0.0) {
            return Err(FitError::InvalidConfig("energy grid must be strictly increasing".into()));
        }
        let mean = widths.iter().sum::<f64>() / widths.len() as f64;
        if widths.iter().any(|w| ((w - mean) / mean).abs() > Self::LOG_WIDTH_TOL) {
            return Err(FitError::InvalidConfig("energy grid is not log-uniform".into()));
        }
        Ok(Self { energies })
    }

    /// `n` log-spaced energies between `e_min` and `e_max` (inclusive).
    pub fn log_spaced(e_min: f64, e_max: f64, n: usize) -> Result<Self, FitError> {
        Self::new(crate::math::log_space(e_min, e_max, n)?)
    }

    pub fn len(&self) -> usize {
        self.energies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energies.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.energies
    }

    /// Logarithmic distance between two neighbouring bins.
    pub fn log_width(&self) -> f64 {
        let n = self.energies.len();
        (self.energies[n - 1] / self.energies[0]).ln() / (n - 1) as f64
    }

    /// Linear width ΔE of each bin, assuming bin centres on the log grid.
    pub fn bin_widths(&self) -> Vec<f64> {
        let half = 0.5 * self.log_width();
        self.energies
            .iter()
            .map(|e| e * (half.exp() - (-half).exp()))
            .collect()
    }
}

/// A longitude/latitude stripe of the sky.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialBin {
    pub lat_index: usize,
    pub lon_index: usize,
    /// Longitude centre (deg).
    pub lon: f64,
    /// Latitude centre (deg).
    pub lat: f64,
    pub lon_half_width: f64,
    pub lat_half_width: f64,
}

/// Per-energy profiles of one spatial bin.
///
/// `signal` and `std_dev` are counts; `total` is the total observed counts
/// (signal plus everything else) from which the background map is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinProfiles {
    pub signal: Vec<f64>,
    pub std_dev: Vec<f64>,
    pub total: Vec<f64>,
    /// Exposure (cm² s).
    pub exposure: Vec<f64>,
    /// Solid angle (sr).
    pub solid_angle: Vec<f64>,
    /// Linear bin width (GeV).
    pub delta_e: Vec<f64>,
}

impl BinProfiles {
    /// Check every profile against the energy grid length.
    pub fn validate(&self, n_energy: usize) -> Result<(), FitError> {
        let profiles: [(&str, &[f64]); 6] = [
            ("signal profile", &self.signal),
            ("standard deviation profile", &self.std_dev),
            ("total counts profile", &self.total),
            ("exposure profile", &self.exposure),
            ("solid angle profile", &self.solid_angle),
            ("deltaE profile", &self.delta_e),
        ];
        for (what, values) in profiles {
            if values.len() != n_energy {
                return Err(FitError::shape(what, n_energy, values.len()));
            }
        }
        Ok(())
    }
}

/// One spatial bin and its profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialData {
    pub bin: SpatialBin,
    pub profiles: BinProfiles,
}

/// All spatial bins of one input selection, row-major in (latitude, longitude).
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub grid: EnergyGrid,
    pub lon_centers: Vec<f64>,
    pub lat_centers: Vec<f64>,
    pub bins: Vec<SpatialData>,
}

impl Dataset {
    pub fn n_lat(&self) -> usize {
        self.lat_centers.len()
    }

    pub fn n_lon(&self) -> usize {
        self.lon_centers.len()
    }
}

/// Minimization stage of the staged fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Index and normalization on a narrow window after the first fit bin.
    NarrowWindow,
    /// Index and normalization on the full fit window.
    FullWindow,
    /// Cutoff or curvature parameter freed on the full window.
    ThirdParameter,
    /// Single-stage chi-square fit of the SED profile.
    ChiSquare,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::NarrowWindow => write!(f, "stage 1 (narrow window)"),
            Stage::FullWindow => write!(f, "stage 2 (full window)"),
            Stage::ThirdParameter => write!(f, "stage 3 (cutoff/curvature)"),
            Stage::ChiSquare => write!(f, "chi-square fit"),
        }
    }
}

/// Seeds, step sizes and bounds for one model family.
///
/// Index 0 is the normalization, 1 the spectral index, 2 the inverse cutoff
/// (or β for the log-parabola). Unbounded sides use `±inf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub seeds: [f64; 3],
    /// Initial simplex step per parameter; also the parameter scale.
    pub steps: [f64; 3],
    pub bounds: [(f64, f64); 3],
}

impl FamilyConfig {
    pub fn defaults_for(kind: ModelKind) -> Self {
        let free = (f64::NEG_INFINITY, f64::INFINITY);
        match kind {
            ModelKind::PowerLaw => Self {
                seeds: [1e-6, 0.3, 0.0],
                steps: [1e-7, 0.1, 1e-3],
                bounds: [(0.0, 1.0), free, (0.0, 1.0)],
            },
            ModelKind::LogParabola => Self {
                seeds: [1e-6, 0.3, 0.0],
                steps: [1e-7, 0.1, 0.01],
                bounds: [(0.0, 1.0), free, free],
            },
            ModelKind::InverseCompton | ModelKind::PionDecay => Self {
                seeds: [4e6, 1.5, 0.0],
                steps: [4e5, 0.1, 1e-3],
                bounds: [(0.0, 1e20), (0.0, 5.0), (0.0, 1.0)],
            },
        }
    }
}

/// Settings of the bounded Nelder–Mead minimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerConfig {
    /// Standard deviation of the simplex objective values at convergence.
    pub tolerance: f64,
    pub max_iters: u64,
    /// Extra simplex restarts from the best point to confirm convergence.
    pub restarts: usize,
    /// Wall-clock budget per stage.
    pub stage_timeout: Option<Duration>,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iters: 5_000,
            restarts: 3,
            stage_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Immutable configuration of the staged fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    /// First energy bin of the fit window.
    pub fit_min: usize,
    /// One past the last energy bin of the fit window (clamped to the grid).
    pub fit_max: usize,
    /// Bin whose energy is the power-law pivot E0.
    pub pivot_bin: usize,
    /// Number of bins of the stage-1 window, which starts at `fit_min + 1`.
    pub stage1_bins: usize,
    /// Free the inverse cutoff in a third stage.
    pub cutoff: bool,
    /// Standard deviations below this value (counts) are raised to it.
    pub uncertainty_floor: Option<f64>,
    /// Flat offset added to the SED error bars.
    pub uncertainty_offset: f64,
    pub power_law: FamilyConfig,
    pub log_parabola: FamilyConfig,
    pub inverse_compton: FamilyConfig,
    pub pion_decay: FamilyConfig,
    pub minimizer: MinimizerConfig,
    /// Reference energy (GeV) of the log-parabola local index.
    pub reference_energy: f64,
    /// Electron energies (GeV) of the inverse-Compton model.
    pub electron_energies: Vec<f64>,
    /// Proton momenta (GeV) of the pion-decay model.
    pub proton_momenta: Vec<f64>,
    /// Height (kpc) of the ISRF model used for each latitude row.
    pub isrf_heights: Vec<f64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            fit_min: 4,
            fit_max: 18,
            pivot_bin: 6,
            stage1_bins: 3,
            cutoff: true,
            uncertainty_floor: Some(1.0),
            uncertainty_offset: 0.0,
            power_law: FamilyConfig::defaults_for(ModelKind::PowerLaw),
            log_parabola: FamilyConfig::defaults_for(ModelKind::LogParabola),
            inverse_compton: FamilyConfig::defaults_for(ModelKind::InverseCompton),
            pion_decay: FamilyConfig::defaults_for(ModelKind::PionDecay),
            minimizer: MinimizerConfig::default(),
            reference_energy: 500.0,
            electron_energies: log10_arange(-1.0, 8.001, 0.1),
            proton_momenta: log10_arange(-0.5, 6.0, 0.1),
            isrf_heights: vec![10.0, 10.0, 5.0, 5.0, 2.0, 1.0, 0.5, 0.0, 0.5, 1.0, 2.0, 5.0, 5.0, 10.0, 10.0],
        }
    }
}

impl FitConfig {
    pub fn family(&self, kind: ModelKind) -> &FamilyConfig {
        match kind {
            ModelKind::PowerLaw => &self.power_law,
            ModelKind::LogParabola => &self.log_parabola,
            ModelKind::InverseCompton => &self.inverse_compton,
            ModelKind::PionDecay => &self.pion_decay,
        }
    }

    /// Full fit window for a grid of `n_energy` bins.
    pub fn fit_range(&self, n_energy: usize) -> Range<usize> {
        self.fit_min..self.fit_max.min(n_energy)
    }

    /// Stage-1 window: `stage1_bins` bins starting right after `fit_min`.
    pub fn stage1_range(&self, n_energy: usize) -> Range<usize> {
        let full = self.fit_range(n_energy);
        let start = (full.start + 1).min(full.end);
        start..(start + self.stage1_bins).min(full.end)
    }

    /// Check the windows against a grid of `n_energy` bins.
    pub fn validate(&self, n_energy: usize) -> Result<(), FitError> {
        let full = self.fit_range(n_energy);
        if full.start >= full.end {
            return Err(FitError::InvalidConfig(format!(
                "empty fit window {}..{} for {n_energy} energy bins",
                self.fit_min, self.fit_max
            )));
        }
        if self.stage1_range(n_energy).len() < 2 {
            return Err(FitError::InvalidConfig("stage-1 window needs at least 2 bins".into()));
        }
        if self.pivot_bin >= n_energy {
            return Err(FitError::InvalidConfig(format!(
                "pivot bin {} outside the {n_energy}-bin energy grid",
                self.pivot_bin
            )));
        }
        if !(self.reference_energy.is_finite() && self.reference_energy > 0.0) {
            return Err(FitError::InvalidConfig("reference energy must be positive".into()));
        }
        for kind in ModelKind::ALL {
            let family = self.family(kind);
            for i in 0..3 {
                let (lo, hi) = family.bounds[i];
                if !(lo < hi) || !(family.steps[i] > 0.0) {
                    return Err(FitError::InvalidConfig(format!(
                        "{kind}: invalid bounds or step for parameter {i}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Selectors and paths of one batch run, as exposed to the CLI layer.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub root: PathBuf,
    pub isrf_dir: PathBuf,
    pub out_dir: PathBuf,
    pub data_class: DataClass,
    pub energy_range: LowEnergyRange,
    pub input: InputSource,
    pub models: Vec<ModelKind>,
    /// Write one fit record per (spatial bin, model).
    pub save_records: bool,
    /// Longitude width of the spatial bins (deg).
    pub lon_width: f64,
    /// Latitude width of each latitude row (deg).
    pub lat_widths: Vec<f64>,
}

/// Non-fatal diagnostics attached to a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitWarning {
    /// Fewer fit bins than free parameters; no reduced chi-square.
    NonPositiveDof { dof: i64 },
    /// Parameter converged onto one of its bounds.
    ParameterAtBound { name: String, value: f64 },
}

impl fmt::Display for FitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitWarning::NonPositiveDof { dof } => write!(f, "degrees of freedom = {dof}"),
            FitWarning::ParameterAtBound { name, value } => write!(f, "{name} pinned at bound {value:e}"),
        }
    }
}

/// Converged value and 1σ uncertainty of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub name: String,
    pub value: f64,
    /// `None` when the parameter sits on a bound or the Hessian is singular.
    pub error: Option<f64>,
}

/// Cutoff energy derived from the inverse-cutoff parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutoffEnergy {
    /// `invEcut` converged to exactly zero.
    Infinite,
    Finite { value: f64, error: Option<f64> },
}

impl CutoffEnergy {
    pub fn from_inverse(inv_ecut: f64, inv_error: Option<f64>) -> Self {
        if inv_ecut == 0.0 {
            return CutoffEnergy::Infinite;
        }
        CutoffEnergy::Finite {
            value: 1.0 / inv_ecut,
            error: inv_error.map(|s| s / (inv_ecut * inv_ecut)),
        }
    }

    /// Cutoff energy in GeV, `inf` for no cutoff.
    pub fn value(&self) -> f64 {
        match self {
            CutoffEnergy::Infinite => f64::INFINITY,
            CutoffEnergy::Finite { value, .. } => *value,
        }
    }
}

/// Fit output for one (spatial bin, model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,
    pub spatial: SpatialBin,
    /// Energies of the fit window (GeV).
    pub energies: Vec<f64>,
    /// Model SED `E² dN/dE` on the fit window.
    pub sed: Vec<f64>,
    pub params: Vec<ParamEstimate>,
    /// Twice the Poisson objective at the converged parameters.
    pub test_statistic: f64,
    pub chi_square: f64,
    pub dof: i64,
    pub reduced_chi_square: Option<f64>,
    pub cutoff_energy: Option<CutoffEnergy>,
    pub warnings: Vec<FitWarning>,
}

impl FitResult {
    pub fn param(&self, name: &str) -> Option<&ParamEstimate> {
        self.params.iter().find(|p| p.name == name)
    }
}
