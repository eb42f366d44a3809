//! Per-bin observation preprocessing.
//!
//! Turns the raw count profiles of one spatial bin into what the objectives
//! consume:
//!
//! - background counts `max(total - signal, 0)`
//! - floored standard deviations
//! - the counts-per-SED conversion factor `exposure · dΩ · ΔE / E²`
//! - the observed SED and its error bars

use std::ops::Range;

use crate::domain::{BinProfiles, EnergyGrid, FitConfig};
use crate::error::FitError;

/// Background counts per bin, clipped at zero.
pub fn background_map(total: &[f64], signal: &[f64]) -> Result<Vec<f64>, FitError> {
    if total.len() != signal.len() {
        return Err(FitError::shape("total counts profile", signal.len(), total.len()));
    }
    Ok(total.iter().zip(signal).map(|(t, s)| (t - s).max(0.0)).collect())
}

/// Replace standard deviations with `|σ| < floor` by `floor`.
pub fn apply_uncertainty_floor(std_dev: &[f64], floor: Option<f64>) -> Vec<f64> {
    match floor {
        Some(floor) => std_dev
            .iter()
            .map(|&s| if s.abs() < floor { floor } else { s })
            .collect(),
        None => std_dev.to_vec(),
    }
}

/// Observed data of one spatial bin, ready for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    energies: Vec<f64>,
    signal: Vec<f64>,
    total: Vec<f64>,
    background: Vec<f64>,
    std_dev: Vec<f64>,
    counts_per_sed: Vec<f64>,
    sed: Vec<f64>,
    sed_error: Vec<f64>,
}

impl Observation {
    pub fn new(grid: &EnergyGrid, profiles: &BinProfiles, config: &FitConfig) -> Result<Self, FitError> {
        profiles.validate(grid.len())?;

        let energies = grid.as_slice().to_vec();
        let background = background_map(&profiles.total, &profiles.signal)?;
        let std_dev = apply_uncertainty_floor(&profiles.std_dev, config.uncertainty_floor);

        let counts_per_sed: Vec<f64> = energies
            .iter()
            .enumerate()
            .map(|(i, e)| profiles.exposure[i] * profiles.solid_angle[i] * profiles.delta_e[i] / (e * e))
            .collect();
        if let Some(i) = counts_per_sed.iter().position(|f| !(f.is_finite() && *f > 0.0)) {
            return Err(FitError::InvalidConfig(format!(
                "exposure, solid angle and deltaE must be positive (bin {i})"
            )));
        }

        let sed = profiles.signal.iter().zip(&counts_per_sed).map(|(s, f)| s / f).collect();
        let sed_error = std_dev
            .iter()
            .zip(&counts_per_sed)
            .map(|(s, f)| s / f + config.uncertainty_offset)
            .collect();

        Ok(Self {
            energies,
            signal: profiles.signal.clone(),
            total: profiles.total.clone(),
            background,
            std_dev,
            counts_per_sed,
            sed,
            sed_error,
        })
    }

    pub fn len(&self) -> usize {
        self.energies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energies.is_empty()
    }

    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    pub fn signal(&self) -> &[f64] {
        &self.signal
    }

    /// Total observed counts (`n` of the Poisson likelihood).
    pub fn total(&self) -> &[f64] {
        &self.total
    }

    pub fn background(&self) -> &[f64] {
        &self.background
    }

    /// Floored standard deviations (counts).
    pub fn std_dev(&self) -> &[f64] {
        &self.std_dev
    }

    /// Observed SED.
    pub fn sed(&self) -> &[f64] {
        &self.sed
    }

    /// SED error bars, including the additive offset.
    pub fn sed_error(&self) -> &[f64] {
        &self.sed_error
    }

    /// Expected counts for an SED value in bin `bin`.
    pub fn sed_to_counts(&self, bin: usize, sed: f64) -> f64 {
        sed * self.counts_per_sed[bin]
    }

    pub fn counts_to_sed(&self, bin: usize, counts: f64) -> f64 {
        counts / self.counts_per_sed[bin]
    }

    pub fn check_range(&self, range: &Range<usize>) -> Result<(), FitError> {
        if range.end > self.len() || range.start >= range.end {
            return Err(FitError::InvalidConfig(format!(
                "bin range {}..{} outside the {}-bin profile",
                range.start,
                range.end,
                self.len()
            )));
        }
        Ok(())
    }
}
