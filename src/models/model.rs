//! Analytic SED shapes and the common `Spectrum` interface.
//!
//! Every model predicts the SED `E² dN/dE` (GeV cm⁻² s⁻¹ sr⁻¹) at one bin of the
//! photon energy grid. Parameters are always passed as `[N0, index, third]`;
//! a missing third parameter is read as `0`.

use std::ops::Range;

use crate::domain::ModelKind;

/// `N0 (E/E0)^-Γ`.
pub fn power_law(n0: f64, gamma: f64, energy: f64, pivot: f64) -> f64 {
    n0 * (energy / pivot).powf(-gamma)
}

/// `N0 (E/E0)^-Γ exp(-E invEcut)`.
pub fn power_law_cutoff(n0: f64, gamma: f64, inv_ecut: f64, energy: f64, pivot: f64) -> f64 {
    power_law(n0, gamma, energy, pivot) * (-energy * inv_ecut).exp()
}

/// `N0 E^(-α - β ln E)`.
pub fn log_parabola(n0: f64, alpha: f64, beta: f64, energy: f64) -> f64 {
    n0 * energy.powf(-alpha - beta * energy.ln())
}

/// Third parameter, or `0` when the caller only passes `[N0, index]`.
pub(crate) fn third(params: &[f64]) -> f64 {
    params.get(2).copied().unwrap_or(0.0)
}

/// A model SED evaluated on a fixed photon energy grid.
pub trait Spectrum: Sync {
    fn kind(&self) -> ModelKind;

    /// Photon energies (GeV) of the grid the model is bound to.
    fn energies(&self) -> &[f64];

    /// SED at grid bin `bin`.
    fn sed(&self, params: &[f64], bin: usize) -> f64;
}

/// Lazy SED sequence over a bin range.
///
/// Nothing is evaluated until the iterator is advanced, and a fresh iterator can
/// be taken at any time with [`SedIter::new`].
#[derive(Clone)]
pub struct SedIter<'a> {
    model: &'a dyn Spectrum,
    params: &'a [f64],
    bins: Range<usize>,
}

impl<'a> SedIter<'a> {
    pub fn new(model: &'a dyn Spectrum, params: &'a [f64], bins: Range<usize>) -> Self {
        let end = bins.end.min(model.energies().len());
        Self {
            model,
            params,
            bins: bins.start.min(end)..end,
        }
    }
}

impl Iterator for SedIter<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let bin = self.bins.next()?;
        Some(self.model.sed(self.params, bin))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.bins.size_hint()
    }
}

impl ExactSizeIterator for SedIter<'_> {}

/// Power law with optional exponential cutoff, pivoted at `pivot` (GeV).
#[derive(Debug, Clone, PartialEq)]
pub struct PowerLawSpectrum {
    energies: Vec<f64>,
    pivot: f64,
}

impl PowerLawSpectrum {
    pub fn new(energies: Vec<f64>, pivot: f64) -> Self {
        Self { energies, pivot }
    }

    pub fn pivot(&self) -> f64 {
        self.pivot
    }
}

impl Spectrum for PowerLawSpectrum {
    fn kind(&self) -> ModelKind {
        ModelKind::PowerLaw
    }

    fn energies(&self) -> &[f64] {
        &self.energies
    }

    fn sed(&self, params: &[f64], bin: usize) -> f64 {
        power_law_cutoff(params[0], params[1], third(params), self.energies[bin], self.pivot)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogParabolaSpectrum {
    energies: Vec<f64>,
}

impl LogParabolaSpectrum {
    pub fn new(energies: Vec<f64>) -> Self {
        Self { energies }
    }
}

impl Spectrum for LogParabolaSpectrum {
    fn kind(&self) -> ModelKind {
        ModelKind::LogParabola
    }

    fn energies(&self) -> &[f64] {
        &self.energies
    }

    fn sed(&self, params: &[f64], bin: usize) -> f64 {
        log_parabola(params[0], params[1], third(params), self.energies[bin])
    }
}
