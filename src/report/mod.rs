//! Result aggregation and terminal output.
//!
//! A [`ResultGrid`] holds one model's fits over the (latitude, longitude) grid
//! of spatial bins and derives the scalar maps used for plotting:
//!
//! - cutoff energy per bin
//! - log-parabola local index at a reference energy, with its propagated error

pub mod format;

pub use format::*;

use crate::domain::{FitResult, ModelKind};
use crate::error::FitError;

/// Outcome of one spatial bin.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Empty,
    Fitted(Box<FitResult>),
    /// The fit was skipped; the reason is kept for the summary.
    Failed(String),
}

/// Fits of one model indexed by `(latitude row, longitude column)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultGrid {
    pub model: ModelKind,
    n_lat: usize,
    n_lon: usize,
    slots: Vec<Slot>,
}

impl ResultGrid {
    pub fn new(model: ModelKind, n_lat: usize, n_lon: usize) -> Self {
        Self {
            model,
            n_lat,
            n_lon,
            slots: vec![Slot::Empty; n_lat * n_lon],
        }
    }

    pub fn n_lat(&self) -> usize {
        self.n_lat
    }

    pub fn n_lon(&self) -> usize {
        self.n_lon
    }

    fn index(&self, b: usize, l: usize) -> Option<usize> {
        (b < self.n_lat && l < self.n_lon).then_some(b * self.n_lon + l)
    }

    pub fn set(&mut self, b: usize, l: usize, slot: Slot) -> Result<(), FitError> {
        let i = self.index(b, l).ok_or_else(|| {
            FitError::InvalidConfig(format!(
                "bin ({b}, {l}) outside the {}x{} result grid",
                self.n_lat, self.n_lon
            ))
        })?;
        self.slots[i] = slot;
        Ok(())
    }

    pub fn slot(&self, b: usize, l: usize) -> Option<&Slot> {
        self.index(b, l).map(|i| &self.slots[i])
    }

    pub fn result(&self, b: usize, l: usize) -> Option<&FitResult> {
        match self.slot(b, l)? {
            Slot::Fitted(result) => Some(result),
            _ => None,
        }
    }

    /// Fitted results in row-major order.
    pub fn fitted(&self) -> impl Iterator<Item = &FitResult> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Fitted(result) => Some(result.as_ref()),
            _ => None,
        })
    }

    /// `(b, l, reason)` of every failed bin.
    pub fn failures(&self) -> impl Iterator<Item = (usize, usize, &str)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Failed(reason) => Some((i / self.n_lon, i % self.n_lon, reason.as_str())),
            _ => None,
        })
    }

    pub fn n_fitted(&self) -> usize {
        self.fitted().count()
    }

    /// Map a fitted bin to a scalar; `None` elsewhere.
    pub fn map<T>(&self, f: impl Fn(&FitResult) -> Option<T>) -> Vec<Vec<Option<T>>> {
        (0..self.n_lat)
            .map(|b| (0..self.n_lon).map(|l| self.result(b, l).and_then(&f)).collect())
            .collect()
    }

    /// Cutoff energy (GeV) per bin; `inf` where the inverse cutoff is zero.
    pub fn cutoff_grid(&self) -> Vec<Vec<Option<f64>>> {
        self.map(|r| r.cutoff_energy.map(|c| c.value()))
    }

    /// Log-parabola local index at `reference_energy` (GeV) per bin.
    pub fn local_index_grid(&self, reference_energy: f64) -> Vec<Vec<Option<LocalIndex>>> {
        self.map(|r| LocalIndex::from_fit(r, reference_energy))
    }
}

/// Logarithmic slope of the log-parabola SED at a reference energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalIndex {
    pub value: f64,
    pub error: Option<f64>,
}

impl LocalIndex {
    /// `n = -α - 2β ln E_ref`, `σ_n = sqrt(σ_α² + (2 ln E_ref)² σ_β²)`.
    pub fn new(alpha: f64, beta: f64, alpha_error: Option<f64>, beta_error: Option<f64>, reference_energy: f64) -> Self {
        let two_ln = 2.0 * reference_energy.ln();
        let error = match (alpha_error, beta_error) {
            (Some(sa), Some(sb)) => Some((sa * sa + two_ln * two_ln * sb * sb).sqrt()),
            _ => None,
        };
        Self {
            value: -alpha - two_ln * beta,
            error,
        }
    }

    /// `None` unless `fit` is a log-parabola with all three parameters.
    pub fn from_fit(fit: &FitResult, reference_energy: f64) -> Option<Self> {
        if fit.model != ModelKind::LogParabola {
            return None;
        }
        let alpha = fit.param("alpha")?;
        let beta = fit.param("beta")?;
        Some(Self::new(alpha.value, beta.value, alpha.error, beta.error, reference_energy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CutoffEnergy, ParamEstimate, SpatialBin};

    fn fit(model: ModelKind, b: usize, l: usize, params: &[(&str, f64, Option<f64>)]) -> FitResult {
        FitResult {
            model,
            spatial: SpatialBin {
                lat_index: b,
                lon_index: l,
                lon: 0.0,
                lat: 0.0,
                lon_half_width: 5.0,
                lat_half_width: 5.0,
            },
            energies: vec![1.0, 2.0],
            sed: vec![1e-6, 5e-7],
            params: params
                .iter()
                .map(|&(name, value, error)| ParamEstimate {
                    name: name.to_string(),
                    value,
                    error,
                })
                .collect(),
            test_statistic: 10.0,
            chi_square: 1.0,
            dof: 1,
            reduced_chi_square: Some(1.0),
            cutoff_energy: None,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn slots_are_addressed_by_row_and_column() {
        let mut grid = ResultGrid::new(ModelKind::PowerLaw, 2, 3);
        let mut with_cutoff = fit(ModelKind::PowerLaw, 1, 2, &[]);
        with_cutoff.cutoff_energy = Some(CutoffEnergy::Infinite);
        grid.set(1, 2, Slot::Fitted(Box::new(with_cutoff))).unwrap();
        grid.set(0, 1, Slot::Failed("FitFailed".into())).unwrap();
        assert!(grid.set(2, 0, Slot::Empty).is_err());

        assert_eq!(grid.n_fitted(), 1);
        assert_eq!(grid.failures().collect::<Vec<_>>(), vec![(0, 1, "FitFailed")]);
        let cutoffs = grid.cutoff_grid();
        assert_eq!(cutoffs[1][2], Some(f64::INFINITY));
        assert_eq!(cutoffs[0][0], None);
    }

    #[test]
    fn local_index_propagates_errors() {
        let e_ref: f64 = 500.0;
        let n = LocalIndex::new(0.4, 0.05, Some(0.1), Some(0.02), e_ref);
        let two_ln = 2.0 * e_ref.ln();
        assert!((n.value - (-0.4 - two_ln * 0.05)).abs() < 1e-12);
        let expected = (0.01 + two_ln * two_ln * 4e-4).sqrt();
        assert!((n.error.unwrap() - expected).abs() < 1e-12);
        assert_eq!(LocalIndex::new(0.4, 0.05, None, Some(0.02), e_ref).error, None);
    }

    #[test]
    fn local_index_grid_only_for_log_parabola() {
        let mut grid = ResultGrid::new(ModelKind::LogParabola, 1, 1);
        let params = [("N_0", 1e-6, None), ("alpha", 0.4, Some(0.1)), ("beta", 0.0, Some(0.01))];
        grid.set(0, 0, Slot::Fitted(Box::new(fit(ModelKind::LogParabola, 0, 0, &params)))).unwrap();
        let index = grid.local_index_grid(1.0)[0][0].unwrap();
        assert!((index.value + 0.4).abs() < 1e-12);
        assert!((index.error.unwrap() - 0.1).abs() < 1e-12);

        let pl = fit(ModelKind::PowerLaw, 0, 0, &[("gamma", 0.3, None)]);
        assert!(LocalIndex::from_fit(&pl, 1.0).is_none());
    }
}
