//! Fit objectives.
//!
//! - [`PoissonObjective`]: `Σ [μ - n ln μ]` with `μ = background + model counts`
//!   and `n` the total observed counts; the main likelihood fits use it
//!   (`errordef = 0.5`).
//! - [`ChiSquareObjective`]: `Σ (SED_obs - SED_model)² / σ²` over the SED
//!   profile; used by the single-stage legacy fit (`errordef = 1`).
//!
//! Both act on an explicit bin range so successive stages can reuse the same
//! model on different windows.

use std::ops::Range;

use crate::error::FitError;
use crate::fit::Observation;
use crate::math::ObjectiveFunction;
use crate::models::{SedIter, Spectrum};

/// `Σ (model - observed)² / σ²`.
pub fn chi_square(model: &[f64], observed: &[f64], sigma: &[f64]) -> f64 {
    model
        .iter()
        .zip(observed)
        .zip(sigma)
        .map(|((m, o), s)| {
            let r = (m - o) / s;
            r * r
        })
        .sum()
}

/// `χ² / dof`, or `None` when `dof <= 0`.
pub fn reduced_chi_square(chi2: f64, dof: i64) -> Option<f64> {
    (dof > 0).then(|| chi2 / dof as f64)
}

/// Poisson likelihood objective on counts.
pub struct PoissonObjective<'a> {
    model: &'a dyn Spectrum,
    observation: &'a Observation,
    range: Range<usize>,
}

impl<'a> PoissonObjective<'a> {
    pub fn new(model: &'a dyn Spectrum, observation: &'a Observation, range: Range<usize>) -> Result<Self, FitError> {
        observation.check_range(&range)?;
        if model.energies().len() != observation.len() {
            return Err(FitError::shape("model energy grid", observation.len(), model.energies().len()));
        }
        Ok(Self {
            model,
            observation,
            range,
        })
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Expected counts `background + model` on the active range.
    pub fn expected_counts(&self, params: &[f64]) -> Vec<f64> {
        SedIter::new(self.model, params, self.range.clone())
            .zip(self.range.clone())
            .map(|(sed, bin)| self.observation.background()[bin] + self.observation.sed_to_counts(bin, sed))
            .collect()
    }
}

impl ObjectiveFunction for PoissonObjective<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64, FitError> {
        let total = self.observation.total();
        let mut value = 0.0;
        for (mu, bin) in self.expected_counts(params).into_iter().zip(self.range.clone()) {
            let n = total[bin];
            if mu <= 0.0 {
                if n > 0.0 {
                    return Err(FitError::NonPositiveModel {
                        bin,
                        value: mu,
                        observed: n,
                    });
                }
                continue;
            }
            value += mu - n * mu.ln();
        }
        log::trace!("{} {:?} -> {value:.8e}", self.model.kind(), params);
        Ok(value)
    }
}

/// Gaussian chi-square objective on the SED profile.
pub struct ChiSquareObjective<'a> {
    model: &'a dyn Spectrum,
    observation: &'a Observation,
    range: Range<usize>,
}

impl<'a> ChiSquareObjective<'a> {
    pub fn new(model: &'a dyn Spectrum, observation: &'a Observation, range: Range<usize>) -> Result<Self, FitError> {
        observation.check_range(&range)?;
        if model.energies().len() != observation.len() {
            return Err(FitError::shape("model energy grid", observation.len(), model.energies().len()));
        }
        Ok(Self {
            model,
            observation,
            range,
        })
    }
}

impl ObjectiveFunction for ChiSquareObjective<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64, FitError> {
        let model: Vec<f64> = SedIter::new(self.model, params, self.range.clone()).collect();
        let value = chi_square(
            &model,
            &self.observation.sed()[self.range.clone()],
            &self.observation.sed_error()[self.range.clone()],
        );
        log::trace!("{} {:?} -> chi2 {value:.6e}", self.model.kind(), params);
        Ok(value)
    }

    fn errordef(&self) -> f64 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BinProfiles, EnergyGrid, FitConfig};
    use crate::models::PowerLawSpectrum;

    fn noiseless(params: &[f64], background: f64) -> (EnergyGrid, PowerLawSpectrum, Observation) {
        let grid = EnergyGrid::log_spaced(0.3, 100.0, 18).unwrap();
        let model = PowerLawSpectrum::new(grid.as_slice().to_vec(), grid.as_slice()[6]);
        let n = grid.len();
        let exposure = vec![3e11; n];
        let solid_angle = vec![0.03; n];
        let delta_e = grid.bin_widths();
        let signal: Vec<f64> = (0..n)
            .map(|i| {
                let e = grid.as_slice()[i];
                model.sed(params, i) * exposure[i] * solid_angle[i] * delta_e[i] / (e * e)
            })
            .collect();
        let total = signal.iter().map(|s| s + background).collect();
        let profiles = BinProfiles {
            std_dev: signal.iter().map(|s: &f64| s.sqrt()).collect(),
            signal,
            total,
            exposure,
            solid_angle,
            delta_e,
        };
        let obs = Observation::new(&grid, &profiles, &FitConfig::default()).unwrap();
        (grid, model, obs)
    }

    #[test]
    fn poisson_is_stationary_at_truth() {
        let truth = [1e-6, 0.3, 1e-3];
        let (_, model, obs) = noiseless(&truth, 0.0);
        let objective = PoissonObjective::new(&model, &obs, 4..18).unwrap();
        let f0 = objective.eval(&truth).unwrap();
        for i in 0..3 {
            for sign in [-1.0, 1.0] {
                let mut p = truth;
                p[i] *= 1.0 + sign * 1e-3;
                assert!(objective.eval(&p).unwrap() > f0);
            }
        }
    }

    #[test]
    fn non_positive_expectation_with_counts_is_an_error() {
        let (_, model, obs) = noiseless(&[1e-6, 0.3], 0.0);
        let objective = PoissonObjective::new(&model, &obs, 4..8).unwrap();
        let err = objective.eval(&[0.0, 0.3]).unwrap_err();
        assert!(matches!(err, FitError::NonPositiveModel { bin: 4, .. }));
    }

    #[test]
    fn range_outside_profile_is_rejected() {
        let (_, model, obs) = noiseless(&[1e-6, 0.3], 10.0);
        assert!(PoissonObjective::new(&model, &obs, 4..19).is_err());
        assert!(ChiSquareObjective::new(&model, &obs, 5..5).is_err());
    }

    #[test]
    fn chi_square_vanishes_at_truth() {
        let truth = [1e-6, 0.3];
        let (_, model, obs) = noiseless(&truth, 10.0);
        let objective = ChiSquareObjective::new(&model, &obs, 4..18).unwrap();
        assert!(objective.eval(&truth).unwrap() < 1e-20);
        assert!(objective.eval(&[1.1e-6, 0.3]).unwrap() > 1.0);
    }

    #[test]
    fn reduced_chi_square_is_scale_invariant() {
        let model = [1.0, 2.0, 3.5, 4.0];
        let observed = [1.2, 1.9, 3.0, 4.4];
        let sigma = [0.1, 0.3, 0.2, 0.5];
        let base = reduced_chi_square(chi_square(&model, &observed, &sigma), 2).unwrap();
        for c in [1e-7, 0.5, 3.0, 1e6] {
            let scale = |v: &[f64]| v.iter().map(|x| x * c).collect::<Vec<_>>();
            let scaled = reduced_chi_square(chi_square(&scale(&model), &scale(&observed), &scale(&sigma)), 2).unwrap();
            assert!((scaled - base).abs() < 1e-12 * base);
        }
        assert_eq!(reduced_chi_square(1.0, 0), None);
    }
}
