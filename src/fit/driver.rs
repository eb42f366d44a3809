//! Staged minimization of one (spatial bin, model) pair.
//!
//! The driver is an explicit state machine:
//!
//! ```text
//! Seeded -> Stage1Converged -> Stage2Converged -> [Stage3Converged] -> Reported
//! ```
//!
//! - stage 1 fits `N0` and the index on a short window right after the first
//!   fit bin, with the third parameter held at zero
//! - stage 2 refits the same two parameters on the full fit window
//! - stage 3 frees the inverse cutoff (or the log-parabola curvature), seeded at
//!   zero; it runs for the log-parabola always and for the other models only
//!   when the cutoff is requested
//!
//! Each stage is seeded with the previous stage's minimum. A stage that does not
//! converge ends the fit with [`FitError::FitFailed`].

use std::ops::Range;

use crate::domain::{
    CutoffEnergy, FitConfig, FitResult, FitWarning, ModelKind, ParamEstimate, SpatialBin, Stage,
};
use crate::error::FitError;
use crate::fit::{ChiSquareObjective, Observation, PoissonObjective, chi_square, reduced_chi_square};
use crate::math::{MinimizeFailure, Minimizer, Minimum, ObjectiveFunction, ParamSpace, hessian_uncertainties};
use crate::models::{SedIter, Spectrum};

/// State of a staged fit.
#[derive(Debug, Clone, PartialEq)]
pub enum FitState {
    Seeded { params: Vec<f64> },
    Stage1Converged { params: Vec<f64> },
    Stage2Converged { params: Vec<f64>, fval: f64 },
    Stage3Converged { params: Vec<f64>, fval: f64 },
    Reported(Box<FitResult>),
}

impl FitState {
    /// Current parameter vector, `None` once reported.
    pub fn params(&self) -> Option<&[f64]> {
        match self {
            FitState::Seeded { params }
            | FitState::Stage1Converged { params }
            | FitState::Stage2Converged { params, .. }
            | FitState::Stage3Converged { params, .. } => Some(params),
            FitState::Reported(_) => None,
        }
    }
}

/// Staged fit of one model to one spatial bin.
pub struct FitDriver<'a> {
    config: &'a FitConfig,
    model: &'a dyn Spectrum,
    observation: &'a Observation,
    spatial: SpatialBin,
    minimizer: Minimizer,
    state: FitState,
}

impl<'a> FitDriver<'a> {
    pub fn new(
        config: &'a FitConfig,
        model: &'a dyn Spectrum,
        observation: &'a Observation,
        spatial: SpatialBin,
    ) -> Result<Self, FitError> {
        config.validate(observation.len())?;
        Ok(Self {
            config,
            model,
            observation,
            spatial,
            minimizer: Minimizer::new(config.minimizer.clone()),
            state: FitState::Seeded {
                params: seeds(config, model.kind()),
            },
        })
    }

    pub fn state(&self) -> &FitState {
        &self.state
    }

    fn kind(&self) -> ModelKind {
        self.model.kind()
    }

    fn full_range(&self) -> Range<usize> {
        self.config.fit_range(self.observation.len())
    }

    fn third_stage(&self) -> bool {
        self.kind().runs_third_stage(self.config.cutoff)
    }

    /// Parameter space of `stage`, starting at `start`.
    fn space(&self, stage: Stage, start: &[f64]) -> Result<ParamSpace, FitError> {
        let family = self.config.family(self.kind());
        let space = ParamSpace::new(start.to_vec(), family.steps.to_vec(), family.bounds.to_vec())?;
        Ok(match stage {
            Stage::NarrowWindow | Stage::FullWindow => space.freeze(2),
            Stage::ThirdParameter => space,
            Stage::ChiSquare if self.third_stage() => space,
            Stage::ChiSquare => space.freeze(2),
        })
    }

    fn run_stage(&self, stage: Stage, start: &[f64], range: Range<usize>) -> Result<Minimum, FitError> {
        let space = self.space(stage, start)?;
        let objective = PoissonObjective::new(self.model, self.observation, range.clone())?;
        log::debug!(
            "{} {}: bins {}..{} from {:?}",
            self.kind(),
            stage,
            range.start,
            range.end,
            start
        );
        let minimum = self
            .minimizer
            .minimize(&objective, &space)
            .map_err(|f| failed(stage, f))?;
        log::debug!(
            "{} {} converged: {:?} fval={:.6} ({} iterations)",
            self.kind(),
            stage,
            minimum.params,
            minimum.fval,
            minimum.iterations
        );
        Ok(minimum)
    }

    /// Perform one state transition.
    pub fn advance(&mut self) -> Result<&FitState, FitError> {
        let next = match &self.state {
            FitState::Seeded { params } => {
                let range = self.config.stage1_range(self.observation.len());
                let min = self.run_stage(Stage::NarrowWindow, params, range)?;
                FitState::Stage1Converged { params: min.params }
            }
            FitState::Stage1Converged { params } => {
                let min = self.run_stage(Stage::FullWindow, params, self.full_range())?;
                FitState::Stage2Converged {
                    params: min.params,
                    fval: min.fval,
                }
            }
            FitState::Stage2Converged { params, fval } => {
                if self.third_stage() {
                    let mut start = params.clone();
                    start[2] = 0.0;
                    let min = self.run_stage(Stage::ThirdParameter, &start, self.full_range())?;
                    FitState::Stage3Converged {
                        params: min.params,
                        fval: min.fval,
                    }
                } else {
                    FitState::Reported(Box::new(self.report(Stage::FullWindow, params, *fval)?))
                }
            }
            FitState::Stage3Converged { params, fval } => {
                FitState::Reported(Box::new(self.report(Stage::ThirdParameter, params, *fval)?))
            }
            FitState::Reported(_) => return Ok(&self.state),
        };
        self.state = next;
        Ok(&self.state)
    }

    /// Run all stages and return the report.
    pub fn run(mut self) -> Result<FitResult, FitError> {
        loop {
            self.advance()?;
            if let FitState::Reported(result) = self.state {
                return Ok(*result);
            }
        }
    }

    fn report(&self, stage: Stage, params: &[f64], fval: f64) -> Result<FitResult, FitError> {
        let range = self.full_range();
        let space = self.space(stage, params)?;
        let objective = PoissonObjective::new(self.model, self.observation, range.clone())?;
        Ok(build_result(
            self.kind(),
            self.model,
            self.observation,
            &self.spatial,
            range,
            &objective,
            &space,
            params,
            2.0 * fval,
            self.third_stage(),
        ))
    }
}

/// Family seeds with the third parameter at zero.
fn seeds(config: &FitConfig, kind: ModelKind) -> Vec<f64> {
    let mut seeds = config.family(kind).seeds.to_vec();
    seeds[2] = 0.0;
    seeds
}

fn failed(stage: Stage, failure: MinimizeFailure) -> FitError {
    FitError::FitFailed {
        stage,
        params: failure.params,
        reason: failure.reason,
    }
}

/// Assemble the report: uncertainties, goodness of fit, and warnings.
fn build_result(
    kind: ModelKind,
    model: &dyn Spectrum,
    observation: &Observation,
    spatial: &SpatialBin,
    range: Range<usize>,
    objective: &dyn ObjectiveFunction,
    space: &ParamSpace,
    params: &[f64],
    test_statistic: f64,
    third_reported: bool,
) -> FitResult {
    let uncertainties = hessian_uncertainties(objective, space, params);
    let names = kind.param_names();
    let mut warnings = Vec::new();

    // Pinned parameters are reported exactly on their bound.
    let mut params = params.to_vec();
    for &i in &uncertainties.pinned {
        let (lo, hi) = space.bounds[i];
        params[i] = if (params[i] - lo).abs() <= (hi - params[i]).abs() { lo } else { hi };
        log::warn!("{kind}: {} pinned at bound ({:e})", names[i], params[i]);
        warnings.push(FitWarning::ParameterAtBound {
            name: names[i].to_string(),
            value: params[i],
        });
    }

    let n_reported = if third_reported { 3 } else { 2 };
    let estimates = (0..n_reported)
        .map(|i| ParamEstimate {
            name: names[i].to_string(),
            value: params[i],
            error: uncertainties.errors[i],
        })
        .collect();

    let sed: Vec<f64> = SedIter::new(model, &params, range.clone()).collect();
    let chi2 = chi_square(
        &sed,
        &observation.sed()[range.clone()],
        &observation.sed_error()[range.clone()],
    );
    let dof = range.len() as i64 - space.n_free() as i64;
    if dof <= 0 {
        log::warn!("{kind}: {dof} degrees of freedom");
        warnings.push(FitWarning::NonPositiveDof { dof });
    }

    let cutoff_energy = (kind.has_cutoff_param() && third_reported)
        .then(|| CutoffEnergy::from_inverse(params[2], uncertainties.errors[2]));

    FitResult {
        model: kind,
        spatial: spatial.clone(),
        energies: observation.energies()[range].to_vec(),
        sed,
        params: estimates,
        test_statistic,
        chi_square: chi2,
        dof,
        reduced_chi_square: reduced_chi_square(chi2, dof),
        cutoff_energy,
        warnings,
    }
}

/// Single-stage chi-square fit of the SED profile over the full fit window.
pub fn fit_chi_square(
    config: &FitConfig,
    model: &dyn Spectrum,
    observation: &Observation,
    spatial: SpatialBin,
) -> Result<FitResult, FitError> {
    let driver = FitDriver::new(config, model, observation, spatial)?;
    let range = driver.full_range();
    let space = driver.space(Stage::ChiSquare, &seeds(config, model.kind()))?;
    let objective = ChiSquareObjective::new(model, observation, range.clone())?;
    let minimum = driver
        .minimizer
        .minimize(&objective, &space)
        .map_err(|f| failed(Stage::ChiSquare, f))?;

    let poisson = PoissonObjective::new(model, observation, range.clone())?;
    let test_statistic = match poisson.eval(&minimum.params) {
        Ok(v) => 2.0 * v,
        Err(e) => {
            log::warn!("{}: likelihood undefined at chi-square minimum: {e}", model.kind());
            f64::NAN
        }
    };
    Ok(build_result(
        model.kind(),
        model,
        observation,
        &driver.spatial,
        range,
        &objective,
        &space,
        &minimum.params,
        test_statistic,
        driver.third_stage(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::data::{Exposure, Noise, SyntheticSpec, demo_dataset, synthetic_profiles};
    use crate::domain::EnergyGrid;
    use crate::models::{LogParabolaSpectrum, PowerLawSpectrum, inverse_compton, pion_decay};
    use crate::physics::TargetPhotonField;

    fn spatial() -> SpatialBin {
        SpatialBin {
            lat_index: 0,
            lon_index: 0,
            lon: 0.0,
            lat: 0.0,
            lon_half_width: 5.0,
            lat_half_width: 5.0,
        }
    }

    /// 18 bins with Δln E ≈ 0.384.
    fn cutoff_grid() -> EnergyGrid {
        EnergyGrid::log_spaced(0.3, 0.3 * (0.3837641821164575f64 * 17.0).exp(), 18).unwrap()
    }

    fn cutoff_scenario(noise: Noise) -> (FitConfig, PowerLawSpectrum, Observation) {
        power_law_scenario(&[1e-6, 0.3, 1e-3], noise)
    }

    /// Power law on the cutoff grid, 400 expected counts per bin, no background.
    fn power_law_scenario(truth: &[f64], noise: Noise) -> (FitConfig, PowerLawSpectrum, Observation) {
        let grid = cutoff_grid();
        let config = FitConfig::default();
        let model = PowerLawSpectrum::new(grid.as_slice().to_vec(), grid.as_slice()[config.pivot_bin]);
        let spec = SyntheticSpec {
            exposure: Exposure::TargetCounts(400.0),
            background: 0.0,
            noise,
            seed: 3,
            ..SyntheticSpec::default()
        };
        let profiles = synthetic_profiles(&grid, &model, truth, &spec).unwrap();
        let observation = Observation::new(&grid, &profiles, &config).unwrap();
        (config, model, observation)
    }

    fn run(config: &FitConfig, model: &dyn Spectrum, observation: &Observation) -> Result<FitResult, FitError> {
        FitDriver::new(config, model, observation, spatial())?.run()
    }

    #[test]
    fn driver_walks_the_stages_in_order() {
        let (config, model, observation) = cutoff_scenario(Noise::None);
        let mut driver = FitDriver::new(&config, &model, &observation, spatial()).unwrap();
        assert!(matches!(driver.state(), FitState::Seeded { .. }));
        assert!(matches!(driver.advance().unwrap(), FitState::Stage1Converged { .. }));
        assert!(matches!(driver.advance().unwrap(), FitState::Stage2Converged { .. }));
        assert!(matches!(driver.advance().unwrap(), FitState::Stage3Converged { .. }));
        assert!(matches!(driver.advance().unwrap(), FitState::Reported(_)));
        assert!(driver.state().params().is_none());
    }

    #[test]
    fn noiseless_cutoff_power_law_is_recovered() {
        let (config, model, observation) = cutoff_scenario(Noise::None);
        let result = FitDriver::new(&config, &model, &observation, spatial())
            .unwrap()
            .run()
            .unwrap();

        let gamma = result.param("gamma").unwrap().value;
        let inv = result.param("Ecut_inv").unwrap().value;
        assert!((gamma - 0.3).abs() < 0.05 * 0.3, "gamma = {gamma}");
        assert!((inv - 1e-3).abs() < 0.05 * 1e-3, "invEcut = {inv}");
        assert_eq!(result.dof, 14 - 3);
        assert_eq!(result.energies.len(), 14);
        match result.cutoff_energy {
            Some(CutoffEnergy::Finite { value, .. }) => assert!((value - 1000.0).abs() < 60.0),
            other => panic!("unexpected cutoff {other:?}"),
        }
        assert!(result.reduced_chi_square.unwrap() < 1e-3);
    }

    #[test]
    fn noisy_cutoff_power_law_is_within_errors() {
        let (config, model, observation) = cutoff_scenario(Noise::Relative(0.05));
        let result = FitDriver::new(&config, &model, &observation, spatial())
            .unwrap()
            .run()
            .unwrap();

        let gamma = result.param("gamma").unwrap();
        let inv = result.param("Ecut_inv").unwrap();
        let sigma_gamma = gamma.error.unwrap();
        assert!((gamma.value - 0.3).abs() < 5.0 * sigma_gamma);
        if let Some(sigma_inv) = inv.error {
            assert!((inv.value - 1e-3).abs() < 5.0 * sigma_inv);
        }
        assert_eq!(result.dof, 11);
    }

    #[test]
    fn without_cutoff_two_parameters_are_reported() {
        let (mut config, model, observation) = cutoff_scenario(Noise::None);
        config.cutoff = false;
        let result = FitDriver::new(&config, &model, &observation, spatial())
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(result.params.len(), 2);
        assert_eq!(result.dof, 12);
        assert!(result.cutoff_energy.is_none());
    }

    #[test]
    fn log_parabola_demo_bin_fits_well() {
        let dataset = demo_dataset(1, 1, 5).unwrap();
        let config = FitConfig::default();
        let model = LogParabolaSpectrum::new(dataset.grid.as_slice().to_vec());
        let data = &dataset.bins[0];
        let observation = Observation::new(&dataset.grid, &data.profiles, &config).unwrap();
        let result = FitDriver::new(&config, &model, &observation, data.bin.clone())
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(result.params.len(), 3);
        assert!(result.reduced_chi_square.unwrap() < 3.0);
        assert!(result.test_statistic.is_finite());
    }

    #[test]
    fn inverse_compton_on_cmb_is_recovered() {
        let grid = EnergyGrid::log_spaced(0.3, 100.0, 18).unwrap();
        let mut config = FitConfig::default();
        config.cutoff = false;
        let field = TargetPhotonField::cmb(1e-6, 1e-1).unwrap();
        let model = inverse_compton(grid.as_slice().to_vec(), config.electron_energies.clone(), field);
        let truth = [5e6, 1.7, 0.0];
        let spec = SyntheticSpec {
            exposure: Exposure::TargetCounts(400.0),
            noise: Noise::None,
            ..SyntheticSpec::default()
        };
        let profiles = synthetic_profiles(&grid, &model, &truth, &spec).unwrap();
        let observation = Observation::new(&grid, &profiles, &config).unwrap();
        let result = FitDriver::new(&config, &model, &observation, spatial())
            .unwrap()
            .run()
            .unwrap();

        let n0 = result.param("N_0").unwrap().value;
        let gamma = result.param("gamma").unwrap().value;
        assert!((gamma - 1.7).abs() < 0.02, "gamma = {gamma}");
        assert!((n0 / 5e6 - 1.0).abs() < 0.05, "N0 = {n0}");
    }

    #[test]
    fn chi_square_fit_matches_truth_without_noise() {
        let (config, model, observation) = cutoff_scenario(Noise::None);
        let result = fit_chi_square(&config, &model, &observation, spatial()).unwrap();
        assert!((result.param("gamma").unwrap().value - 0.3).abs() < 0.015);
        assert!(result.chi_square < 1e-3);
        assert_eq!(result.dof, 11);
    }

    #[test]
    fn small_normalization_without_background_is_recovered() {
        let (config, model, observation) = power_law_scenario(&[5e-8, 0.3, 1e-3], Noise::None);
        assert!(observation.background().iter().all(|&b| b == 0.0));
        let result = run(&config, &model, &observation).unwrap();

        let n0 = result.param("N_0").unwrap().value;
        let gamma = result.param("gamma").unwrap().value;
        assert!((n0 / 5e-8 - 1.0).abs() < 0.05, "N0 = {n0}");
        assert!((gamma - 0.3).abs() < 0.05 * 0.3, "gamma = {gamma}");
    }

    #[test]
    fn hardening_spectrum_reports_infinite_cutoff_at_bound() {
        // A negative inverse cutoff in the truth puts the constrained minimum on invEcut = 0.
        let (config, model, observation) = power_law_scenario(&[1e-6, 0.3, -2e-3], Noise::None);
        let result = run(&config, &model, &observation).unwrap();

        assert_eq!(result.param("Ecut_inv").unwrap().value, 0.0);
        assert_eq!(result.param("Ecut_inv").unwrap().error, None);
        assert_eq!(result.cutoff_energy, Some(CutoffEnergy::Infinite));
        assert!(result.warnings.iter().any(|w| matches!(
            w,
            FitWarning::ParameterAtBound { name, value } if name == "Ecut_inv" && *value == 0.0
        )));
    }

    #[test]
    fn window_without_spare_bins_warns_about_dof() {
        let (mut config, model, observation) = cutoff_scenario(Noise::None);
        config.fit_min = 4;
        config.fit_max = 7;
        let result = run(&config, &model, &observation).unwrap();

        assert_eq!(result.energies.len(), 3);
        assert_eq!(result.dof, 0);
        assert!(result.reduced_chi_square.is_none());
        assert!(result.warnings.contains(&FitWarning::NonPositiveDof { dof: 0 }));
    }

    #[test]
    fn zero_stage_timeout_fails_the_first_stage() {
        let (mut config, model, observation) = cutoff_scenario(Noise::None);
        config.minimizer.stage_timeout = Some(Duration::ZERO);
        match run(&config, &model, &observation) {
            Err(FitError::FitFailed { stage, reason, .. }) => {
                assert_eq!(stage, Stage::NarrowWindow);
                assert!(reason.contains("timeout"));
            }
            other => panic!("expected a stage failure, got {other:?}"),
        }
    }

    #[test]
    fn pion_decay_is_recovered() {
        let grid = EnergyGrid::log_spaced(0.3, 100.0, 18).unwrap();
        let mut config = FitConfig::default();
        config.cutoff = false;
        let truth = [3e6, 2.2, 0.0];
        let spec = SyntheticSpec {
            exposure: Exposure::TargetCounts(400.0),
            noise: Noise::None,
            ..SyntheticSpec::default()
        };
        let generator = pion_decay(grid.as_slice().to_vec(), config.proton_momenta.clone());
        let profiles = synthetic_profiles(&grid, &generator, &truth, &spec).unwrap();
        let observation = Observation::new(&grid, &profiles, &config).unwrap();

        let model = pion_decay(grid.as_slice().to_vec(), config.proton_momenta.clone());
        let result = run(&config, &model, &observation).unwrap();

        let n0 = result.param("N_0").unwrap().value;
        let gamma = result.param("gamma").unwrap().value;
        assert!((gamma - 2.2).abs() < 0.02, "gamma = {gamma}");
        assert!((n0 / 3e6 - 1.0).abs() < 0.05, "N0 = {n0}");
        assert!(result.cutoff_energy.is_none());
    }

    #[test]
    fn config_outside_grid_is_rejected() {
        let (mut config, model, observation) = cutoff_scenario(Noise::None);
        config.fit_min = 20;
        assert!(matches!(
            FitDriver::new(&config, &model, &observation, spatial()),
            Err(FitError::InvalidConfig(_))
        ));
    }
}
