//! Fitting every spatial bin of a dataset.
//!
//! Spectra are built once per model (once per ISRF height for inverse
//! Compton) and shared read-only between the bin fits, so memoised kernel rows
//! are computed once per latitude row. Bins are fitted in parallel with rayon;
//! a failure is recorded in its slot of the [`ResultGrid`] and never stops the
//! other bins.

use rayon::prelude::*;

use crate::domain::{Dataset, EnergyGrid, FitConfig, FitResult, ModelKind, SpatialData};
use crate::error::FitError;
use crate::fit::{FitDriver, Observation, fit_chi_square};
use crate::models::{LogParabolaSpectrum, PowerLawSpectrum, Spectrum, inverse_compton, pion_decay};
use crate::physics::{PhotonFieldLibrary, TargetPhotonField};
use crate::report::{ResultGrid, Slot};

/// Objective minimized for every bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FitMethod {
    /// Staged Poisson likelihood on counts.
    #[default]
    Likelihood,
    /// Single-stage chi-square on the SED profile.
    #[value(name = "chi2")]
    ChiSquare,
}

/// SED model of `kind` on `grid`.
///
/// `field` is required for inverse Compton and ignored otherwise.
pub fn build_spectrum(
    kind: ModelKind,
    grid: &EnergyGrid,
    config: &FitConfig,
    field: Option<&TargetPhotonField>,
) -> Result<Box<dyn Spectrum>, FitError> {
    let energies = grid.as_slice().to_vec();
    Ok(match kind {
        ModelKind::PowerLaw => {
            let pivot = *energies.get(config.pivot_bin).ok_or_else(|| {
                FitError::InvalidConfig(format!("pivot bin {} outside the energy grid", config.pivot_bin))
            })?;
            Box::new(PowerLawSpectrum::new(energies, pivot))
        }
        ModelKind::LogParabola => Box::new(LogParabolaSpectrum::new(energies)),
        ModelKind::InverseCompton => {
            let field = field.ok_or_else(|| {
                FitError::InvalidConfig("inverse Compton needs a target photon field".into())
            })?;
            Box::new(inverse_compton(energies, config.electron_energies.clone(), field.clone()))
        }
        ModelKind::PionDecay => Box::new(pion_decay(energies, config.proton_momenta.clone())),
    })
}

/// Fit one spatial bin with an already built spectrum.
pub fn fit_spatial_bin(
    model: &dyn Spectrum,
    grid: &EnergyGrid,
    data: &SpatialData,
    config: &FitConfig,
    method: FitMethod,
) -> Result<FitResult, FitError> {
    let observation = Observation::new(grid, &data.profiles, config)?;
    match method {
        FitMethod::Likelihood => FitDriver::new(config, model, &observation, data.bin.clone())?.run(),
        FitMethod::ChiSquare => fit_chi_square(config, model, &observation, data.bin.clone()),
    }
}

/// One spectrum per latitude row.
///
/// Rows sharing an ISRF height share the same inverse-Compton spectrum.
fn row_spectra(
    kind: ModelKind,
    dataset: &Dataset,
    config: &FitConfig,
    fields: Option<&PhotonFieldLibrary>,
) -> Result<(Vec<Box<dyn Spectrum>>, Vec<usize>), FitError> {
    let n_lat = dataset.n_lat();
    if kind != ModelKind::InverseCompton {
        let spectrum = build_spectrum(kind, &dataset.grid, config, None)?;
        return Ok((vec![spectrum], vec![0; n_lat]));
    }

    let fields = fields.ok_or_else(|| FitError::InvalidConfig("inverse Compton needs ISRF tables".into()))?;
    let mut heights: Vec<f64> = Vec::new();
    let mut spectra = Vec::new();
    let mut row_index = Vec::with_capacity(n_lat);
    for b in 0..n_lat {
        let height = *config.isrf_heights.get(b).ok_or_else(|| {
            FitError::InvalidConfig(format!(
                "no ISRF height for latitude row {b} ({} configured)",
                config.isrf_heights.len()
            ))
        })?;
        let index = match heights.iter().position(|&h| h == height) {
            Some(i) => i,
            None => {
                let field = fields.for_height(height)?;
                spectra.push(build_spectrum(kind, &dataset.grid, config, Some(field))?);
                heights.push(height);
                heights.len() - 1
            }
        };
        row_index.push(index);
    }
    Ok((spectra, row_index))
}

/// Fit `kind` to every bin of `dataset`.
pub fn fit_dataset_model(
    dataset: &Dataset,
    config: &FitConfig,
    kind: ModelKind,
    fields: Option<&PhotonFieldLibrary>,
    method: FitMethod,
) -> Result<ResultGrid, FitError> {
    config.validate(dataset.grid.len())?;
    let (spectra, row_index) = row_spectra(kind, dataset, config, fields)?;

    let slots: Vec<(usize, usize, Slot)> = dataset
        .bins
        .par_iter()
        .map(|data| {
            let (b, l) = (data.bin.lat_index, data.bin.lon_index);
            let Some(&row) = row_index.get(b) else {
                return (b, l, Slot::Failed(format!("latitude row {b} outside the dataset")));
            };
            match fit_spatial_bin(spectra[row].as_ref(), &dataset.grid, data, config, method) {
                Ok(result) => {
                    log::info!(
                        "{kind} l={} b={}: TS={:.2} chi2/dof={}",
                        data.bin.lon,
                        data.bin.lat,
                        result.test_statistic,
                        result
                            .reduced_chi_square
                            .map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
                    );
                    (b, l, Slot::Fitted(Box::new(result)))
                }
                Err(e) => {
                    log::warn!("{kind} l={} b={}: skipped ({e})", data.bin.lon, data.bin.lat);
                    (b, l, Slot::Failed(e.to_string()))
                }
            }
        })
        .collect();

    let mut grid = ResultGrid::new(kind, dataset.n_lat(), dataset.n_lon());
    for (b, l, slot) in slots {
        grid.set(b, l, slot)?;
    }
    Ok(grid)
}

/// Fit every requested model to every bin of `dataset`.
pub fn fit_dataset(
    dataset: &Dataset,
    config: &FitConfig,
    models: &[ModelKind],
    fields: Option<&PhotonFieldLibrary>,
    method: FitMethod,
) -> Result<Vec<ResultGrid>, FitError> {
    models
        .iter()
        .map(|&kind| {
            log::info!("fitting {} to {} spatial bins", kind.display_name(), dataset.bins.len());
            fit_dataset_model(dataset, config, kind, fields, method)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Exposure, Noise, SyntheticSpec, demo_dataset, synthetic_profiles};

    #[test]
    fn demo_dataset_fits_every_bin() {
        let dataset = demo_dataset(2, 2, 1).unwrap();
        let config = FitConfig::default();
        let grids = fit_dataset(
            &dataset,
            &config,
            &[ModelKind::LogParabola],
            None,
            FitMethod::Likelihood,
        )
        .unwrap();
        assert_eq!(grids.len(), 1);
        let grid = &grids[0];
        assert_eq!(grid.n_fitted(), 4);
        assert_eq!(grid.failures().count(), 0);
        let fit = grid.result(1, 0).unwrap();
        assert_eq!(fit.spatial.lat_index, 1);
        assert_eq!(fit.spatial.lon_index, 0);
    }

    #[test]
    fn inverse_compton_without_fields_is_a_config_error() {
        let dataset = demo_dataset(1, 1, 1).unwrap();
        let err = fit_dataset_model(
            &dataset,
            &FitConfig::default(),
            ModelKind::InverseCompton,
            None,
            FitMethod::Likelihood,
        )
        .unwrap_err();
        assert!(matches!(err, FitError::InvalidConfig(_)));
    }

    #[test]
    fn failing_bin_does_not_block_the_others() {
        let mut dataset = demo_dataset(1, 2, 1).unwrap();
        dataset.bins[1].profiles.exposure.pop();
        let grid = fit_dataset_model(
            &dataset,
            &FitConfig::default(),
            ModelKind::LogParabola,
            None,
            FitMethod::Likelihood,
        )
        .unwrap();
        assert!(grid.result(0, 0).is_some());
        let failures: Vec<_> = grid.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!((failures[0].0, failures[0].1), (0, 1));
        assert!(failures[0].2.contains("exposure"));
    }

    #[test]
    fn pion_spectrum_only_touches_fit_window_rows() {
        let dataset = demo_dataset(1, 1, 2).unwrap();
        let mut config = FitConfig::default();
        config.cutoff = false;
        let spec = SyntheticSpec {
            exposure: Exposure::TargetCounts(400.0),
            noise: Noise::None,
            ..SyntheticSpec::default()
        };
        let generator = pion_decay(dataset.grid.as_slice().to_vec(), config.proton_momenta.clone());
        let mut data = dataset.bins[0].clone();
        data.profiles = synthetic_profiles(&dataset.grid, &generator, &[4e6, 2.0, 0.0], &spec).unwrap();

        let model = pion_decay(dataset.grid.as_slice().to_vec(), config.proton_momenta.clone());
        let fit = fit_spatial_bin(&model, &dataset.grid, &data, &config, FitMethod::Likelihood).unwrap();
        assert_eq!(fit.model, ModelKind::PionDecay);
        let rows = model.response().computed_rows();
        assert!(rows > 0);
        assert!(rows <= config.fit_range(dataset.grid.len()).len());
    }
}
