//! Synthetic spectra with known generating parameters.
//!
//! Used by the tests and by `sedfit demo`. Profiles are generated in counts
//! exactly the way the fit consumes them:
//!
//! - signal counts `= SED · exposure · dΩ · ΔE / E²` plus optional noise
//! - total counts `= signal + background`
//! - standard deviations from the noise model (floored later by the fit)
//!
//! Noise is drawn from a seeded `StdRng`, so every dataset is reproducible.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{BinProfiles, Dataset, EnergyGrid, SpatialBin, SpatialData};
use crate::error::FitError;
use crate::models::{LogParabolaSpectrum, Spectrum};

/// Noise added to the signal counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Noise {
    None,
    /// Gaussian with `σ = sqrt(expected total counts)`.
    Counting,
    /// Gaussian with `σ = fraction · expected signal counts`.
    Relative(f64),
}

/// Exposure profile of the synthetic instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Exposure {
    /// Same exposure (cm² s) in every bin.
    Flat(f64),
    /// Per-bin exposure chosen so the expected signal is this many counts.
    TargetCounts(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub exposure: Exposure,
    pub solid_angle: f64,
    /// Background counts per bin.
    pub background: f64,
    pub noise: Noise,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            exposure: Exposure::Flat(5e10),
            solid_angle: 0.03,
            background: 10.0,
            noise: Noise::Counting,
            seed: 7,
        }
    }
}

/// Profiles of one spatial bin generated from `model(params)`.
pub fn synthetic_profiles(
    grid: &EnergyGrid,
    model: &dyn Spectrum,
    params: &[f64],
    spec: &SyntheticSpec,
) -> Result<BinProfiles, FitError> {
    if model.energies().len() != grid.len() {
        return Err(FitError::shape("model energy grid", grid.len(), model.energies().len()));
    }
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let normal = Normal::new(0.0, 1.0).map_err(|e| FitError::InvalidConfig(format!("noise distribution: {e}")))?;

    let energies = grid.as_slice();
    let delta_e = grid.bin_widths();
    let n = grid.len();

    let mut profiles = BinProfiles {
        signal: Vec::with_capacity(n),
        std_dev: Vec::with_capacity(n),
        total: Vec::with_capacity(n),
        exposure: Vec::with_capacity(n),
        solid_angle: vec![spec.solid_angle; n],
        delta_e: delta_e.clone(),
    };

    for i in 0..n {
        let sed = model.sed(params, i);
        let per_exposure = spec.solid_angle * delta_e[i] / (energies[i] * energies[i]);
        let exposure = match spec.exposure {
            Exposure::Flat(v) => v,
            Exposure::TargetCounts(c) => c / (sed * per_exposure),
        };
        if !(exposure.is_finite() && exposure > 0.0) {
            return Err(FitError::InvalidConfig(format!("synthetic exposure undefined in bin {i}")));
        }
        let expected = sed * exposure * per_exposure;

        let (sigma, noise) = match spec.noise {
            Noise::None => ((expected + spec.background).sqrt(), 0.0),
            Noise::Counting => {
                let s = (expected + spec.background).sqrt();
                (s, s * normal.sample(&mut rng))
            }
            Noise::Relative(fraction) => {
                let s = fraction * expected;
                (s, s * normal.sample(&mut rng))
            }
        };

        let signal = expected + noise;
        profiles.signal.push(signal);
        profiles.std_dev.push(sigma);
        profiles.total.push((signal + spec.background).max(0.0));
        profiles.exposure.push(exposure);
    }
    Ok(profiles)
}

/// Log-parabola truth of the demo scenario: `(N0, α, β)`.
pub const DEMO_TRUTH: [f64; 3] = [2e-6, 0.4, 0.05];

/// 18 log-spaced bins from 0.3 to 100 GeV, flat background of 10 counts, and a
/// log-parabola signal, on a small grid of spatial bins.
pub fn demo_dataset(n_lat: usize, n_lon: usize, seed: u64) -> Result<Dataset, FitError> {
    let grid = EnergyGrid::log_spaced(0.3, 100.0, 18)?;
    let model = LogParabolaSpectrum::new(grid.as_slice().to_vec());
    let lat_centers: Vec<f64> = (0..n_lat).map(|b| -5.0 * (n_lat as f64 - 1.0) + 10.0 * b as f64).collect();
    let lon_centers: Vec<f64> = (0..n_lon).map(|l| 5.0 * (n_lon as f64 - 1.0) - 10.0 * l as f64).collect();

    let mut bins = Vec::with_capacity(n_lat * n_lon);
    for (b, &lat) in lat_centers.iter().enumerate() {
        for (l, &lon) in lon_centers.iter().enumerate() {
            let spec = SyntheticSpec {
                seed: seed.wrapping_add((b * n_lon + l) as u64),
                ..SyntheticSpec::default()
            };
            bins.push(SpatialData {
                bin: SpatialBin {
                    lat_index: b,
                    lon_index: l,
                    lon,
                    lat,
                    lon_half_width: 5.0,
                    lat_half_width: 5.0,
                },
                profiles: synthetic_profiles(&grid, &model, &DEMO_TRUTH, &spec)?,
            });
        }
    }
    Ok(Dataset {
        grid,
        lon_centers,
        lat_centers,
        bins,
    })
}
