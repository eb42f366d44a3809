//! YAML profile dictionaries.
//!
//! Profiles are nested sequences indexed `[latitude][longitude][energy]`. The
//! counts dictionary of the selected input provides the energy grid, the bin
//! centers, the signal and its standard deviation; the exposure dictionary
//! provides exposure, solid angle and bin widths; the total observed counts
//! come from the baseline data selection and are aligned on their trailing
//! `nE` entries.
//!
//! Axis problems (energy grid, latitude rows, deltaE) fail the whole dataset.
//! A malformed profile only affects its own spatial bin: the bin is kept with
//! the profiles as found, and its fit fails the length check.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::domain::{BinProfiles, Dataset, EnergyGrid, LowEnergyRange, SpatialBin, SpatialData};
use crate::error::{AppError, FitError};

/// Longitude width of the spatial bins (deg).
pub const DEFAULT_LON_WIDTH: f64 = 10.0;

/// Latitude width of each latitude row (deg).
pub const DEFAULT_LAT_WIDTHS: [f64; 15] = [
    10.0, 10.0, 10.0, 10.0, 10.0, 4.0, 4.0, 4.0, 4.0, 4.0, 10.0, 10.0, 10.0, 10.0, 10.0,
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CountsDictionary {
    #[serde(rename = "3) Center_of_lon_bins")]
    pub lon_centers: Vec<f64>,
    #[serde(rename = "4) Center_of_lat_bins")]
    pub lat_centers: Vec<f64>,
    #[serde(rename = "5) Energy_bins")]
    pub energies: Vec<f64>,
    #[serde(rename = "6) Differential_flux_profiles")]
    pub signal: Vec<Vec<Vec<f64>>>,
    #[serde(rename = "7) Standard_deviation_profiles")]
    pub std_dev: Vec<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExposureDictionary {
    #[serde(rename = "6) Exposure_profiles")]
    pub exposure: Vec<Vec<Vec<f64>>>,
    /// One solid angle per spatial bin, `[latitude][longitude]`.
    #[serde(rename = "7) dOmega_profiles")]
    pub solid_angle: Vec<Vec<f64>>,
    #[serde(rename = "8) deltaE")]
    pub delta_e: Vec<f64>,
}

/// Only the count profiles of the baseline data dictionary are used.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TotalCountsDictionary {
    #[serde(rename = "6) Differential_flux_profiles")]
    pub total: Vec<Vec<Vec<f64>>>,
}

/// Parse a YAML file into `T`.
pub fn load_yaml<T: DeserializeOwned + 'static>(path: &Path) -> Result<T, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::new(2, format!("Failed to read '{}': {e}", path.display())))?;
    serde_yml::from_str(&text).map_err(|e| AppError::new(2, format!("Invalid dictionary '{}': {e}", path.display())))
}

/// Bin geometry of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct BinWidths {
    pub lon: f64,
    pub lat: Vec<f64>,
}

impl Default for BinWidths {
    fn default() -> Self {
        Self {
            lon: DEFAULT_LON_WIDTH,
            lat: DEFAULT_LAT_WIDTHS.to_vec(),
        }
    }
}

/// Profile of bin `(b, l)`; empty when missing.
fn profile(profiles: &[Vec<Vec<f64>>], b: usize, l: usize) -> &[f64] {
    profiles.get(b).and_then(|row| row.get(l)).map(Vec::as_slice).unwrap_or(&[])
}

/// Trailing `n` entries of `values`, or all of them when there are fewer.
fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

/// Entries of `values` from `offset` on.
fn from_offset(values: &[f64], offset: usize) -> &[f64] {
    values.get(offset..).unwrap_or(&[])
}

/// Combine the three dictionaries into per-bin profiles.
///
/// `range` drops the leading exposure and deltaE bins that the counts
/// dictionary of that range does not cover.
pub fn assemble_dataset(
    counts: &CountsDictionary,
    exposure: &ExposureDictionary,
    totals: &TotalCountsDictionary,
    range: LowEnergyRange,
    widths: &BinWidths,
) -> Result<Dataset, FitError> {
    let grid = EnergyGrid::new(counts.energies.clone())?;
    let n_e = grid.len();
    let n_lat = counts.lat_centers.len();
    let n_lon = counts.lon_centers.len();
    let offset = range.bin_offset();

    if counts.signal.len() != n_lat {
        return Err(FitError::shape("latitude rows of the flux profiles", n_lat, counts.signal.len()));
    }
    if widths.lat.len() < n_lat {
        return Err(FitError::shape("latitude widths", n_lat, widths.lat.len()));
    }
    let delta_e = from_offset(&exposure.delta_e, offset);
    if delta_e.len() != n_e {
        return Err(FitError::shape("deltaE", n_e + offset, exposure.delta_e.len()));
    }

    let mut bins = Vec::with_capacity(n_lat * n_lon);
    for (b, &lat) in counts.lat_centers.iter().enumerate() {
        for (l, &lon) in counts.lon_centers.iter().enumerate() {
            let solid_angle = match exposure.solid_angle.get(b).and_then(|row| row.get(l)) {
                Some(&omega) => vec![omega; n_e],
                None => Vec::new(),
            };
            let data = SpatialData {
                bin: SpatialBin {
                    lat_index: b,
                    lon_index: l,
                    lon,
                    lat,
                    lon_half_width: widths.lon / 2.0,
                    lat_half_width: widths.lat[b] / 2.0,
                },
                profiles: BinProfiles {
                    signal: profile(&counts.signal, b, l).to_vec(),
                    std_dev: profile(&counts.std_dev, b, l).to_vec(),
                    total: tail(profile(&totals.total, b, l), n_e).to_vec(),
                    exposure: from_offset(profile(&exposure.exposure, b, l), offset).to_vec(),
                    solid_angle,
                    delta_e: delta_e.to_vec(),
                },
            };
            if let Err(e) = data.profiles.validate(n_e) {
                log::warn!("bin (b={b}, l={l}) (lon={lon}, lat={lat}) will be skipped: {e}");
            }
            bins.push(data);
        }
    }

    Ok(Dataset {
        grid,
        lon_centers: counts.lon_centers.clone(),
        lat_centers: counts.lat_centers.clone(),
        bins,
    })
}
