//! Target photon fields for inverse-Compton scattering.
//!
//! A field is stored as the number density per logarithmic energy interval,
//! `E dn/dE` (cm⁻³), on an ascending grid with a fixed step in `ln E`.
//!
//! The combined field at a given height above the plane is
//!
//! - the interstellar radiation field (ISRF) table for that height, converted
//!   from wavelength to energy, and
//! - a 2.73 K black body for the cosmic microwave background,
//!
//! summed on one common grid that extends the ISRF grid down to `1e-6 eV`.

use std::f64::consts::PI;

use crate::error::FitError;
use crate::math::integrate_log;
use crate::physics::{BOLTZMANN, CMB_TEMPERATURE, H_C_EV_MICRON, HBAR_C};

/// Step in `ln E` shared by the ISRF tables and the common grid.
pub const FIELD_LOG_STEP: f64 = 0.023_025_850_929_939_8;

/// Lowest energy of the common grid (eV).
pub const FIELD_MIN_ENERGY: f64 = 1e-6;

/// Relative tolerance on each ISRF table step.
const SPACING_TOL: f64 = 1e-2;

/// Largest offset, in grid steps, of an ISRF point from its common-grid energy.
const ALIGN_TOL: f64 = 0.05;

/// `E dn/dE` (cm⁻³) of a black body with temperature `kt` (eV) at `energy` (eV).
pub fn thermal_spectrum(energy: f64, kt: f64) -> f64 {
    let x = energy / kt;
    if x > 700.0 {
        return 0.0;
    }
    energy.powi(3) / (PI * PI * HBAR_C.powi(3) * x.exp_m1())
}

/// ISRF table at one height: wavelengths (µm, ascending) and the total
/// energy density per logarithmic interval (eV cm⁻³).
#[derive(Debug, Clone, PartialEq)]
pub struct IsrfTable {
    pub height: f64,
    pub wavelengths: Vec<f64>,
    pub total: Vec<f64>,
}

impl IsrfTable {
    /// Ascending energies (eV) and `E dn/dE` (cm⁻³) of the table.
    pub fn number_density(&self) -> Result<(Vec<f64>, Vec<f64>), FitError> {
        if self.wavelengths.len() != self.total.len() {
            return Err(FitError::shape("ISRF total column", self.wavelengths.len(), self.total.len()));
        }
        if self.wavelengths.len() < 2 {
            return Err(FitError::PhotonFieldGrid(format!(
                "ISRF table at height {} has fewer than 2 rows",
                self.height
            )));
        }
        let energies: Vec<f64> = self.wavelengths.iter().rev().map(|w| H_C_EV_MICRON / w).collect();
        let density = self
            .total
            .iter()
            .rev()
            .zip(&energies)
            .map(|(u, e)| u / e)
            .collect();
        Ok((energies, density))
    }
}

/// Photon number density per log energy on an ascending log grid.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPhotonField {
    energies: Vec<f64>,
    density: Vec<f64>,
}

impl TargetPhotonField {
    /// Field from ascending energies (eV) and `E dn/dE` (cm⁻³).
    ///
    /// The grid must step by [`FIELD_LOG_STEP`] in `ln E`.
    pub fn new(energies: Vec<f64>, density: Vec<f64>) -> Result<Self, FitError> {
        if energies.len() != density.len() {
            return Err(FitError::shape("photon field density", energies.len(), density.len()));
        }
        check_spacing(&energies)?;
        if density.iter().any(|d| !(d.is_finite() && *d >= 0.0)) {
            return Err(FitError::PhotonFieldGrid("photon density must be finite and non-negative".into()));
        }
        Ok(Self { energies, density })
    }

    /// CMB black body on the common grid between `e_min` and `e_max` (eV).
    pub fn cmb(e_min: f64, e_max: f64) -> Result<Self, FitError> {
        let energies = common_grid(e_min, e_max);
        if energies.len() < 2 {
            return Err(FitError::PhotonFieldGrid(format!("empty CMB grid {e_min}..{e_max} eV")));
        }
        let kt = CMB_TEMPERATURE * BOLTZMANN;
        let density = energies.iter().map(|&e| thermal_spectrum(e, kt)).collect();
        Self::new(energies, density)
    }

    /// ISRF table plus CMB, on the ISRF grid extended down to [`FIELD_MIN_ENERGY`].
    pub fn from_isrf(table: &IsrfTable) -> Result<Self, FitError> {
        let (isrf_energies, isrf_density) = table.number_density()?;
        check_spacing(&isrf_energies)?;

        let e_max = isrf_energies[isrf_energies.len() - 1];
        let energies = common_grid(FIELD_MIN_ENERGY, e_max);
        let n = energies.len();
        let m = isrf_energies.len();
        // ISRF occupies the top `m` points; zero below its minimum.
        let pad = n.saturating_sub(m);
        let skip = m.saturating_sub(n);

        let kt = CMB_TEMPERATURE * BOLTZMANN;
        let density = energies
            .iter()
            .enumerate()
            .map(|(i, &e)| {
                let isrf = if i >= pad { isrf_density[i - pad + skip] } else { 0.0 };
                thermal_spectrum(e, kt) + isrf
            })
            .collect();
        log::debug!(
            "photon field at height {}: {n} points, {:.3e}..{:.3e} eV",
            table.height,
            energies[0],
            e_max
        );
        Self::new(energies, density)
    }

    /// Energies (eV).
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// `E dn/dE` (cm⁻³).
    pub fn density(&self) -> &[f64] {
        &self.density
    }

    /// Total energy density (eV cm⁻³).
    pub fn energy_density(&self) -> f64 {
        integrate_log(&self.energies, &self.density)
    }
}

/// Ascending grid with step [`FIELD_LOG_STEP`] that ends exactly at `e_max`.
fn common_grid(e_min: f64, e_max: f64) -> Vec<f64> {
    if !(e_min > 0.0 && e_max > e_min) {
        return Vec::new();
    }
    let n = ((e_max / e_min).ln() / FIELD_LOG_STEP).floor() as usize + 1;
    (0..n)
        .rev()
        .map(|k| e_max * (-FIELD_LOG_STEP * k as f64).exp())
        .collect()
}

/// Check each step, then the accumulated drift against the grid ending at the
/// table's highest energy.
fn check_spacing(energies: &[f64]) -> Result<(), FitError> {
    for (i, w) in energies.windows(2).enumerate() {
        let step = (w[1] / w[0]).ln();
        if !(step.is_finite() && ((step - FIELD_LOG_STEP) / FIELD_LOG_STEP).abs() <= SPACING_TOL) {
            return Err(FitError::PhotonFieldGrid(format!(
                "log step {step:.6} at index {i} differs from {FIELD_LOG_STEP:.6}"
            )));
        }
    }

    let Some(&e_max) = energies.last() else {
        return Ok(());
    };
    let m = energies.len();
    for (j, &e) in energies.iter().enumerate() {
        let on_grid = e_max * (-FIELD_LOG_STEP * (m - 1 - j) as f64).exp();
        let drift = (e / on_grid).ln().abs() / FIELD_LOG_STEP;
        if !(drift <= ALIGN_TOL) {
            return Err(FitError::PhotonFieldGrid(format!(
                "ISRF energy {e:.4e} eV at index {j} is {drift:.2} steps off the common grid"
            )));
        }
    }
    Ok(())
}

/// Combined fields keyed by height (kpc).
#[derive(Debug, Clone, Default)]
pub struct PhotonFieldLibrary {
    fields: Vec<(f64, TargetPhotonField)>,
}

impl PhotonFieldLibrary {
    pub fn from_tables(tables: &[IsrfTable]) -> Result<Self, FitError> {
        let fields = tables
            .iter()
            .map(|t| Ok((t.height, TargetPhotonField::from_isrf(t)?)))
            .collect::<Result<Vec<_>, FitError>>()?;
        Ok(Self { fields })
    }

    pub fn insert(&mut self, height: f64, field: TargetPhotonField) {
        self.fields.retain(|(h, _)| *h != height);
        self.fields.push((height, field));
    }

    pub fn for_height(&self, height: f64) -> Result<&TargetPhotonField, FitError> {
        self.fields
            .iter()
            .find(|(h, _)| *h == height)
            .map(|(_, f)| f)
            .ok_or_else(|| FitError::InvalidConfig(format!("no ISRF table for height {height} kpc")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cmb_energy_density_matches_black_body() {
        let field = TargetPhotonField::cmb(FIELD_MIN_ENERGY, 0.1).unwrap();
        // a T⁴ at 2.73 K
        assert_relative_eq!(field.energy_density(), 0.2623, max_relative = 5e-3);
    }

    fn synthetic_table(n: usize) -> IsrfTable {
        // Wavelengths descending in energy: 0.1 µm upwards.
        let wavelengths: Vec<f64> = (0..n).map(|i| 0.1 * (FIELD_LOG_STEP * i as f64).exp()).collect();
        IsrfTable {
            height: 0.0,
            total: vec![0.5; n],
            wavelengths,
        }
    }

    #[test]
    fn isrf_is_reversed_and_padded() {
        let table = synthetic_table(200);
        let field = TargetPhotonField::from_isrf(&table).unwrap();
        let e = field.energies();
        assert!(e.windows(2).all(|w| w[1] > w[0]));
        assert_relative_eq!(e[e.len() - 1], H_C_EV_MICRON / 0.1, max_relative = 1e-12);
        assert!(e[0] >= FIELD_MIN_ENERGY);
        // Top point: ISRF Total/E, CMB negligible at 12 eV.
        let top = field.density()[e.len() - 1];
        assert_relative_eq!(top, 0.5 / e[e.len() - 1], max_relative = 1e-9);
    }

    #[test]
    fn mismatched_isrf_spacing_is_rejected() {
        let mut table = synthetic_table(20);
        table.wavelengths[10] *= 1.01;
        assert!(matches!(
            TargetPhotonField::from_isrf(&table),
            Err(FitError::PhotonFieldGrid(_))
        ));
    }

    #[test]
    fn slowly_drifting_isrf_spacing_is_rejected() {
        // Every step 0.5% long passes the per-step check but drifts a full grid step over 200 points.
        let mut table = synthetic_table(200);
        for (i, w) in table.wavelengths.iter_mut().enumerate() {
            *w = 0.1 * (1.005 * FIELD_LOG_STEP * i as f64).exp();
        }
        match TargetPhotonField::from_isrf(&table) {
            Err(FitError::PhotonFieldGrid(msg)) => assert!(msg.contains("off the common grid")),
            other => panic!("expected a grid error, got {other:?}"),
        }
    }

    #[test]
    fn library_looks_up_by_height() {
        let mut table = synthetic_table(50);
        table.height = 0.5;
        let library = PhotonFieldLibrary::from_tables(&[table]).unwrap();
        assert!(library.for_height(0.5).is_ok());
        assert!(library.for_height(2.0).is_err());
    }
}
