//! Inverse-Compton emission from an electron population in a target photon field.
//!
//! Electrons follow `E dN/dE = N0 E^-Γ exp(-E invEcut)` on a log grid in energy
//! (GeV). The scattering kernel is the full Klein–Nishina cross-section for an
//! isotropic target field (Blumenthal & Gould 1970, eq. 2.48).

use crate::domain::ModelKind;
use crate::math::log_trapezoid_weights;
use crate::models::{ResponseKernel, ResponseSpectrum};
use crate::physics::{ELECTRON_REST_ENERGY, GEV_TO_EV, SIGMA_THOMSON, SPEED_OF_LIGHT, TargetPhotonField};

/// Scattered-photon spectrum `dN/(dt dE1)` (s⁻¹ eV⁻¹) of one electron with Lorentz
/// factor `gamma` on one target photon of energy `eps`. Energies in eV.
pub fn klein_nishina(e1: f64, eps: f64, gamma: f64) -> f64 {
    let electron = gamma * ELECTRON_REST_ENERGY;
    if !(e1 > 0.0 && eps > 0.0 && e1 < electron) {
        return 0.0;
    }
    let big_gamma = 4.0 * eps * gamma / ELECTRON_REST_ENERGY;
    let q = e1 / (big_gamma * (electron - e1));
    if !(q <= 1.0 && q >= 0.25 / (gamma * gamma)) {
        return 0.0;
    }
    let gq = big_gamma * q;
    let f = 2.0 * q * q.ln() + (1.0 + 2.0 * q) * (1.0 - q) + gq * gq * (1.0 - q) / (2.0 * (1.0 + gq));
    0.75 * SIGMA_THOMSON * SPEED_OF_LIGHT / (gamma * gamma * eps) * f.max(0.0)
}

/// Inverse-Compton response on a fixed electron grid and photon field.
#[derive(Debug, Clone)]
pub struct IcKernel {
    electrons: Vec<f64>,
    electron_weights: Vec<f64>,
    field: TargetPhotonField,
    field_weights: Vec<f64>,
}

impl IcKernel {
    /// `electrons`: electron energies (GeV), ascending and log-spaced.
    pub fn new(electrons: Vec<f64>, field: TargetPhotonField) -> Self {
        let electron_weights = log_trapezoid_weights(&electrons);
        let field_weights = log_trapezoid_weights(field.energies());
        Self {
            electrons,
            electron_weights,
            field,
            field_weights,
        }
    }
}

impl ResponseKernel for IcKernel {
    fn particle_grid(&self) -> &[f64] {
        &self.electrons
    }

    fn row(&self, e_gamma: f64) -> Vec<f64> {
        let e1 = e_gamma * GEV_TO_EV;
        let targets = self.field.energies();
        let density = self.field.density();

        self.electrons
            .iter()
            .zip(&self.electron_weights)
            .map(|(&ee, &we)| {
                if ee <= e_gamma {
                    return 0.0;
                }
                let gamma = ee * GEV_TO_EV / ELECTRON_REST_ENERGY;
                let rate: f64 = targets
                    .iter()
                    .zip(density)
                    .zip(&self.field_weights)
                    .map(|((&eps, &n), &wk)| wk * n * klein_nishina(e1, eps, gamma))
                    .sum();
                // E dN/dE1 in GeV: E_γ · E1 dN/dE1.
                e_gamma * e1 * we * rate
            })
            .collect()
    }
}

/// Inverse-Compton SED model on the photon energy grid `energies` (GeV).
pub type InverseComptonSpectrum = ResponseSpectrum<IcKernel>;

pub fn inverse_compton(energies: Vec<f64>, electrons: Vec<f64>, field: TargetPhotonField) -> InverseComptonSpectrum {
    ResponseSpectrum::new(ModelKind::InverseCompton, IcKernel::new(electrons, field), energies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{integrate_log, log_space, log10_arange};
    use crate::models::Spectrum;
    use approx::assert_relative_eq;

    #[test]
    fn thomson_limit_conserves_scattering_rate() {
        // γ = 1e3 on CMB photons: Γ ≈ 5e-6, deep Thomson regime.
        let gamma = 1e3;
        let eps = 6e-4;
        let e_max = 4.0 * gamma * gamma * eps / (1.0 + 4.0 * eps * gamma / ELECTRON_REST_ENERGY);
        let e1 = log_space(e_max * 1e-7, e_max, 6_000).unwrap();
        let k: Vec<f64> = e1.iter().map(|&e| klein_nishina(e, eps, gamma)).collect();
        assert_relative_eq!(
            integrate_log(&e1, &k),
            SIGMA_THOMSON * SPEED_OF_LIGHT,
            max_relative = 1e-3
        );
    }

    #[test]
    fn kernel_vanishes_outside_kinematic_range() {
        assert_eq!(klein_nishina(1e9, 1e-3, 10.0), 0.0);
        assert_eq!(klein_nishina(-1.0, 1e-3, 1e3), 0.0);
    }

    #[test]
    fn cmb_spectrum_is_positive_and_lazy() {
        let field = TargetPhotonField::cmb(1e-6, 1e-1).unwrap();
        let energies = log_space(0.3, 100.0, 18).unwrap();
        let model = inverse_compton(energies, log10_arange(-1.0, 8.001, 0.1), field);
        let params = [4e6, 1.5, 0.0];
        for bin in 4..8 {
            let sed = model.sed(&params, bin);
            assert!(sed.is_finite() && sed > 0.0);
        }
        assert_eq!(model.response().computed_rows(), 4);

        // A cutoff can only suppress the spectrum.
        assert!(model.sed(&[4e6, 1.5, 1e-3], 7) < model.sed(&params, 7));
    }
}
