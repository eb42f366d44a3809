//! Gamma rays from π⁰ decay in proton–proton collisions.
//!
//! Protons follow `dN/dp = N0 p^-Γ exp(-p invEcut)` on a log grid in momentum
//! (GeV). The photon yield per collision uses the parametrisation of Kelner,
//! Aharonian & Bugayov (2006), eqs. 58–61, with the inelastic cross-section
//! of eq. 79 including the threshold factor.

use crate::domain::ModelKind;
use crate::math::log_trapezoid_weights;
use crate::models::{ResponseKernel, ResponseSpectrum};
use crate::physics::{PION_THRESHOLD_GEV, PROTON_REST_ENERGY_GEV};

/// Inelastic pp cross-section (mb) at proton energy `e_p` (GeV).
pub fn inelastic_cross_section(e_p: f64) -> f64 {
    if e_p <= PION_THRESHOLD_GEV {
        return 0.0;
    }
    let l = (e_p / 1e3).ln();
    let threshold = 1.0 - (PION_THRESHOLD_GEV / e_p).powi(4);
    (34.3 + 1.88 * l + 0.25 * l * l) * threshold * threshold
}

/// Photon spectrum `F_γ(x, E_p)` with `x = E_γ / E_p`.
pub fn kelner_aharonian_f(x: f64, e_p: f64) -> f64 {
    if !(x > 0.0 && x < 1.0) {
        return 0.0;
    }
    let l = (e_p / 1e3).ln();
    let b = 1.30 + 0.14 * l + 0.011 * l * l;
    let beta = 1.0 / (1.79 + 0.11 * l + 0.008 * l * l);
    let k = 1.0 / (0.801 + 0.049 * l + 0.014 * l * l);

    let ln_x = x.ln();
    let xb = x.powf(beta);
    let one_minus = 1.0 - xb;
    let denom = 1.0 + k * xb * one_minus;

    let shape = (one_minus / denom).powi(4);
    let bracket = 1.0 / ln_x - 4.0 * beta * xb / one_minus - 4.0 * k * beta * xb * (1.0 - 2.0 * xb) / denom;
    let f = b * ln_x / x * shape * bracket;
    if f.is_finite() { f.max(0.0) } else { 0.0 }
}

/// Pion-decay response on a fixed proton momentum grid.
#[derive(Debug, Clone)]
pub struct PionKernel {
    momenta: Vec<f64>,
    weights: Vec<f64>,
}

impl PionKernel {
    /// `momenta`: proton momenta (GeV), ascending and log-spaced.
    pub fn new(momenta: Vec<f64>) -> Self {
        let weights = log_trapezoid_weights(&momenta);
        Self { momenta, weights }
    }
}

impl ResponseKernel for PionKernel {
    fn particle_grid(&self) -> &[f64] {
        &self.momenta
    }

    fn row(&self, e_gamma: f64) -> Vec<f64> {
        self.momenta
            .iter()
            .zip(&self.weights)
            .map(|(&p, &w)| {
                let e_p = p.hypot(PROTON_REST_ENERGY_GEV);
                // ∫ dp (dN/dp) σ F / E_p, per ln p; SED = E_γ² dQ/dE_γ.
                let yield_per_ln_p = p / e_p * inelastic_cross_section(e_p) * kelner_aharonian_f(e_gamma / e_p, e_p);
                e_gamma * e_gamma * w * yield_per_ln_p
            })
            .collect()
    }
}

/// Pion-decay SED model on the photon energy grid `energies` (GeV).
pub type PionDecaySpectrum = ResponseSpectrum<PionKernel>;

pub fn pion_decay(energies: Vec<f64>, momenta: Vec<f64>) -> PionDecaySpectrum {
    ResponseSpectrum::new(ModelKind::PionDecay, PionKernel::new(momenta), energies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{log_space, log10_arange};
    use crate::models::Spectrum;

    #[test]
    fn cross_section_vanishes_below_threshold() {
        assert_eq!(inelastic_cross_section(1.0), 0.0);
        let at_tev = inelastic_cross_section(1e3);
        assert!((at_tev - 34.3).abs() < 1e-3);
    }

    #[test]
    fn photon_spectrum_is_non_negative_and_bounded() {
        for &e_p in &[10.0, 100.0, 1e3, 1e5] {
            for &x in &[1e-3, 1e-2, 0.1, 0.5, 0.9, 0.999] {
                let f = kelner_aharonian_f(x, e_p);
                assert!(f.is_finite() && f >= 0.0, "F({x}, {e_p}) = {f}");
            }
            assert_eq!(kelner_aharonian_f(1.0, e_p), 0.0);
            assert_eq!(kelner_aharonian_f(1.5, e_p), 0.0);
        }
        // Falls with x at fixed proton energy.
        assert!(kelner_aharonian_f(0.01, 1e3) > kelner_aharonian_f(0.3, 1e3));
    }

    #[test]
    fn sed_is_positive_and_softens_with_index() {
        let energies = log_space(0.3, 100.0, 18).unwrap();
        let model = pion_decay(energies, log10_arange(-0.5, 6.0, 0.1));
        let hard = [4e6, 2.0, 0.0];
        let soft = [4e6, 3.0, 0.0];
        for bin in 4..18 {
            assert!(model.sed(&hard, bin) > 0.0);
        }
        let ratio_hard = model.sed(&hard, 17) / model.sed(&hard, 4);
        let ratio_soft = model.sed(&soft, 17) / model.sed(&soft, 4);
        assert!(ratio_soft < ratio_hard);
    }
}
