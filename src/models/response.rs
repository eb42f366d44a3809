//! Integral-transform models: particle spectrum × production kernel.
//!
//! Inverse-Compton and pion-decay SEDs are linear in the particle spectrum:
//!
//! ```text
//! SED(E_γ) = Σ_j R_j(E_γ) s_j(params)
//! ```
//!
//! where `s_j` is the particle spectrum on a fixed log grid and `R(E_γ)` is a
//! response row that already contains the kernel integral and the quadrature
//! weights. Rows are expensive and parameter independent, so they are computed
//! on first use and memoised per photon energy bin.

use std::sync::OnceLock;

use crate::domain::ModelKind;
use crate::models::{Spectrum, third};

/// Production kernel of an integral-transform model.
pub trait ResponseKernel: Sync {
    /// Particle grid (GeV) on which the particle spectrum is evaluated.
    fn particle_grid(&self) -> &[f64];

    /// Response row at photon energy `e_gamma` (GeV), one entry per grid point.
    fn row(&self, e_gamma: f64) -> Vec<f64>;

    /// Particle spectrum for `[N0, Γ, invEcut]` on [`Self::particle_grid`].
    fn particle_spectrum(&self, params: &[f64]) -> Vec<f64> {
        let (n0, gamma, inv) = (params[0], params[1], third(params));
        self.particle_grid()
            .iter()
            .map(|&x| n0 * x.powf(-gamma) * (-x * inv).exp())
            .collect()
    }
}

/// Response rows computed on demand, one slot per photon energy bin.
pub struct LazyResponse<K> {
    kernel: K,
    energies: Vec<f64>,
    rows: Vec<OnceLock<Vec<f64>>>,
}

impl<K: ResponseKernel> LazyResponse<K> {
    pub fn new(kernel: K, energies: Vec<f64>) -> Self {
        let rows = energies.iter().map(|_| OnceLock::new()).collect();
        Self { kernel, energies, rows }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// Row of bin `bin`, computed on first access.
    pub fn row(&self, bin: usize) -> &[f64] {
        self.rows[bin].get_or_init(|| self.kernel.row(self.energies[bin]))
    }

    /// `Σ_j R_j s_j` for bin `bin`.
    pub fn fold(&self, bin: usize, spectrum: &[f64]) -> f64 {
        self.row(bin).iter().zip(spectrum).map(|(r, s)| r * s).sum()
    }

    /// Number of rows computed so far.
    pub fn computed_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.get().is_some()).count()
    }
}

/// A [`Spectrum`] backed by a [`LazyResponse`].
pub struct ResponseSpectrum<K> {
    kind: ModelKind,
    response: LazyResponse<K>,
}

impl<K: ResponseKernel> ResponseSpectrum<K> {
    pub fn new(kind: ModelKind, kernel: K, energies: Vec<f64>) -> Self {
        Self {
            kind,
            response: LazyResponse::new(kernel, energies),
        }
    }

    pub fn response(&self) -> &LazyResponse<K> {
        &self.response
    }
}

impl<K: ResponseKernel> Spectrum for ResponseSpectrum<K> {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn energies(&self) -> &[f64] {
        self.response.energies()
    }

    fn sed(&self, params: &[f64], bin: usize) -> f64 {
        let spectrum = self.response.kernel().particle_spectrum(params);
        self.response.fold(bin, &spectrum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingKernel {
        grid: Vec<f64>,
        calls: AtomicUsize,
    }

    impl ResponseKernel for CountingKernel {
        fn particle_grid(&self) -> &[f64] {
            &self.grid
        }

        fn row(&self, e_gamma: f64) -> Vec<f64> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.grid.iter().map(|_| e_gamma).collect()
        }
    }

    #[test]
    fn rows_are_computed_once_and_only_when_requested() {
        let kernel = CountingKernel {
            grid: vec![1.0, 2.0],
            calls: AtomicUsize::new(0),
        };
        let model = ResponseSpectrum::new(ModelKind::PionDecay, kernel, vec![1.0, 2.0, 3.0, 4.0]);
        let params = [1.0, 0.0, 0.0];

        assert_eq!(model.sed(&params, 2), 6.0);
        assert_eq!(model.sed(&[2.0, 0.0], 2), 12.0);
        assert_eq!(model.response().computed_rows(), 1);
        assert_eq!(model.response().kernel().calls.load(Ordering::Relaxed), 1);
    }
}
