//! Parameter uncertainties from the curvature of the objective at its minimum.
//!
//! We estimate the Hessian with central finite differences in the minimizer's
//! scaled coordinates (`u = x / step`) and invert it with `nalgebra`:
//!
//! ```text
//! cov = 2 · errordef · H⁻¹
//! ```
//!
//! Parameters sitting on one of their bounds are excluded from the Hessian and
//! reported as pinned.

use nalgebra::DMatrix;

use crate::math::{ObjectiveFunction, ParamSpace};

/// Finite-difference step in scaled units.
const STEP: f64 = 1e-2;
/// Parameters closer than this (scaled) to a bound count as pinned.
const PINNED: f64 = 1e-8;

/// 1σ uncertainties of a converged fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Uncertainties {
    /// One entry per parameter; `None` for frozen, pinned, or unresolved parameters.
    pub errors: Vec<Option<f64>>,
    /// Free parameters found on a bound.
    pub pinned: Vec<usize>,
}

/// Estimate uncertainties at `params` (a minimum of `objective` inside `space`).
pub fn hessian_uncertainties(
    objective: &dyn ObjectiveFunction,
    space: &ParamSpace,
    params: &[f64],
) -> Uncertainties {
    let mut errors = vec![None; params.len()];
    let mut pinned = Vec::new();
    let mut active = Vec::new();
    let mut steps = Vec::new();

    for i in space.free_indices() {
        let (lo, hi) = space.bounds[i];
        let scale = space.steps[i];
        let room = ((params[i] - lo) / scale).min((hi - params[i]) / scale);
        if room < PINNED {
            pinned.push(i);
            continue;
        }
        active.push(i);
        steps.push(STEP.min(0.5 * room));
    }

    if active.is_empty() {
        return Uncertainties { errors, pinned };
    }

    let Some(hessian) = finite_difference_hessian(objective, space, params, &active, &steps) else {
        log::warn!("objective failed while estimating the Hessian; no uncertainties");
        return Uncertainties { errors, pinned };
    };
    let Some(inverse) = invert_hessian(&hessian) else {
        log::warn!("Hessian is not invertible; no uncertainties");
        return Uncertainties { errors, pinned };
    };

    let factor = 2.0 * objective.errordef();
    for (k, &i) in active.iter().enumerate() {
        let var = factor * inverse[(k, k)];
        if var.is_finite() && var > 0.0 {
            errors[i] = Some(var.sqrt() * space.steps[i]);
        }
    }
    Uncertainties { errors, pinned }
}

/// Symmetric central-difference Hessian over the `active` parameters.
fn finite_difference_hessian(
    objective: &dyn ObjectiveFunction,
    space: &ParamSpace,
    params: &[f64],
    active: &[usize],
    steps: &[f64],
) -> Option<DMatrix<f64>> {
    let n = active.len();
    let eval = |shifts: &[(usize, f64)]| -> Option<f64> {
        let mut x = params.to_vec();
        for &(k, du) in shifts {
            let i = active[k];
            x[i] += du * space.steps[i];
        }
        objective.eval(&x).ok().filter(|v| v.is_finite())
    };

    let f0 = eval(&[])?;
    let mut h = DMatrix::<f64>::zeros(n, n);
    for a in 0..n {
        let ha = steps[a];
        let fp = eval(&[(a, ha)])?;
        let fm = eval(&[(a, -ha)])?;
        h[(a, a)] = (fp - 2.0 * f0 + fm) / (ha * ha);

        for b in 0..a {
            let hb = steps[b];
            let fpp = eval(&[(a, ha), (b, hb)])?;
            let fpm = eval(&[(a, ha), (b, -hb)])?;
            let fmp = eval(&[(a, -ha), (b, hb)])?;
            let fmm = eval(&[(a, -ha), (b, -hb)])?;
            let v = (fpp - fpm - fmp + fmm) / (4.0 * ha * hb);
            h[(a, b)] = v;
            h[(b, a)] = v;
        }
    }
    Some(h)
}

/// Invert a Hessian via damped Cholesky, falling back to LU.
///
/// Returns `None` when the inverse has non-positive or non-finite variances.
pub fn invert_hessian(hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let n = hessian.nrows();
    let identity = DMatrix::identity(n, n);
    let diag_scale = (0..n)
        .map(|i| hessian[(i, i)].abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);

    let mut damped = hessian.clone();
    let mut damping = 0.0_f64;
    for _ in 0..8 {
        if let Some(chol) = damped.clone().cholesky() {
            return Some(chol.solve(&identity));
        }
        let next = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        for i in 0..n {
            damped[(i, i)] += next - damping;
        }
        damping = next;
    }

    let cov = damped.lu().try_inverse()?;
    (0..n)
        .all(|i| cov[(i, i)].is_finite() && cov[(i, i)] > 0.0)
        .then_some(cov)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;
    use approx::assert_relative_eq;

    /// Gaussian NLL with σ = (0.2, 3e-7) and correlation 0.5.
    struct Gaussian2;

    impl ObjectiveFunction for Gaussian2 {
        fn eval(&self, p: &[f64]) -> Result<f64, FitError> {
            let (s0, s1, rho) = (0.2, 3e-7, 0.5);
            let z0 = (p[0] - 1.0) / s0;
            let z1 = (p[1] - 2e-6) / s1;
            Ok(0.5 * (z0 * z0 - 2.0 * rho * z0 * z1 + z1 * z1) / (1.0 - rho * rho))
        }
    }

    #[test]
    fn recovers_gaussian_widths() {
        let space = ParamSpace::new(
            vec![1.0, 2e-6],
            vec![0.1, 1e-7],
            vec![(f64::NEG_INFINITY, f64::INFINITY), (0.0, 1.0)],
        )
        .unwrap();
        let unc = hessian_uncertainties(&Gaussian2, &space, &[1.0, 2e-6]);
        assert_relative_eq!(unc.errors[0].unwrap(), 0.2, max_relative = 1e-4);
        assert_relative_eq!(unc.errors[1].unwrap(), 3e-7, max_relative = 1e-4);
        assert!(unc.pinned.is_empty());
    }

    #[test]
    fn parameter_on_bound_is_pinned() {
        let space = ParamSpace::new(
            vec![1.0, 0.0],
            vec![0.1, 1e-7],
            vec![(f64::NEG_INFINITY, f64::INFINITY), (0.0, 1.0)],
        )
        .unwrap();
        let unc = hessian_uncertainties(&Gaussian2, &space, &[1.0, 0.0]);
        assert_eq!(unc.pinned, vec![1]);
        assert!(unc.errors[1].is_none());
        // Conditional width of p0 with p1 fixed: σ0 · sqrt(1 - ρ²).
        assert_relative_eq!(unc.errors[0].unwrap(), 0.2 * 0.75f64.sqrt(), max_relative = 1e-4);
    }

    #[test]
    fn singular_hessian_is_rejected() {
        let h = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let inv = invert_hessian(&h);
        // Damping makes it invertible but the variances are enormous.
        if let Some(cov) = inv {
            assert!(cov[(0, 0)] > 1e6);
        }
    }
}
