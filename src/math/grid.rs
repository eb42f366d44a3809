//! Logarithmic grids and quadrature weights.
//!
//! All spectral integrals in this crate run over log-spaced energy or momentum
//! grids, so they are written as `∫ f(x) dx = ∫ x f(x) d ln x` and integrated with
//! the trapezoid rule in `ln x`.

use crate::error::FitError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, FitError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > min) {
        return Err(FitError::InvalidConfig(format!(
            "invalid log range: min={min}, max={max} (must be finite, >0, and max>min)"
        )));
    }
    if steps < 2 {
        return Err(FitError::InvalidConfig("log grid needs at least 2 points".into()));
    }

    let ln_min = min.ln();
    let step = (max.ln() - ln_min) / (steps as f64 - 1.0);
    Ok((0..steps).map(|i| (ln_min + step * i as f64).exp()).collect())
}

/// `10^x` for `x` in `start, start + step, ...` strictly below `stop`.
pub fn log10_arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || !(stop > start) {
        return Vec::new();
    }
    let n = ((stop - start) / step).ceil() as usize;
    (0..n).map(|i| 10f64.powf(start + step * i as f64)).collect()
}

/// Trapezoid weights `w_i` such that `Σ w_i g(x_i) ≈ ∫ g d ln x`.
pub fn log_trapezoid_weights(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut w = vec![0.0; n];
    for i in 1..n {
        let h = 0.5 * (x[i] / x[i - 1]).ln();
        w[i - 1] += h;
        w[i] += h;
    }
    w
}

/// `∫ y dx` over a log grid via `Σ w_i x_i y_i`.
pub fn integrate_log(x: &[f64], y: &[f64]) -> f64 {
    log_trapezoid_weights(x)
        .iter()
        .zip(x.iter().zip(y))
        .map(|(w, (xi, yi))| w * xi * yi)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.1, 10.0, 5).unwrap();
        assert!((v[0] - 0.1).abs() < 1e-12);
        assert!((v[v.len() - 1] - 10.0).abs() < 1e-12);
        assert!(log_space(1.0, 1.0, 5).is_err());
    }

    #[test]
    fn arange_excludes_stop() {
        let v = log10_arange(-1.0, 8.001, 0.1);
        assert_eq!(v.len(), 91);
        assert!((v[90] / 1e8 - 1.0).abs() < 1e-9);
        assert_eq!(log10_arange(-0.5, 6.0, 0.1).len(), 65);
    }

    #[test]
    fn log_trapezoid_integrates_power_law() {
        // ∫_1^100 x^-2 dx = 0.99
        let x = log_space(1.0, 100.0, 400).unwrap();
        let y: Vec<f64> = x.iter().map(|v| v.powi(-2)).collect();
        assert!((integrate_log(&x, &y) - 0.99).abs() < 1e-4);
    }
}
