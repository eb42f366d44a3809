//! Formatted terminal output.
//!
//! Formatting lives here so the fitting code stays free of presentation
//! concerns and output changes stay localized.

use crate::domain::{CutoffEnergy, FitResult, ModelKind};
use crate::report::{LocalIndex, ResultGrid};

/// Summary of one batch run: one table per model, rows ordered by latitude.
pub fn format_run_summary(title: &str, grids: &[ResultGrid], reference_energy: f64) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== sedfit - {title} ===\n"));

    for grid in grids {
        let n_bins = grid.n_lat() * grid.n_lon();
        out.push_str(&format!(
            "\n{} ({}/{} bins fitted)\n",
            grid.model.display_name(),
            grid.n_fitted(),
            n_bins
        ));
        out.push_str(&format_table(grid, reference_energy));

        let failures: Vec<_> = grid.failures().collect();
        if !failures.is_empty() {
            out.push_str("Skipped bins:\n");
            for (b, l, reason) in failures {
                out.push_str(&format!("  (b={b}, l={l}) {reason}\n"));
            }
        }
    }
    out
}

fn format_table(grid: &ResultGrid, reference_energy: f64) -> String {
    let names = grid.model.param_names();
    let third = match grid.model {
        ModelKind::LogParabola => "n(E_ref)",
        _ => "E_cut",
    };

    let mut out = String::new();
    out.push_str(
        format!(
            "{:>7} {:>7} {:>22} {:>22} {:>12} {:>10} {:>9} {:>14}\n",
            "lon", "lat", names[0], names[1], third, "TS", "chi2/dof", "warnings"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<7} {:-<7} {:-<22} {:-<22} {:-<12} {:-<10} {:-<9} {:-<14}\n",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for fit in grid.fitted() {
        let third = match grid.model {
            ModelKind::LogParabola => LocalIndex::from_fit(fit, reference_energy)
                .map(|n| format!("{:.3}", n.value))
                .unwrap_or_else(|| "-".to_string()),
            _ => fmt_cutoff(fit.cutoff_energy),
        };
        out.push_str(
            format!(
                "{:>7.1} {:>7.1} {:>22} {:>22} {:>12} {:>10.2} {:>9} {:>14}\n",
                fit.spatial.lon,
                fit.spatial.lat,
                fmt_param(fit, 0),
                fmt_param(fit, 1),
                third,
                fit.test_statistic,
                fit.reduced_chi_square
                    .map(|v| format!("{v:.2}"))
                    .unwrap_or_else(|| "n/a".to_string()),
                fit.warnings.len(),
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

fn fmt_param(fit: &FitResult, i: usize) -> String {
    match fit.params.get(i) {
        Some(p) => match p.error {
            Some(e) => format!("{:.3e} ± {:.1e}", p.value, e),
            None => format!("{:.3e}", p.value),
        },
        None => "-".to_string(),
    }
}

fn fmt_cutoff(cutoff: Option<CutoffEnergy>) -> String {
    match cutoff {
        None => "-".to_string(),
        Some(CutoffEnergy::Infinite) => "inf".to_string(),
        Some(CutoffEnergy::Finite { value, .. }) => format!("{value:.2e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParamEstimate, SpatialBin};
    use crate::report::Slot;

    #[test]
    fn summary_lists_fits_and_skipped_bins() {
        let mut grid = ResultGrid::new(ModelKind::PowerLaw, 1, 2);
        let fit = FitResult {
            model: ModelKind::PowerLaw,
            spatial: SpatialBin {
                lat_index: 0,
                lon_index: 0,
                lon: 5.0,
                lat: -2.0,
                lon_half_width: 5.0,
                lat_half_width: 2.0,
            },
            energies: vec![1.0],
            sed: vec![1e-6],
            params: vec![
                ParamEstimate {
                    name: "N_0".into(),
                    value: 1e-6,
                    error: Some(1e-8),
                },
                ParamEstimate {
                    name: "gamma".into(),
                    value: 0.3,
                    error: None,
                },
            ],
            test_statistic: 42.0,
            chi_square: 3.0,
            dof: 0,
            reduced_chi_square: None,
            cutoff_energy: Some(CutoffEnergy::Infinite),
            warnings: Vec::new(),
        };
        grid.set(0, 0, Slot::Fitted(Box::new(fit))).unwrap();
        grid.set(0, 1, Slot::Failed("stage 2 failed".into())).unwrap();

        let text = format_run_summary("demo", &[grid], 500.0);
        assert!(text.contains("PL (1/2 bins fitted)"));
        assert!(text.contains("inf"));
        assert!(text.contains("n/a"));
        assert!(text.contains("(b=0, l=1) stage 2 failed"));
    }
}
