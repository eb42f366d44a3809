//! Shared "fit pipeline" logic used by the `fit` and `demo` commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! dictionaries -> dataset -> photon fields (IC only) -> per-bin fits -> records
//!
//! The command handlers can then focus on presentation.

use std::time::Duration;

use crate::cli::{DemoArgs, FitArgs, ModelArgs};
use crate::data::demo_dataset;
use crate::domain::{Dataset, FitConfig, ModelKind, RunConfig};
use crate::error::AppError;
use crate::fit::{FitMethod, fit_dataset};
use crate::io::{
    BinWidths, CountsDictionary, ExposureDictionary, Layout, TotalCountsDictionary, assemble_dataset, load_photon_fields,
    load_yaml, write_fit_record,
};
use crate::physics::{FIELD_MIN_ENERGY, PhotonFieldLibrary, TargetPhotonField};
use crate::report::ResultGrid;

/// All computed outputs of one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub dataset: Dataset,
    pub grids: Vec<ResultGrid>,
}

/// Fit configuration from the shared model options.
pub fn fit_config_from_args(args: &ModelArgs) -> FitConfig {
    let mut config = FitConfig {
        fit_min: args.fit_min,
        fit_max: args.fit_max,
        cutoff: !args.no_cutoff,
        uncertainty_floor: (args.uncertainty_floor > 0.0).then_some(args.uncertainty_floor),
        uncertainty_offset: args.uncertainty_offset,
        ..FitConfig::default()
    };
    config.minimizer.stage_timeout = (args.stage_timeout > 0).then(|| Duration::from_secs(args.stage_timeout));
    config
}

pub fn run_config_from_args(args: &FitArgs) -> RunConfig {
    let widths = BinWidths::default();
    RunConfig {
        root: args.root.clone(),
        isrf_dir: args.isrf_dir.clone(),
        out_dir: args.out.clone(),
        data_class: args.data_class,
        energy_range: args.energy_range,
        input: args.input_data,
        models: args.model.models.clone(),
        save_records: !args.no_save,
        lon_width: widths.lon,
        lat_widths: widths.lat,
    }
}

/// Load and combine the dictionaries of one run.
pub fn load_dataset(run: &RunConfig) -> Result<Dataset, AppError> {
    let layout = Layout::from_run(run);
    let counts: CountsDictionary = load_yaml(&layout.counts_path())?;
    let exposure: ExposureDictionary = load_yaml(&layout.exposure_path())?;
    let totals: TotalCountsDictionary = load_yaml(&layout.total_counts_path())?;
    let widths = BinWidths {
        lon: run.lon_width,
        lat: run.lat_widths.clone(),
    };
    let dataset = assemble_dataset(&counts, &exposure, &totals, run.energy_range, &widths)?;
    log::info!(
        "nB, nL, nE = {}, {}, {}",
        dataset.n_lat(),
        dataset.n_lon(),
        dataset.grid.len()
    );
    Ok(dataset)
}

/// Photon fields for the latitude rows of `dataset`, if any model needs them.
fn photon_fields(
    run: &RunConfig,
    config: &FitConfig,
    dataset: &Dataset,
) -> Result<Option<PhotonFieldLibrary>, AppError> {
    if !run.models.contains(&ModelKind::InverseCompton) {
        return Ok(None);
    }
    let n_rows = dataset.n_lat().min(config.isrf_heights.len());
    let layout = Layout::from_run(run);
    load_photon_fields(&layout, &config.isrf_heights[..n_rows]).map(Some)
}

/// Execute the full pipeline of `sedfit fit`.
pub fn run_fit(run: &RunConfig, config: &FitConfig, method: FitMethod) -> Result<RunOutput, AppError> {
    let dataset = load_dataset(run)?;
    let fields = photon_fields(run, config, &dataset)?;
    let grids = fit_dataset(&dataset, config, &run.models, fields.as_ref(), method)?;

    if run.save_records {
        let layout = Layout::from_run(run);
        let written = save_records(&grids, config.cutoff, |kind, cutoff, lon, lat| {
            layout.record_path(kind, cutoff, lon, lat)
        })?;
        log::info!("wrote {written} fit records under {}", run.out_dir.display());
    }
    Ok(RunOutput { dataset, grids })
}

/// Execute `sedfit demo`: a seeded synthetic dataset with a CMB-only photon field.
pub fn run_demo(args: &DemoArgs, config: &FitConfig) -> Result<RunOutput, AppError> {
    let dataset = demo_dataset(args.n_lat, args.n_lon, args.seed)?;
    let fields = if args.model.models.contains(&ModelKind::InverseCompton) {
        let cmb = TargetPhotonField::cmb(FIELD_MIN_ENERGY, 1e-1)?;
        let mut library = PhotonFieldLibrary::default();
        for &h in config.isrf_heights.iter().take(dataset.n_lat()) {
            library.insert(h, cmb.clone());
        }
        Some(library)
    } else {
        None
    };
    let grids = fit_dataset(&dataset, config, &args.model.models, fields.as_ref(), args.model.method)?;

    if let Some(out) = &args.out {
        let written = save_records(&grids, config.cutoff, |kind, cutoff, lon, lat| {
            let suffix = if cutoff && kind.has_cutoff_param() { "_cutoff" } else { "" };
            out.join(format!("demo_{}{suffix}_l={lon}_b={lat}.yaml", kind.file_tag()))
        })?;
        log::info!("wrote {written} fit records under {}", out.display());
    }
    Ok(RunOutput { dataset, grids })
}

/// Write one record per fitted bin; returns how many were written.
pub fn save_records(
    grids: &[ResultGrid],
    cutoff: bool,
    path_for: impl Fn(ModelKind, bool, f64, f64) -> std::path::PathBuf,
) -> Result<usize, AppError> {
    let mut written = 0;
    for grid in grids {
        for fit in grid.fitted() {
            let path = path_for(grid.model, cutoff, fit.spatial.lon, fit.spatial.lat);
            write_fit_record(&path, fit)?;
            written += 1;
        }
    }
    Ok(written)
}
