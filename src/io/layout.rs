//! On-disk layout of inputs and fit records.
//!
//! ```text
//! {root}/dct/Low_energy_range{r}/dct_{input}_counts_{class}.yaml
//! {root}/dct/Low_energy_range{r}/dct_expo_{class}.yaml
//! {root}/dct/Low_energy_range0/dct_data_counts_{class}.yaml   (total counts)
//! {isrf_dir}/Standard_0_0_{height}_Flux.csv
//! {out_dir}/Low_energy_range{r}/{input}_{class}_{Model}[_cutoff]_l={lon}_b={lat}.yaml
//! ```

use std::path::{Path, PathBuf};

use crate::domain::{DataClass, InputSource, LowEnergyRange, ModelKind, RunConfig};

/// Paths of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    root: PathBuf,
    isrf_dir: PathBuf,
    out_dir: PathBuf,
    data_class: DataClass,
    energy_range: LowEnergyRange,
    input: InputSource,
}

impl Layout {
    pub fn from_run(run: &RunConfig) -> Self {
        Self {
            root: run.root.clone(),
            isrf_dir: run.isrf_dir.clone(),
            out_dir: run.out_dir.clone(),
            data_class: run.data_class,
            energy_range: run.energy_range,
            input: run.input,
        }
    }

    fn range_dir(&self, base: &Path, range: LowEnergyRange) -> PathBuf {
        base.join(format!("Low_energy_range{}", range.index()))
    }

    pub fn counts_path(&self) -> PathBuf {
        self.range_dir(&self.root.join("dct"), self.energy_range).join(format!(
            "dct_{}_counts_{}.yaml",
            self.input.as_str(),
            self.data_class.as_str()
        ))
    }

    pub fn exposure_path(&self) -> PathBuf {
        self.range_dir(&self.root.join("dct"), self.energy_range)
            .join(format!("dct_expo_{}.yaml", self.data_class.as_str()))
    }

    /// Total observed counts always come from the baseline data selection.
    pub fn total_counts_path(&self) -> PathBuf {
        self.range_dir(&self.root.join("dct"), LowEnergyRange::Baseline)
            .join(format!("dct_data_counts_{}.yaml", self.data_class.as_str()))
    }

    pub fn isrf_path(&self, height: f64) -> PathBuf {
        self.isrf_dir.join(format!("Standard_0_0_{height}_Flux.csv"))
    }

    pub fn record_path(&self, kind: ModelKind, cutoff: bool, lon: f64, lat: f64) -> PathBuf {
        let suffix = if cutoff && kind.has_cutoff_param() { "_cutoff" } else { "" };
        self.range_dir(&self.out_dir, self.energy_range).join(format!(
            "{}_{}_{}{suffix}_l={}_b={}.yaml",
            self.input.as_str(),
            self.data_class.as_str(),
            kind.file_tag(),
            fmt_center(lon),
            fmt_center(lat),
        ))
    }
}

/// Bin centers keep one decimal when integral (`5.0`, `-2.5`).
fn fmt_center(v: f64) -> String {
    if v.fract() == 0.0 { format!("{v:.1}") } else { format!("{v}") }
}
