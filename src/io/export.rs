//! Per-bin fit records.
//!
//! One record per (spatial bin, model), written as YAML, or as JSON when the
//! path ends in `.json`. Keys follow the plotting scripts that consume them:
//! `x`, `y`, `chi^2/d.o.f.`, `-logL`, one key per parameter with its `sgm_`
//! uncertainty, and `E_cut` / `sgm_E_cut` for cutoff fits. An infinite cutoff
//! is written as the string `"inf"` in both formats, since JSON has no infinity.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::{CutoffEnergy, FitResult, ModelKind};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    pub model: ModelKind,
    pub l: f64,
    pub b: f64,
    /// Energies of the fit window (GeV).
    pub x: Vec<f64>,
    /// Model SED on the fit window.
    pub y: Vec<f64>,
    #[serde(rename = "chi^2/d.o.f.", default, skip_serializing_if = "Option::is_none")]
    pub reduced_chi_square: Option<f64>,
    #[serde(rename = "-logL")]
    pub test_statistic: f64,
    /// Parameter values and their `sgm_` uncertainties.
    #[serde(flatten)]
    pub params: BTreeMap<String, f64>,
    #[serde(
        rename = "E_cut",
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_cutoff",
        deserialize_with = "deserialize_cutoff"
    )]
    pub cutoff_energy: Option<f64>,
    #[serde(rename = "sgm_E_cut", default, skip_serializing_if = "Option::is_none")]
    pub cutoff_error: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl FitRecord {
    pub fn from_result(fit: &FitResult) -> Self {
        let mut params = BTreeMap::new();
        for p in &fit.params {
            params.insert(p.name.clone(), p.value);
            if let Some(error) = p.error {
                params.insert(format!("sgm_{}", p.name), error);
            }
        }
        let (cutoff_energy, cutoff_error) = match fit.cutoff_energy {
            None => (None, None),
            Some(CutoffEnergy::Infinite) => (Some(f64::INFINITY), None),
            Some(CutoffEnergy::Finite { value, error }) => (Some(value), error),
        };
        Self {
            model: fit.model,
            l: fit.spatial.lon,
            b: fit.spatial.lat,
            x: fit.energies.clone(),
            y: fit.sed.clone(),
            reduced_chi_square: fit.reduced_chi_square,
            test_statistic: fit.test_statistic,
            params,
            cutoff_energy,
            cutoff_error,
            warnings: fit.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CutoffRepr {
    Value(f64),
    Label(String),
}

fn serialize_cutoff<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) if v.is_infinite() => serializer.serialize_some("inf"),
        Some(v) => serializer.serialize_some(v),
        None => serializer.serialize_none(),
    }
}

fn deserialize_cutoff<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<CutoffRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(CutoffRepr::Value(v)) => Ok(Some(v)),
        Some(CutoffRepr::Label(s)) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid E_cut '{s}'"))),
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Serialize `record` in the format implied by `path`.
pub fn render_record(record: &FitRecord, path: &Path) -> Result<String, AppError> {
    if is_json(path) {
        serde_json::to_string_pretty(record).map_err(|e| AppError::new(2, format!("Failed to encode fit record: {e}")))
    } else {
        serde_yml::to_string(record).map_err(|e| AppError::new(2, format!("Failed to encode fit record: {e}")))
    }
}

/// Write a fit record, creating parent directories as needed.
pub fn write_fit_record(path: &Path, fit: &FitResult) -> Result<(), AppError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", dir.display())))?;
    }
    let text = render_record(&FitRecord::from_result(fit), path)?;
    fs::write(path, text).map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))
}
