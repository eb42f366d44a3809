//! ISRF tables in CSV form.
//!
//! One file per height with at least the columns `Wavelength` (µm) and
//! `Total` (eV cm⁻³); other columns are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;
use crate::io::Layout;
use crate::physics::{IsrfTable, PhotonFieldLibrary};

#[derive(Debug, Deserialize)]
struct IsrfRow {
    #[serde(rename = "Wavelength")]
    wavelength: f64,
    #[serde(rename = "Total")]
    total: f64,
}

/// Parse one ISRF table from any reader.
pub fn parse_isrf_table<R: Read>(reader: R, height: f64) -> Result<IsrfTable, AppError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut wavelengths = Vec::new();
    let mut total = Vec::new();
    for (idx, row) in reader.deserialize::<IsrfRow>().enumerate() {
        let row = row.map_err(|e| AppError::new(2, format!("ISRF table line {}: {e}", idx + 2)))?;
        wavelengths.push(row.wavelength);
        total.push(row.total);
    }
    Ok(IsrfTable {
        height,
        wavelengths,
        total,
    })
}

pub fn read_isrf_table(path: &Path, height: f64) -> Result<IsrfTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open ISRF table '{}': {e}", path.display())))?;
    parse_isrf_table(file, height)
}

/// Combined ISRF + CMB fields for every distinct height in `heights`.
pub fn load_photon_fields(layout: &Layout, heights: &[f64]) -> Result<PhotonFieldLibrary, AppError> {
    let mut distinct: Vec<f64> = Vec::new();
    for &h in heights {
        if !distinct.contains(&h) {
            distinct.push(h);
        }
    }
    let tables = distinct
        .iter()
        .map(|&h| read_isrf_table(&layout.isrf_path(h), h))
        .collect::<Result<Vec<_>, _>>()?;
    log::info!("loaded {} ISRF tables", tables.len());
    Ok(PhotonFieldLibrary::from_tables(&tables)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{FIELD_LOG_STEP, TargetPhotonField};

    #[test]
    fn csv_columns_are_read_by_name() {
        let mut text = String::from("Wavelength,Stellar,Total\n");
        for i in 0..50 {
            let w = 0.1 * (FIELD_LOG_STEP * i as f64).exp();
            text.push_str(&format!("{w},0.0,{}\n", 0.1 + 0.01 * i as f64));
        }
        let table = parse_isrf_table(text.as_bytes(), 2.0).unwrap();
        assert_eq!(table.wavelengths.len(), 50);
        assert!((table.total[3] - 0.13).abs() < 1e-12);
        assert!(TargetPhotonField::from_isrf(&table).is_ok());
    }

    #[test]
    fn missing_column_is_an_input_error() {
        let err = parse_isrf_table("Wavelength,Stellar\n1.0,2.0\n".as_bytes(), 0.0).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
