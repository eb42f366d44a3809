//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - run selectors (`ModelKind`, `DataClass`, `LowEnergyRange`, `InputSource`)
//! - input data (`EnergyGrid`, `SpatialBin`, `BinProfiles`, `Dataset`)
//! - fit configuration (`FitConfig`, `FamilyConfig`, `MinimizerConfig`)
//! - fit outputs (`FitResult`, `ParamEstimate`, `CutoffEnergy`, `FitWarning`)

pub mod types;

pub use types::*;
