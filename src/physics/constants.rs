//! Physical constants (CGS units, energies in eV unless noted).

/// Electron rest energy `m_e c²` (eV).
pub const ELECTRON_REST_ENERGY: f64 = 510_998.95;

/// Proton rest energy `m_p c²` (GeV).
pub const PROTON_REST_ENERGY_GEV: f64 = 0.938_272;

/// Thomson cross-section (cm²).
pub const SIGMA_THOMSON: f64 = 6.652_458_7e-25;

/// Speed of light (cm/s).
pub const SPEED_OF_LIGHT: f64 = 2.997_924_58e10;

/// `ħ c` (eV cm).
pub const HBAR_C: f64 = 1.973_27e-5;

/// `h c` (eV µm), for wavelength → energy conversion.
pub const H_C_EV_MICRON: f64 = 1.239_841_98;

/// Boltzmann constant (eV/K).
pub const BOLTZMANN: f64 = 8.617_330_3e-5;

/// CMB temperature (K).
pub const CMB_TEMPERATURE: f64 = 2.73;

/// Kinematic threshold of π⁰ production in pp collisions (GeV).
pub const PION_THRESHOLD_GEV: f64 = 1.22;

pub const GEV_TO_EV: f64 = 1e9;
