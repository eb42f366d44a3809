//! Physics inputs of the emission models: constants and target photon fields.

pub mod constants;
pub mod photon_field;

pub use constants::*;
pub use photon_field::*;
