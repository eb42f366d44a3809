//! Gamma-ray emission models.
//!
//! The analytic shapes are small pure functions; the inverse-Compton and
//! pion-decay models fold a particle spectrum with a lazily computed response.

pub mod inverse_compton;
pub mod model;
pub mod pion_decay;
pub mod response;

pub use inverse_compton::*;
pub use model::*;
pub use pion_decay::*;
pub use response::*;
