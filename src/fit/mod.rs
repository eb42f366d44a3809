//! Spectral fitting.
//!
//! Responsibilities:
//!
//! - turn raw count profiles into an [`Observation`] (background, floored errors, SED)
//! - Poisson and chi-square objectives over a bin window
//! - the staged fit state machine ([`FitDriver`])
//! - fitting every spatial bin of a dataset in parallel

pub mod batch;
pub mod driver;
pub mod objective;
pub mod observation;

pub use batch::*;
pub use driver::*;
pub use objective::*;
pub use observation::*;
