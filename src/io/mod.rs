//! Input/output helpers.
//!
//! - path conventions of the inputs and records (`layout`)
//! - YAML profile dictionaries (`dictionary`)
//! - ISRF CSV tables (`isrf`)
//! - per-bin fit records, YAML or JSON (`export`)

pub mod dictionary;
pub mod export;
pub mod isrf;
pub mod layout;

pub use dictionary::*;
pub use export::*;
pub use isrf::*;
pub use layout::*;
