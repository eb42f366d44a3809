//! `sed-fit` library crate.
//!
//! The binary (`sedfit`) is a thin wrapper around this library so that:
//!
//! - the fitting core is testable without spawning processes
//! - models, objectives and the staged driver are reusable on their own
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod physics;
pub mod report;
