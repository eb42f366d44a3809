//! Numerical building blocks: log grids, bounded minimization, and covariance
//! estimation.

pub mod covariance;
pub mod grid;
pub mod minimize;

pub use covariance::*;
pub use grid::*;
pub use minimize::*;
