//! Mixed-model fitting.
//!
//! Responsibilities:
//!
//! - turn the observation table into per-time-level cross products (`data`)
//! - profile the REML / ML criterion over the covariance factor (`fitter`)
//! - expose the result and the fitter contract (`fitted`)
//! - per-time OLS estimates for the no-pooling comparison (`unpooled`)

pub mod data;
pub mod fitted;
pub mod fitter;
pub mod unpooled;

pub use data::*;
pub use fitted::*;
pub use fitter::*;
pub use unpooled::*;
