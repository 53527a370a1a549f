//! Prediction and uncertainty.
//!
//! - point predictions over a (condition, time) grid (`predictor`)
//! - bootstrap replicates, interval summaries and subsampling (`bootstrap`)

pub mod bootstrap;
pub mod predictor;

pub use bootstrap::*;
pub use predictor::*;
