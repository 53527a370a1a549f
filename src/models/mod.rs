//! Mixed-model specification.
//!
//! Terms are enumerated values rather than a parsed formula string, so the
//! fitter and predictor can build design rows without name lookups.

pub mod model;

pub use model::*;
