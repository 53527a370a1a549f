//! Input/output helpers.
//!
//! - BrainVision recording read/write (`brainvision`)
//! - CSV exports of observations and intervals (`export`)
//! - JSON run summary (`summary`)

pub mod brainvision;
pub mod export;
pub mod summary;

pub use brainvision::*;
pub use export::*;
pub use summary::*;
