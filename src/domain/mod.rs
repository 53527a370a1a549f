//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - recording, event and epoch data (`types`)
//! - the run configuration threaded through every stage (`config`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
