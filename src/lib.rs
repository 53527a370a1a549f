//! `erp-lmm` library crate.
//!
//! The binary (`erp`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the pipeline stages are reusable on their own (loader, fitter, bootstrap)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod plot;
pub mod predict;
pub mod report;
pub mod tui;
