//! Run configuration.
//!
//! One `AnalysisConfig` value is built from CLI flags (plus defaults) and passed
//! by reference to every stage. Nothing in the pipeline reads global state; the
//! two random streams (bootstrap draws, replicate subsample) take their seeds
//! from here.

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{ConditionMap, EventSource};
use crate::error::AppError;
use crate::models::ModelSpec;

/// Objective minimized over the covariance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Restricted maximum likelihood.
    Reml,
    /// Maximum likelihood.
    Ml,
}

/// What to do when the random-effect covariance is singular.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SingularPolicy {
    /// Fail with a convergence error.
    Error,
    /// Accept the fit, flag it in the diagnostics and log a warning.
    Warn,
}

/// Prediction behavior for time offsets absent from the fitted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NewLevelPolicy {
    /// Fail with an unknown-time-offset error.
    Error,
    /// Use the population-level prediction (random effects at zero).
    Population,
}

/// How bootstrap replicates are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapMethod {
    /// Draw fixed effects and conditional random effects from their sampling
    /// distributions ("full" uncertainty).
    Simulation,
    /// Simulate new responses from the fitted model and refit each replicate.
    Parametric,
}

/// Event extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub source: EventSource,
    pub conditions: ConditionMap,
}

/// Baseline window in seconds; `None` edges mean the epoch window edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineWindow {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl Default for BaselineWindow {
    fn default() -> Self {
        Self {
            start: None,
            end: Some(0.0),
        }
    }
}

/// Epoch segmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochConfig {
    pub tmin: f64,
    pub tmax: f64,
    pub baseline: Option<BaselineWindow>,
    /// Peak-to-peak rejection threshold (µV).
    pub reject: Option<f64>,
    /// Peak-to-peak flatness threshold (µV).
    pub flat: Option<f64>,
    /// Channels to keep; empty keeps all non-trigger channels.
    pub picks: Vec<String>,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            tmin: -0.2,
            tmax: 0.5,
            baseline: Some(BaselineWindow::default()),
            reject: None,
            flat: None,
            picks: Vec::new(),
        }
    }
}

/// Fitter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    pub criterion: Criterion,
    pub singular: SingularPolicy,
    /// Diagonal elements of the relative covariance factor below this are
    /// treated as zero.
    pub singular_tol: f64,
    /// Objective evaluation budget for the optimizer.
    pub max_evals: usize,
    /// Absolute tolerance on the spread of objective values in the simplex.
    pub ftol: f64,
    /// Tolerance on the simplex diameter.
    pub xtol: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            criterion: Criterion::Reml,
            singular: SingularPolicy::Error,
            singular_tol: 1e-4,
            max_evals: 2_000,
            ftol: 1e-10,
            xtol: 1e-7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictConfig {
    pub new_levels: NewLevelPolicy,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            new_levels: NewLevelPolicy::Error,
        }
    }
}

/// Bootstrap settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub n_sims: usize,
    pub seed: u64,
    pub method: BootstrapMethod,
    /// Add residual noise to each simulated prediction.
    pub include_residual: bool,
    /// Largest `n_sims` accepted.
    pub budget: usize,
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    /// Number of replicate curves kept for the spaghetti view.
    pub subsample: usize,
    pub subsample_seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_sims: 1000,
            seed: 42,
            method: BootstrapMethod::Simulation,
            include_residual: false,
            budget: 10_000,
            lower_quantile: 0.025,
            upper_quantile: 0.975,
            subsample: 100,
            subsample_seed: 43,
        }
    }
}

/// Where and how results are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for SVG figures; `None` skips them.
    pub plot_dir: Option<PathBuf>,
    pub plot_width: u32,
    pub plot_height: u32,
    /// Channel drawn in the raw-trace view; defaults to the first picked channel.
    pub plot_channel: Option<String>,
    pub ascii: bool,
    pub ascii_width: usize,
    pub ascii_height: usize,
    pub export_table: Option<PathBuf>,
    pub export_predictions: Option<PathBuf>,
    pub export_summary: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            plot_dir: None,
            plot_width: 1000,
            plot_height: 600,
            plot_channel: None,
            ascii: true,
            ascii_width: 100,
            ascii_height: 25,
            export_table: None,
            export_predictions: None,
            export_summary: None,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Path to the `.vhdr` header.
    pub recording: PathBuf,
    pub events: EventConfig,
    pub epochs: EpochConfig,
    pub model: ModelSpec,
    pub fit: FitOptions,
    pub predict: PredictConfig,
    pub bootstrap: BootstrapConfig,
    pub output: OutputConfig,
}

impl AnalysisConfig {
    /// Defaults for everything except the input and the event mapping.
    pub fn new(recording: impl Into<PathBuf>, events: EventConfig) -> Self {
        Self {
            recording: recording.into(),
            events,
            epochs: EpochConfig::default(),
            model: ModelSpec::default(),
            fit: FitOptions::default(),
            predict: PredictConfig::default(),
            bootstrap: BootstrapConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Cheap consistency checks that do not need the data.
    pub fn validate(&self) -> Result<(), AppError> {
        let e = &self.epochs;
        if !(e.tmin.is_finite() && e.tmax.is_finite()) || e.tmax <= e.tmin {
            return Err(AppError::config(format!(
                "Invalid epoch window: tmin={} tmax={}",
                e.tmin, e.tmax
            )));
        }
        for (name, value) in [("reject", e.reject), ("flat", e.flat)] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(AppError::config(format!("Invalid {name} threshold: {v}")));
                }
            }
        }
        let b = &self.bootstrap;
        if !(0.0..1.0).contains(&b.lower_quantile)
            || !(0.0..=1.0).contains(&b.upper_quantile)
            || b.lower_quantile >= b.upper_quantile
        {
            return Err(AppError::config(format!(
                "Invalid interval quantiles: [{}, {}]",
                b.lower_quantile, b.upper_quantile
            )));
        }
        if !(self.fit.singular_tol.is_finite() && self.fit.singular_tol >= 0.0) {
            return Err(AppError::config("Invalid singular tolerance."));
        }
        if self.fit.max_evals == 0 {
            return Err(AppError::config("Optimizer evaluation budget must be > 0."));
        }
        Ok(())
    }
}
