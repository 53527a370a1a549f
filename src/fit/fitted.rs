//! The fitted mixed model and the fitter contract.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::warn;

use crate::domain::{Criterion, SingularPolicy, TimeKey};
use crate::error::AppError;
use crate::fit::ModelData;
use crate::models::ModelSpec;

/// A fixed-effect estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixedEffect {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
}

/// Random-effect prediction for one time level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelEffect {
    pub key: TimeKey,
    pub time: f64,
    pub n_obs: usize,
    /// Conditional mode (BLUP) of the level's random effects.
    pub blup: DVector<f64>,
    /// Conditional covariance of the BLUP given the data.
    pub cond_cov: DMatrix<f64>,
}

/// How the optimizer got to the estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitDiagnostics {
    pub criterion: Criterion,
    /// Final value of the profiled criterion (deviance or REML criterion).
    pub objective: f64,
    pub evals: usize,
    pub converged: bool,
    pub theta: Vec<f64>,
    /// A diagonal element of the covariance factor is below tolerance.
    pub singular: bool,
    pub n_obs: usize,
    pub n_groups: usize,
}

#[derive(Debug, Clone)]
pub struct FittedModel {
    pub spec: ModelSpec,
    pub conditions: Vec<String>,
    pub sfreq: f64,
    pub fixed: Vec<FixedEffect>,
    pub beta: DVector<f64>,
    pub beta_cov: DMatrix<f64>,
    pub random_names: Vec<String>,
    /// Random-effect covariance `Σ`.
    pub random_cov: DMatrix<f64>,
    /// Residual standard deviation.
    pub sigma: f64,
    /// Time levels in ascending key order.
    pub levels: Vec<LevelEffect>,
    pub diagnostics: FitDiagnostics,
}

impl FittedModel {
    pub fn residual_variance(&self) -> f64 {
        self.sigma * self.sigma
    }

    /// Standard deviations of the random effects.
    pub fn random_sd(&self) -> Vec<f64> {
        (0..self.random_cov.nrows())
            .map(|i| self.random_cov[(i, i)].max(0.0).sqrt())
            .collect()
    }

    /// Correlation between random effects `i` and `j`; `NaN` when either
    /// variance is zero.
    pub fn random_corr(&self, i: usize, j: usize) -> f64 {
        let sd = self.random_sd();
        if sd[i] == 0.0 || sd[j] == 0.0 {
            return f64::NAN;
        }
        self.random_cov[(i, j)] / (sd[i] * sd[j])
    }

    /// `-objective / 2`: the log-likelihood (ML) or restricted log-likelihood (REML).
    pub fn log_likelihood(&self) -> f64 {
        -0.5 * self.diagnostics.objective
    }

    /// Level fitted at `time`, matched to the nearest sample.
    pub fn level_for_time(&self, time: f64) -> Option<usize> {
        let key = TimeKey((time * self.sfreq).round() as i64);
        self.levels.binary_search_by_key(&key, |l| l.key).ok()
    }

    pub fn fixed_row(&self, condition: usize) -> DVector<f64> {
        let n = self.conditions.len();
        let mut row = vec![0.0; self.beta.len()];
        self.spec.fill_fixed_row(condition, n, &mut row);
        DVector::from_vec(row)
    }

    pub fn random_row(&self, condition: usize) -> DVector<f64> {
        let n = self.conditions.len();
        let mut row = vec![0.0; self.random_cov.nrows()];
        self.spec.fill_random_row(condition, n, &mut row);
        DVector::from_vec(row)
    }

    /// `x'β + z'b` for `condition` at level `level` (population level when `None`).
    pub fn conditional_mean(&self, condition: usize, level: Option<usize>) -> f64 {
        let fixed = self.fixed_row(condition).dot(&self.beta);
        match level {
            Some(l) => fixed + self.random_row(condition).dot(&self.levels[l].blup),
            None => fixed,
        }
    }

    /// Difference between `condition` and the reference condition at a level,
    /// i.e. the partially pooled condition effect at that time point.
    pub fn level_contrast(&self, condition: usize, level: usize) -> f64 {
        self.conditional_mean(condition, Some(level)) - self.conditional_mean(0, Some(level))
    }
}

/// Contract for anything that can fit the mixed model.
pub trait MixedModelFitter {
    /// Fit, optionally starting the optimizer at `theta0`.
    ///
    /// Singular solutions are returned flagged; callers decide what to do with
    /// them (see `fit`).
    fn estimate(&self, data: &ModelData, theta0: Option<&[f64]>) -> Result<FittedModel, AppError>;

    fn singular_policy(&self) -> SingularPolicy;

    /// Fit and apply the configured singular-fit policy.
    fn fit(&self, data: &ModelData) -> Result<FittedModel, AppError> {
        let model = self.estimate(data, None)?;
        apply_singular_policy(model, self.singular_policy())
    }
}

pub fn apply_singular_policy(model: FittedModel, policy: SingularPolicy) -> Result<FittedModel, AppError> {
    if !model.diagnostics.singular {
        return Ok(model);
    }
    match policy {
        SingularPolicy::Error => Err(AppError::convergence(format!(
            "Singular fit: random-effect covariance is not positive definite (theta = {}). \
             Simplify the random structure or rerun with --singular warn.",
            format_theta(&model.diagnostics.theta)
        ))),
        SingularPolicy::Warn => {
            warn!(theta = %format_theta(&model.diagnostics.theta), "singular fit accepted");
            Ok(model)
        }
    }
}

pub fn format_theta(theta: &[f64]) -> String {
    let parts: Vec<String> = theta.iter().map(|t| format!("{t:.4}")).collect();
    format!("[{}]", parts.join(", "))
}
