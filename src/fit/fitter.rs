//! Profiled (restricted) maximum likelihood fitter.
//!
//! With `Σ = σ² T Tᵀ` and spherical random effects `b_g = T u_g`, each
//! evaluation of the criterion at a candidate `θ` solves a penalized least
//! squares problem block by block:
//!
//! ```text
//! L_g L_gᵀ = Tᵀ Z'Z_g T + I
//! c_u,g    = L_g⁻¹ Tᵀ Z'y_g          R_ZX,g = L_g⁻¹ Tᵀ Z'X_g
//! L_X L_Xᵀ = X'X - Σ_g R_ZX,gᵀ R_ZX,g
//! c_β      = L_X⁻¹ (X'y - Σ_g R_ZX,gᵀ c_u,g)        β = L_X⁻ᵀ c_β
//! r²       = y'y - Σ_g |c_u,g|² - |c_β|²
//! ```
//!
//! and the profiled criteria are
//!
//! ```text
//! ML:   log|L|² + n (1 + ln(2π r² / n))
//! REML: log|L|² + log|L_X|² + (n - p) (1 + ln(2π r² / (n - p)))
//! ```
//!
//! `σ²`, `β` and the random effects are recovered in closed form at the
//! optimum, so the optimizer only ever sees `θ`.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::domain::{Criterion, FitOptions, SingularPolicy};
use crate::error::AppError;
use crate::fit::{FitDiagnostics, FittedModel, FixedEffect, LevelEffect, MixedModelFitter, ModelData, format_theta};
use crate::math::{
    NelderMead, OptimResult, Optimizer, lower_from_theta, theta_diagonal, theta_identity, theta_len,
    theta_lower_bounds,
};

pub struct ProfiledFitter {
    options: FitOptions,
    optimizer: Box<dyn Optimizer>,
}

impl ProfiledFitter {
    /// Fitter driven by the bounded Nelder–Mead with the tolerances in `options`.
    pub fn new(options: FitOptions) -> Self {
        let optimizer = NelderMead {
            max_evals: options.max_evals,
            ftol: options.ftol,
            xtol: options.xtol,
            ..NelderMead::default()
        };
        Self::with_optimizer(options, Box::new(optimizer))
    }

    pub fn with_optimizer(options: FitOptions, optimizer: Box<dyn Optimizer>) -> Self {
        Self { options, optimizer }
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }
}

impl MixedModelFitter for ProfiledFitter {
    fn estimate(&self, data: &ModelData, theta0: Option<&[f64]>) -> Result<FittedModel, AppError> {
        let k = data.n_random();
        let start = theta0.map(<[f64]>::to_vec).unwrap_or_else(|| theta_identity(k));
        if start.len() != theta_len(k) {
            return Err(AppError::config(format!(
                "Starting theta has {} elements, expected {}.",
                start.len(),
                theta_len(k)
            )));
        }
        let lower = theta_lower_bounds(k);
        let criterion = self.options.criterion;

        let mut objective =
            |theta: &[f64]| profile(data, theta, criterion).map_or(f64::INFINITY, |p| p.objective);
        let result = self.optimizer.minimize(&mut objective, &start, &lower);
        debug!(
            evals = result.evals,
            objective = result.fval,
            theta = %format_theta(&result.x),
            converged = result.converged,
            "optimizer finished"
        );

        if result.x.len() != theta_len(k) {
            return Err(AppError::convergence(format!(
                "Optimizer returned {} theta elements, expected {}.",
                result.x.len(),
                theta_len(k)
            )));
        }
        if !result.converged {
            return Err(AppError::convergence(format!(
                "Optimizer stopped after {} evaluations without converging (criterion {:.4}, theta = {}).",
                result.evals,
                result.fval,
                format_theta(&result.x)
            )));
        }
        let Some(prof) = profile(data, &result.x, criterion) else {
            return Err(AppError::convergence(format!(
                "No finite, positive definite solution at theta = {} after {} evaluations.",
                format_theta(&result.x),
                result.evals
            )));
        };

        let model = self.assemble(data, &result, prof)?;
        info!(
            criterion = ?criterion,
            objective = model.diagnostics.objective,
            sigma = model.sigma,
            singular = model.diagnostics.singular,
            "fitted mixed model"
        );
        Ok(model)
    }

    fn singular_policy(&self) -> SingularPolicy {
        self.options.singular
    }
}

impl ProfiledFitter {
    fn assemble(&self, data: &ModelData, result: &OptimResult, prof: Profile) -> Result<FittedModel, AppError> {
        let k = data.n_random();
        let p = data.n_fixed();
        let n = data.n_obs as f64;
        let dof = match self.options.criterion {
            Criterion::Reml => n - p as f64,
            Criterion::Ml => n,
        };
        let sigma2 = prof.r2 / dof;
        let not_pd = || AppError::convergence("Fixed-effect cross product is not positive definite.");

        let lx_inv = prof.lx.solve_lower_triangular(&DMatrix::identity(p, p)).ok_or_else(not_pd)?;
        let beta_cov = lx_inv.transpose() * &lx_inv * sigma2;

        let fixed = data
            .spec
            .fixed_names(&data.conditions)
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let std_error = beta_cov[(i, i)].max(0.0).sqrt();
                FixedEffect {
                    name,
                    estimate: prof.beta[i],
                    std_error,
                    t_value: prof.beta[i] / std_error,
                }
            })
            .collect();

        let t = lower_from_theta(&result.x, k);
        let random_cov = &t * t.transpose() * sigma2;

        let mut levels = Vec::with_capacity(data.groups.len());
        for (g, f) in data.groups.iter().zip(&prof.factors) {
            let rhs = &f.cu - &f.rzx * &prof.beta;
            let u = f.l.tr_solve_lower_triangular(&rhs).ok_or_else(not_pd)?;
            let l_inv = f.l.solve_lower_triangular(&DMatrix::identity(k, k)).ok_or_else(not_pd)?;
            let m_inv = l_inv.transpose() * &l_inv;
            levels.push(LevelEffect {
                key: g.key,
                time: g.time,
                n_obs: g.n_obs(),
                blup: &t * u,
                cond_cov: &t * m_inv * t.transpose() * sigma2,
            });
        }

        let singular = theta_diagonal(k)
            .into_iter()
            .any(|i| result.x[i] < self.options.singular_tol);

        Ok(FittedModel {
            spec: data.spec.clone(),
            conditions: data.conditions.clone(),
            sfreq: data.sfreq,
            fixed,
            beta: prof.beta,
            beta_cov,
            random_names: data.spec.random_names(&data.conditions),
            random_cov,
            sigma: sigma2.sqrt(),
            levels,
            diagnostics: FitDiagnostics {
                criterion: self.options.criterion,
                objective: prof.objective,
                evals: result.evals,
                converged: result.converged,
                theta: result.x.clone(),
                singular,
                n_obs: data.n_obs,
                n_groups: data.groups.len(),
            },
        })
    }
}

struct GroupFactor {
    l: DMatrix<f64>,
    cu: DVector<f64>,
    rzx: DMatrix<f64>,
}

struct Profile {
    objective: f64,
    beta: DVector<f64>,
    r2: f64,
    lx: DMatrix<f64>,
    factors: Vec<GroupFactor>,
}

/// Evaluate the profiled criterion at `theta`; `None` when any factorization
/// fails or the penalized residual sum of squares is not positive.
fn profile(data: &ModelData, theta: &[f64], criterion: Criterion) -> Option<Profile> {
    let k = data.n_random();
    let p = data.n_fixed();
    if theta.len() != theta_len(k) {
        return None;
    }
    let t = lower_from_theta(theta, k);
    let tt = t.transpose();

    let mut logdet_l = 0.0;
    let mut cu_sq = 0.0;
    let mut rxtrx = data.xtx.clone();
    let mut rhs_x = data.xty.clone();
    let mut factors = Vec::with_capacity(data.groups.len());

    for g in &data.groups {
        let m = &tt * &g.ztz * &t + DMatrix::identity(k, k);
        let l = m.cholesky()?.l();
        let cu = l.solve_lower_triangular(&(&tt * &g.zty))?;
        let rzx = l.solve_lower_triangular(&(&tt * &g.ztx))?;

        logdet_l += 2.0 * l.diagonal().iter().map(|d| d.ln()).sum::<f64>();
        cu_sq += cu.norm_squared();
        rxtrx -= rzx.transpose() * &rzx;
        rhs_x -= rzx.transpose() * &cu;
        factors.push(GroupFactor { l, cu, rzx });
    }

    let lx = rxtrx.cholesky()?.l();
    let cbeta = lx.solve_lower_triangular(&rhs_x)?;
    let beta = lx.tr_solve_lower_triangular(&cbeta)?;
    let r2 = data.yty - cu_sq - cbeta.norm_squared();
    if !(r2.is_finite() && r2 > 0.0) {
        return None;
    }

    let n = data.n_obs as f64;
    let two_pi = 2.0 * std::f64::consts::PI;
    let objective = match criterion {
        Criterion::Ml => logdet_l + n * (1.0 + (two_pi * r2 / n).ln()),
        Criterion::Reml => {
            let dof = n - p as f64;
            let logdet_x = 2.0 * lx.diagonal().iter().map(|d| d.ln()).sum::<f64>();
            logdet_l + logdet_x + dof * (1.0 + (two_pi * r2 / dof).ln())
        }
    };

    objective.is_finite().then_some(Profile {
        objective,
        beta,
        r2,
        lx,
        factors,
    })
}
