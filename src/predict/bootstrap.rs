//! Bootstrap prediction intervals.
//!
//! Two ways to build replicate predictions over the grid:
//!
//! - `Simulation`: draw `β* ~ N(β̂, Var β̂)` and, per time level,
//!   `b* ~ N(b̂, condVar)`, then evaluate `x'β* + z'b*`. Cheap; carries both
//!   fixed-effect and random-effect uncertainty.
//! - `Parametric`: simulate a new response from the fitted model, refit and
//!   predict. Expensive but includes variance-component uncertainty.
//!
//! Both are driven by one seeded `StdRng`, so a given configuration always
//! yields the same replicate set.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use tracing::{debug, info};

use crate::domain::{BootstrapConfig, BootstrapMethod, GridRow, IntervalSummary, NewLevelPolicy};
use crate::error::AppError;
use crate::fit::{FittedModel, MixedModelFitter, ModelData};
use crate::math::{covariance_factor, mean, quantiles};
use crate::predict::resolve_levels;

/// Replicate predictions, one curve (grid-length vector) per simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicateSet {
    pub grid: Vec<GridRow>,
    pub curves: Vec<Vec<f64>>,
}

impl ReplicateSet {
    pub fn n_sims(&self) -> usize {
        self.curves.len()
    }

    /// All replicate values at grid row `row`.
    pub fn column(&self, row: usize) -> Vec<f64> {
        self.curves.iter().map(|c| c[row]).collect()
    }
}

/// Reject requests the estimator cannot or should not serve.
pub fn check_request(config: &BootstrapConfig) -> Result<(), AppError> {
    if config.n_sims == 0 {
        return Err(AppError::sampling("Number of simulations must be > 0."));
    }
    if config.n_sims > config.budget {
        return Err(AppError::sampling(format!(
            "Requested {} simulations exceeds the budget of {}.",
            config.n_sims, config.budget
        )));
    }
    if config.subsample > config.n_sims {
        return Err(AppError::sampling(format!(
            "Cannot subsample {} of {} replicates.",
            config.subsample, config.n_sims
        )));
    }
    let (lo, hi) = (config.lower_quantile, config.upper_quantile);
    if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo >= hi {
        return Err(AppError::config(format!("Invalid interval quantiles [{lo}, {hi}].")));
    }
    Ok(())
}

/// Build replicate predictions with the configured method.
pub fn bootstrap(
    model: &FittedModel,
    data: &ModelData,
    fitter: &dyn MixedModelFitter,
    grid: &[GridRow],
    config: &BootstrapConfig,
    policy: NewLevelPolicy,
) -> Result<ReplicateSet, AppError> {
    check_request(config)?;
    let levels = resolve_levels(model, grid, policy)?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let curves = match config.method {
        BootstrapMethod::Simulation => simulate(model, grid, &levels, config, &mut rng),
        BootstrapMethod::Parametric => parametric(model, data, fitter, grid, &levels, config, &mut rng)?,
    };
    info!(
        method = ?config.method,
        n_sims = curves.len(),
        grid = grid.len(),
        "bootstrap replicates ready"
    );
    Ok(ReplicateSet {
        grid: grid.to_vec(),
        curves,
    })
}

/// Random-effect source for a grid row: a fitted level, or an unseen time
/// drawn from the population distribution.
struct Slot {
    mean: DVector<f64>,
    factor: DMatrix<f64>,
}

fn simulate(
    model: &FittedModel,
    grid: &[GridRow],
    levels: &[Option<usize>],
    config: &BootstrapConfig,
    rng: &mut StdRng,
) -> Vec<Vec<f64>> {
    let k = model.random_cov.nrows();
    let beta_factor = covariance_factor(&model.beta_cov);
    let population_factor = covariance_factor(&model.random_cov);

    // One slot per distinct level so rows sharing a time share a draw.
    let mut slot_of_level: BTreeMap<usize, usize> = BTreeMap::new();
    let mut slot_of_unseen: BTreeMap<i64, usize> = BTreeMap::new();
    let mut slots: Vec<Slot> = Vec::new();
    let mut row_slot = Vec::with_capacity(grid.len());
    for (row, level) in grid.iter().zip(levels) {
        let idx = match level {
            Some(l) => *slot_of_level.entry(*l).or_insert_with(|| {
                let fitted = &model.levels[*l];
                slots.push(Slot {
                    mean: fitted.blup.clone(),
                    factor: covariance_factor(&fitted.cond_cov),
                });
                slots.len() - 1
            }),
            None => {
                let key = (row.time * model.sfreq).round() as i64;
                *slot_of_unseen.entry(key).or_insert_with(|| {
                    slots.push(Slot {
                        mean: DVector::zeros(k),
                        factor: population_factor.clone(),
                    });
                    slots.len() - 1
                })
            }
        };
        row_slot.push(idx);
    }

    let x_rows: Vec<DVector<f64>> = grid.iter().map(|r| model.fixed_row(r.condition)).collect();
    let z_rows: Vec<DVector<f64>> = grid.iter().map(|r| model.random_row(r.condition)).collect();

    (0..config.n_sims)
        .map(|_| {
            let beta = &model.beta + &beta_factor * standard_normal(rng, model.beta.len());
            let effects: Vec<DVector<f64>> = slots
                .iter()
                .map(|s| &s.mean + &s.factor * standard_normal(rng, k))
                .collect();
            (0..grid.len())
                .map(|i| {
                    let mut value = x_rows[i].dot(&beta) + z_rows[i].dot(&effects[row_slot[i]]);
                    if config.include_residual {
                        value += model.sigma * rng.sample::<f64, _>(StandardNormal);
                    }
                    value
                })
                .collect()
        })
        .collect()
}

fn parametric(
    model: &FittedModel,
    data: &ModelData,
    fitter: &dyn MixedModelFitter,
    grid: &[GridRow],
    levels: &[Option<usize>],
    config: &BootstrapConfig,
    rng: &mut StdRng,
) -> Result<Vec<Vec<f64>>, AppError> {
    let k = data.n_random();
    let population_factor = covariance_factor(&model.random_cov);
    let cell_means: Vec<f64> = data.x_rows.iter().map(|x| x.dot(&model.beta)).collect();

    let mut curves = Vec::with_capacity(config.n_sims);
    let mut n_singular = 0usize;
    for sim in 0..config.n_sims {
        // New response: fixed part + fresh random effects + residual noise.
        let mut sums = Vec::with_capacity(data.groups.len());
        let mut yty = 0.0;
        for g in &data.groups {
            let b = &population_factor * standard_normal(rng, k);
            let mut cell_sums = vec![0.0; g.counts.len()];
            for (c, &n) in g.counts.iter().enumerate() {
                let mu = cell_means[c] + data.z_rows[c].dot(&b);
                for _ in 0..n {
                    let y = mu + model.sigma * rng.sample::<f64, _>(StandardNormal);
                    cell_sums[c] += y;
                    yty += y * y;
                }
            }
            sums.push(cell_sums);
        }

        let replicate = data.with_response(sums, yty);
        let refit = fitter
            .estimate(&replicate, Some(model.diagnostics.theta.as_slice()))
            .map_err(|e| AppError::new(e.kind(), format!("Bootstrap replicate {sim}: {}", e.message())))?;
        if refit.diagnostics.singular {
            n_singular += 1;
        }

        let curve = grid
            .iter()
            .zip(levels)
            .map(|(row, level)| {
                let mut value = refit.conditional_mean(row.condition, *level);
                if config.include_residual {
                    value += refit.sigma * rng.sample::<f64, _>(StandardNormal);
                }
                value
            })
            .collect();
        curves.push(curve);

        if (sim + 1) % 100 == 0 {
            debug!(done = sim + 1, total = config.n_sims, "parametric bootstrap progress");
        }
    }

    if n_singular > 0 {
        info!(n_singular, "parametric bootstrap: singular replicate fits kept");
    }
    Ok(curves)
}

fn standard_normal(rng: &mut StdRng, n: usize) -> DVector<f64> {
    DVector::from_fn(n, |_, _| StandardNormal.sample(&mut *rng))
}

/// Mean, median and interval bounds per grid row.
pub fn summarize(set: &ReplicateSet, lower: f64, upper: f64) -> Vec<IntervalSummary> {
    set.grid
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut column = set.column(i);
            let m = mean(&column);
            let q = quantiles(&mut column, &[0.5, lower, upper]);
            IntervalSummary {
                condition: row.condition,
                time: row.time,
                mean: m,
                median: q[0],
                lower: q[1],
                upper: q[2],
            }
        })
        .collect()
}

/// `k` distinct replicate indices drawn uniformly without replacement.
pub fn subsample(n_sims: usize, k: usize, seed: u64) -> Result<Vec<usize>, AppError> {
    if k > n_sims {
        return Err(AppError::sampling(format!("Cannot subsample {k} of {n_sims} replicates.")));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(rand::seq::index::sample(&mut rng, n_sims, k).into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitOptions;
    use crate::error::ErrorKind;
    use crate::fit::ProfiledFitter;
    use crate::predict::predictor::tests::small_model;
    use crate::predict::{predict, prediction_grid};

    fn config(n_sims: usize) -> BootstrapConfig {
        BootstrapConfig {
            n_sims,
            subsample: n_sims.min(10),
            ..BootstrapConfig::default()
        }
    }

    #[test]
    fn same_seed_gives_identical_replicates() {
        let (data, model) = small_model();
        let fitter = ProfiledFitter::new(FitOptions::default());
        let grid = prediction_grid(&model);

        let a = bootstrap(&model, &data, &fitter, &grid, &config(200), NewLevelPolicy::Error).unwrap();
        let b = bootstrap(&model, &data, &fitter, &grid, &config(200), NewLevelPolicy::Error).unwrap();
        assert_eq!(a, b);

        let other = BootstrapConfig {
            seed: 7,
            ..config(200)
        };
        let c = bootstrap(&model, &data, &fitter, &grid, &other, NewLevelPolicy::Error).unwrap();
        assert_ne!(a.curves, c.curves);
    }

    #[test]
    fn intervals_contain_point_predictions() {
        let (data, model) = small_model();
        let fitter = ProfiledFitter::new(FitOptions::default());
        let grid = prediction_grid(&model);
        let set = bootstrap(&model, &data, &fitter, &grid, &config(1000), NewLevelPolicy::Error).unwrap();
        let summary = summarize(&set, 0.025, 0.975);
        let points = predict(&model, &grid, NewLevelPolicy::Error).unwrap();

        let covered = summary
            .iter()
            .zip(&points)
            .filter(|(s, p)| s.contains(p.fit))
            .count();
        assert!(covered as f64 >= 0.9 * grid.len() as f64, "{covered}/{}", grid.len());
        for s in &summary {
            assert!(s.lower <= s.median && s.median <= s.upper);
        }
    }

    #[test]
    fn parametric_replicates_are_reproducible() {
        let (data, model) = small_model();
        let fitter = ProfiledFitter::new(FitOptions::default());
        let grid = prediction_grid(&model);
        let cfg = BootstrapConfig {
            method: BootstrapMethod::Parametric,
            ..config(5)
        };
        let a = bootstrap(&model, &data, &fitter, &grid, &cfg, NewLevelPolicy::Error).unwrap();
        let b = bootstrap(&model, &data, &fitter, &grid, &cfg, NewLevelPolicy::Error).unwrap();
        assert_eq!(a.n_sims(), 5);
        assert_eq!(a, b);
    }

    #[test]
    fn unseen_levels_draw_from_population_distribution() {
        let (data, model) = small_model();
        let fitter = ProfiledFitter::new(FitOptions::default());
        let grid = vec![GridRow::new(0, 1.0), GridRow::new(1, 1.0)];
        let set = bootstrap(&model, &data, &fitter, &grid, &config(50), NewLevelPolicy::Population).unwrap();
        assert_eq!(set.n_sims(), 50);

        let err = bootstrap(&model, &data, &fitter, &grid, &config(50), NewLevelPolicy::Error).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownTimeOffset);
    }

    #[test]
    fn request_checks() {
        assert_eq!(check_request(&config(0)).unwrap_err().kind(), ErrorKind::Sampling);
        let over = BootstrapConfig {
            budget: 100,
            ..config(101)
        };
        assert_eq!(check_request(&over).unwrap_err().kind(), ErrorKind::Sampling);
        let too_many = BootstrapConfig {
            subsample: 11,
            ..config(10)
        };
        assert_eq!(check_request(&too_many).unwrap_err().kind(), ErrorKind::Sampling);
        assert!(check_request(&config(1000)).is_ok());
    }

    #[test]
    fn subsample_has_no_repeats() {
        let idx = subsample(1000, 100, 3).unwrap();
        assert_eq!(idx.len(), 100);
        let mut sorted = idx.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 100);
        assert!(idx.iter().all(|&i| i < 1000));
        assert_eq!(subsample(10, 11, 0).unwrap_err().kind(), ErrorKind::Sampling);
    }

    #[test]
    fn subsample_is_uniform_over_seeds() {
        // Each of 10 indices should be picked with probability 3/10.
        let trials = 20_000u64;
        let mut counts = [0usize; 10];
        for seed in 0..trials {
            for i in subsample(10, 3, seed).unwrap() {
                counts[i] += 1;
            }
        }
        let expected = trials as f64 * 0.3;
        let chi2: f64 = counts
            .iter()
            .map(|&c| (c as f64 - expected).powi(2) / expected)
            .sum();
        // 9 degrees of freedom; 99.9th percentile is about 27.9.
        assert!(chi2 < 27.9, "chi2 = {chi2}, counts = {counts:?}");
    }
}
