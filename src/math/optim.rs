//! Derivative-free minimization with box lower bounds.
//!
//! The profiled deviance is cheap to evaluate but has no convenient gradient,
//! so the fitter drives it with a Nelder–Mead simplex. Bounds are enforced by
//! projecting every trial point onto the feasible set, which is enough for the
//! `θ ≥ 0` constraints on the diagonal of the covariance factor.
//!
//! The fitter only sees the `Optimizer` trait, so tests and callers can swap
//! in a different minimizer.

/// Outcome of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimResult {
    pub x: Vec<f64>,
    pub fval: f64,
    /// Number of objective evaluations spent.
    pub evals: usize,
    /// `false` when the evaluation budget ran out before the tolerances were met.
    pub converged: bool,
}

pub trait Optimizer {
    /// Minimize `objective` starting at `x0`, keeping `x[i] >= lower[i]`.
    fn minimize(&self, objective: &mut dyn FnMut(&[f64]) -> f64, x0: &[f64], lower: &[f64]) -> OptimResult;
}

/// Bounded Nelder–Mead simplex.
#[derive(Debug, Clone, PartialEq)]
pub struct NelderMead {
    pub max_evals: usize,
    /// Relative tolerance on the spread of objective values in the simplex.
    pub ftol: f64,
    /// Absolute tolerance on the simplex diameter.
    pub xtol: f64,
    /// Edge length of the initial simplex.
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_evals: 2000,
            ftol: 1e-10,
            xtol: 1e-7,
            initial_step: 0.25,
        }
    }
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

impl Optimizer for NelderMead {
    fn minimize(&self, objective: &mut dyn FnMut(&[f64]) -> f64, x0: &[f64], lower: &[f64]) -> OptimResult {
        let n = x0.len();
        let mut evals = 0usize;
        let mut eval = |x: &[f64], evals: &mut usize| {
            *evals += 1;
            let f = objective(x);
            if f.is_finite() { f } else { f64::INFINITY }
        };

        let start = project(x0.to_vec(), lower);
        if n == 0 {
            let fval = eval(&start, &mut evals);
            return OptimResult {
                x: start,
                fval,
                evals,
                converged: true,
            };
        }

        let mut simplex = Vec::with_capacity(n + 1);
        simplex.push(start.clone());
        for i in 0..n {
            let mut p = start.clone();
            p[i] += if p[i] != 0.0 { self.initial_step * p[i].abs().max(1.0) } else { self.initial_step };
            simplex.push(project(p, lower));
        }
        let mut fvals: Vec<f64> = simplex.iter().map(|p| eval(p, &mut evals)).collect();

        loop {
            // Order vertices best to worst.
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| fvals[a].total_cmp(&fvals[b]));
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            fvals = order.iter().map(|&i| fvals[i]).collect();

            let best = fvals[0];
            let worst = fvals[n];
            let spread = (worst - best).abs();
            let diameter = simplex[1..]
                .iter()
                .map(|p| p.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()).fold(0.0, f64::max))
                .fold(0.0, f64::max);
            if best.is_finite() && spread <= self.ftol * (1.0 + best.abs()) && diameter <= self.xtol {
                return OptimResult {
                    x: simplex.swap_remove(0),
                    fval: best,
                    evals,
                    converged: true,
                };
            }
            if evals >= self.max_evals {
                return OptimResult {
                    x: simplex.swap_remove(0),
                    fval: best,
                    evals,
                    converged: false,
                };
            }

            let mut centroid = vec![0.0; n];
            for p in &simplex[..n] {
                for (c, v) in centroid.iter_mut().zip(p) {
                    *c += v / n as f64;
                }
            }
            let towards = |from: &[f64], to: &[f64], t: f64| -> Vec<f64> {
                let p = from.iter().zip(to).map(|(a, b)| a + t * (b - a)).collect();
                project(p, lower)
            };

            let xr = towards(&centroid, &simplex[n], -REFLECT);
            let fr = eval(&xr, &mut evals);

            if fr < best {
                let xe = towards(&centroid, &xr, EXPAND);
                let fe = eval(&xe, &mut evals);
                if fe < fr {
                    simplex[n] = xe;
                    fvals[n] = fe;
                } else {
                    simplex[n] = xr;
                    fvals[n] = fr;
                }
                continue;
            }
            if fr < fvals[n - 1] {
                simplex[n] = xr;
                fvals[n] = fr;
                continue;
            }

            let (xc, fc) = if fr < worst {
                let xc = towards(&centroid, &xr, CONTRACT);
                let fc = eval(&xc, &mut evals);
                (xc, fc)
            } else {
                let xc = towards(&centroid, &simplex[n], CONTRACT);
                let fc = eval(&xc, &mut evals);
                (xc, fc)
            };
            if fc < fr.min(worst) {
                simplex[n] = xc;
                fvals[n] = fc;
                continue;
            }

            // Shrink everything towards the best vertex.
            let anchor = simplex[0].clone();
            for i in 1..=n {
                simplex[i] = towards(&anchor, &simplex[i], SHRINK);
                fvals[i] = eval(&simplex[i], &mut evals);
            }
        }
    }
}

fn project(mut x: Vec<f64>, lower: &[f64]) -> Vec<f64> {
    for (v, &lo) in x.iter_mut().zip(lower) {
        if *v < lo {
            *v = lo;
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_rosenbrock_minimum() {
        let nm = NelderMead {
            max_evals: 10_000,
            ftol: 1e-14,
            xtol: 1e-9,
            ..NelderMead::default()
        };
        let mut f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let res = nm.minimize(&mut f, &[-1.2, 1.0], &[f64::NEG_INFINITY; 2]);
        assert!(res.converged);
        assert!((res.x[0] - 1.0).abs() < 1e-3, "{:?}", res.x);
        assert!((res.x[1] - 1.0).abs() < 1e-3, "{:?}", res.x);
    }

    #[test]
    fn respects_lower_bounds() {
        let nm = NelderMead::default();
        let mut f = |x: &[f64]| (x[0] + 1.0).powi(2) + (x[1] - 2.0).powi(2);
        let res = nm.minimize(&mut f, &[1.0, 1.0], &[0.0, f64::NEG_INFINITY]);
        assert!(res.x[0] >= 0.0);
        assert!(res.x[0] < 1e-6, "{:?}", res.x);
        assert!((res.x[1] - 2.0).abs() < 1e-4, "{:?}", res.x);
    }

    #[test]
    fn reports_exhausted_budget() {
        let nm = NelderMead {
            max_evals: 5,
            ..NelderMead::default()
        };
        let mut f = |x: &[f64]| (x[0] - 3.0).powi(2);
        let res = nm.minimize(&mut f, &[0.0], &[f64::NEG_INFINITY]);
        assert!(!res.converged);
        assert!(res.evals >= 5);
    }
}
