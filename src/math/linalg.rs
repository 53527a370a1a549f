//! Covariance-factor helpers.
//!
//! The random-effect covariance is parameterized as `Σ = σ² T Tᵀ` with `T`
//! lower triangular. `θ` lists the lower triangle of `T` column by column,
//! so for two random effects `θ = [t11, t21, t22]`.

use nalgebra::{DMatrix, SymmetricEigen};

/// Number of free parameters in a `k × k` lower-triangular factor.
pub fn theta_len(k: usize) -> usize {
    k * (k + 1) / 2
}

/// Build `T` from `θ` (column-major lower triangle).
///
/// # Panics
/// Panics if `theta.len() != theta_len(k)`.
pub fn lower_from_theta(theta: &[f64], k: usize) -> DMatrix<f64> {
    assert_eq!(theta.len(), theta_len(k), "theta length mismatch");
    let mut t = DMatrix::zeros(k, k);
    let mut idx = 0;
    for j in 0..k {
        for i in j..k {
            t[(i, j)] = theta[idx];
            idx += 1;
        }
    }
    t
}

/// Positions in `θ` that hold diagonal elements of `T`.
pub fn theta_diagonal(k: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(k);
    let mut idx = 0;
    for j in 0..k {
        out.push(idx);
        idx += k - j;
    }
    out
}

/// Lower bounds for `θ`: diagonal elements are non-negative, the rest free.
pub fn theta_lower_bounds(k: usize) -> Vec<f64> {
    let mut lower = vec![f64::NEG_INFINITY; theta_len(k)];
    for i in theta_diagonal(k) {
        lower[i] = 0.0;
    }
    lower
}

/// Starting value `θ₀` (identity factor).
pub fn theta_identity(k: usize) -> Vec<f64> {
    let mut theta = vec![0.0; theta_len(k)];
    for i in theta_diagonal(k) {
        theta[i] = 1.0;
    }
    theta
}

/// A factor `A` with `A Aᵀ = cov`, tolerating positive semi-definite input.
///
/// Tries Cholesky first; singular covariances (e.g. a variance component
/// estimated at zero) fall back to an eigen decomposition with negative
/// eigenvalues clipped to zero.
pub fn covariance_factor(cov: &DMatrix<f64>) -> DMatrix<f64> {
    if let Some(chol) = cov.clone().cholesky() {
        return chol.l();
    }
    let sym = (cov + cov.transpose()) * 0.5;
    let eig = SymmetricEigen::new(sym);
    let mut v = eig.eigenvectors;
    for (j, lambda) in eig.eigenvalues.iter().enumerate() {
        let s = lambda.max(0.0).sqrt();
        for i in 0..v.nrows() {
            v[(i, j)] *= s;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theta_fills_lower_triangle_by_columns() {
        let t = lower_from_theta(&[1.0, 2.0, 3.0], 2);
        assert_eq!(t[(0, 0)], 1.0);
        assert_eq!(t[(1, 0)], 2.0);
        assert_eq!(t[(1, 1)], 3.0);
        assert_eq!(t[(0, 1)], 0.0);
        assert_eq!(theta_diagonal(3), vec![0, 3, 5]);
        assert_eq!(theta_identity(2), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn covariance_factor_handles_singular_input() {
        let cov = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 0.0]);
        let a = covariance_factor(&cov);
        let back = &a * a.transpose();
        assert!((back - cov).abs().max() < 1e-12);
    }
}
