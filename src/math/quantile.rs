//! Empirical quantiles of bootstrap replicates.
//!
//! Uses the Hyndman & Fan type 7 estimator (linear interpolation between
//! order statistics), the default of most statistics packages:
//!
//! ```text
//! h = (n - 1) * p
//! q = x[floor(h)] + (h - floor(h)) * (x[floor(h) + 1] - x[floor(h)])
//! ```

/// Quantile of an already sorted slice.
///
/// # Panics
///
/// Panics if `sorted` is empty or if `p` is outside [0, 1].
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    assert!(!sorted.is_empty(), "Cannot compute quantile of empty slice");
    assert!((0.0..=1.0).contains(&p), "Quantile probability must be in [0, 1]");

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Sort `data` in place and return the requested quantiles.
pub fn quantiles(data: &mut [f64], probs: &[f64]) -> Vec<f64> {
    data.sort_by(|a, b| a.total_cmp(b));
    probs.iter().map(|&p| quantile_sorted(data, p)).collect()
}

/// Arithmetic mean; `NaN` for an empty slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type7_interpolates_between_order_statistics() {
        let mut data = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        let q = quantiles(&mut data, &[0.0, 0.25, 0.5, 0.9, 1.0]);
        let expected = [1.0, 2.0, 3.0, 4.6, 5.0];
        for (got, want) in q.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{got} vs {want}");
        }
    }

    #[test]
    fn single_value() {
        assert_eq!(quantile_sorted(&[7.0], 0.3), 7.0);
        assert!(mean(&[]).is_nan());
        assert_eq!(mean(&[1.0, 2.0, 6.0]), 3.0);
    }
}
