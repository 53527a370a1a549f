//! Per-time-point ("no pooling") estimates.
//!
//! Each time level is fitted on its own with ordinary least squares on the
//! fixed-effect design. Comparing these with the mixed model's level
//! predictions shows how much partial pooling shrinks noisy time points
//! towards the population effect.
//!
//! Since the design row depends only on the condition, the level's OLS problem
//! reduces to a weighted regression on cell means:
//!
//! ```text
//! Σ_i (y_i - x_i'β)² = Σ_c n_c (ȳ_c - x_c'β)² + const
//! ```

use nalgebra::{DMatrix, DVector};

use crate::domain::TimeKey;
use crate::fit::ModelData;
use crate::math::solve_least_squares;

#[derive(Debug, Clone, PartialEq)]
pub struct UnpooledEstimate {
    pub key: TimeKey,
    pub time: f64,
    /// Fixed-effect coefficients; `None` when the level's system is degenerate.
    pub coefficients: Option<Vec<f64>>,
}

pub fn fit_unpooled(data: &ModelData) -> Vec<UnpooledEstimate> {
    let p = data.n_fixed();
    data.groups
        .iter()
        .map(|g| {
            let cells: Vec<usize> = (0..data.n_conditions()).filter(|&c| g.counts[c] > 0).collect();
            let mut x = DMatrix::zeros(cells.len(), p);
            let mut y = DVector::zeros(cells.len());
            for (r, &c) in cells.iter().enumerate() {
                let w = (g.counts[c] as f64).sqrt();
                for j in 0..p {
                    x[(r, j)] = w * data.x_rows[c][j];
                }
                y[r] = g.sums[c] / w;
            }
            let coefficients = if cells.is_empty() {
                None
            } else {
                solve_least_squares(&x, &y).map(|b| b.iter().copied().collect())
            };
            UnpooledEstimate {
                key: g.key,
                time: g.time,
                coefficients,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitOptions;
    use crate::fit::data::tests::table_from;
    use crate::fit::{MixedModelFitter, ProfiledFitter};
    use crate::math::mean;
    use crate::models::{ModelSpec, RandomStructure};

    #[test]
    fn unpooled_contrasts_are_cell_mean_differences() {
        let table = table_from(
            &[(0, 0, 1.0), (0, 0, 3.0), (0, 1, 7.0), (1, 0, 0.0), (1, 1, 1.0), (1, 1, 3.0)],
            &["a", "b"],
            100.0,
        );
        let data = ModelData::from_table(&table, &ModelSpec::default()).unwrap();
        let est = fit_unpooled(&data);

        let c0 = est[0].coefficients.as_ref().unwrap();
        assert!((c0[0] - 2.0).abs() < 1e-10);
        assert!((c0[1] - 5.0).abs() < 1e-10);
        let c1 = est[1].coefficients.as_ref().unwrap();
        assert!((c1[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn partial_pooling_shrinks_condition_effects() {
        // Noisy per-level condition effects around 3.
        let noise = [1.2, -0.8, 0.3, -1.5, 0.9, -0.1, 0.6, -0.6];
        let mut cells = Vec::new();
        for (g, d) in noise.iter().enumerate() {
            for i in 0..6 {
                let e = [-1.0, 0.5, 1.0, -0.5, 0.25, -0.25][(g + i) % 6];
                cells.push((g as i64, 0, 1.0 + e));
                cells.push((g as i64, 1, 4.0 + d + 2.0 * e));
            }
        }
        let table = table_from(&cells, &["a", "b"], 100.0);
        let spec = ModelSpec::with_random(RandomStructure::Slope);
        let data = ModelData::from_table(&table, &spec).unwrap();

        let model = ProfiledFitter::new(FitOptions::default()).estimate(&data, None).unwrap();
        let pooled: Vec<f64> = (0..model.levels.len()).map(|l| model.level_contrast(1, l)).collect();
        let raw: Vec<f64> = fit_unpooled(&data)
            .iter()
            .map(|e| e.coefficients.as_ref().unwrap()[1])
            .collect();

        let spread = |v: &[f64]| {
            let m = mean(v);
            v.iter().map(|x| (x - m).powi(2)).sum::<f64>()
        };
        assert!(spread(&pooled) <= spread(&raw) + 1e-9);
    }
}
