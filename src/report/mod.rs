//! Reporting utilities: pooling comparison and formatted terminal output.

pub mod format;

pub use format::*;

use crate::fit::{FittedModel, UnpooledEstimate};

/// Condition effect at one time level, with and without pooling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolingRow {
    pub time: f64,
    /// Per-time OLS contrast; `None` when the level could not be fitted alone.
    pub unpooled: Option<f64>,
    /// Mixed-model contrast `(β + b_t)` for the same condition.
    pub pooled: f64,
}

/// Compare the contrast of `condition` against the reference condition at
/// every time level.
///
/// Requires the unpooled estimates to come from the same `ModelData` as the
/// model, so that levels line up one to one.
pub fn pooling_comparison(model: &FittedModel, unpooled: &[UnpooledEstimate], condition: usize) -> Vec<PoolingRow> {
    let column = contrast_column(model, condition);
    model
        .levels
        .iter()
        .enumerate()
        .zip(unpooled)
        .map(|((l, level), est)| PoolingRow {
            time: level.time,
            unpooled: match (column, &est.coefficients) {
                (Some(j), Some(c)) => Some(c[j]),
                _ => None,
            },
            pooled: model.level_contrast(condition, l),
        })
        .collect()
}

/// Spread of the per-time contrasts before and after pooling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShrinkageStats {
    pub unpooled_sd: f64,
    pub pooled_sd: f64,
}

impl ShrinkageStats {
    /// `pooled_sd / unpooled_sd`; below 1 means pooling pulled time points together.
    pub fn ratio(&self) -> f64 {
        self.pooled_sd / self.unpooled_sd
    }
}

pub fn shrinkage_stats(rows: &[PoolingRow]) -> Option<ShrinkageStats> {
    let pairs: Vec<(f64, f64)> = rows.iter().filter_map(|r| r.unpooled.map(|u| (u, r.pooled))).collect();
    if pairs.len() < 2 {
        return None;
    }
    let sd = |v: &[f64]| {
        let m = crate::math::mean(v);
        (v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (v.len() - 1) as f64).sqrt()
    };
    let unpooled: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let pooled: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    Some(ShrinkageStats {
        unpooled_sd: sd(&unpooled),
        pooled_sd: sd(&pooled),
    })
}

/// Fixed-effect column holding the treatment contrast of `condition`.
fn contrast_column(model: &FittedModel, condition: usize) -> Option<usize> {
    if condition == 0 {
        return None;
    }
    let label = model.conditions.get(condition)?;
    let name = format!("condition{label}");
    model.fixed.iter().position(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::fit_unpooled;
    use crate::predict::predictor::tests::small_model;

    #[test]
    fn pooling_rows_line_up_with_levels() {
        let (data, model) = small_model();
        let rows = pooling_comparison(&model, &fit_unpooled(&data), 1);
        assert_eq!(rows.len(), model.levels.len());
        assert!(rows.iter().all(|r| r.unpooled.is_some()));

        // The unpooled contrast at level 0 is the raw cell-mean difference.
        let raw = data.groups[0].sums[1] / data.groups[0].counts[1] as f64
            - data.groups[0].sums[0] / data.groups[0].counts[0] as f64;
        assert!((rows[0].unpooled.unwrap() - raw).abs() < 1e-9);

        let stats = shrinkage_stats(&rows).unwrap();
        assert!(stats.unpooled_sd > 0.0);
    }

    #[test]
    fn reference_condition_has_no_contrast() {
        let (data, model) = small_model();
        let rows = pooling_comparison(&model, &fit_unpooled(&data), 0);
        assert!(rows.iter().all(|r| r.unpooled.is_none() && r.pooled == 0.0));
        assert!(shrinkage_stats(&rows).is_none());
    }
}
