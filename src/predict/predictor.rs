//! Point predictions over a (condition, time) grid.

use crate::domain::{GridRow, NewLevelPolicy, Prediction};
use crate::error::{AppError, ErrorKind};
use crate::fit::FittedModel;

/// Every condition crossed with every fitted time level, condition-major.
pub fn prediction_grid(model: &FittedModel) -> Vec<GridRow> {
    (0..model.conditions.len())
        .flat_map(|c| model.levels.iter().map(move |l| GridRow::new(c, l.time)))
        .collect()
}

/// Fitted level for each grid row; `None` marks an unseen time offset that
/// the policy allows to be predicted at population level.
pub fn resolve_levels(
    model: &FittedModel,
    grid: &[GridRow],
    policy: NewLevelPolicy,
) -> Result<Vec<Option<usize>>, AppError> {
    grid.iter()
        .map(|row| {
            if row.condition >= model.conditions.len() {
                return Err(AppError::config(format!(
                    "Grid row refers to unknown condition index {}.",
                    row.condition
                )));
            }
            match (model.level_for_time(row.time), policy) {
                (Some(level), _) => Ok(Some(level)),
                (None, NewLevelPolicy::Population) => Ok(None),
                (None, NewLevelPolicy::Error) => Err(AppError::new(
                    ErrorKind::UnknownTimeOffset,
                    format!(
                        "Time offset {:.4}s was not seen during fitting; \
                         use --new-levels population to predict at population level.",
                        row.time
                    ),
                )),
            }
        })
        .collect()
}

/// Conditional expectation `x'β + z'b_t` at every grid row.
pub fn predict(model: &FittedModel, grid: &[GridRow], policy: NewLevelPolicy) -> Result<Vec<Prediction>, AppError> {
    let levels = resolve_levels(model, grid, policy)?;
    Ok(grid
        .iter()
        .zip(levels)
        .map(|(row, level)| Prediction {
            condition: row.condition,
            time: row.time,
            fit: model.conditional_mean(row.condition, level),
        })
        .collect())
}
