//! Model-ready view of the observation table.
//!
//! Both design rows depend only on an observation's condition, so every
//! cross product the fitter needs can be built from per-(time level, condition)
//! counts and sums:
//!
//! ```text
//! Z'Z_g = Σ_c n_gc z_c z_c'     Z'X_g = Σ_c n_gc z_c x_c'     Z'y_g = Σ_c s_gc z_c
//! X'X   = Σ_g Σ_c n_gc x_c x_c'  X'y  = Σ_g Σ_c s_gc x_c       y'y  = Σ_i y_i²
//! ```
//!
//! The raw amplitudes are never needed again after this step, except when the
//! parametric bootstrap replaces the response (see `ModelData::with_response`).

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use crate::domain::{ObservationTable, TimeKey};
use crate::error::AppError;
use crate::models::ModelSpec;

/// Cross products of one time level.
#[derive(Debug, Clone)]
pub struct GroupStats {
    pub key: TimeKey,
    pub time: f64,
    /// Observations per condition.
    pub counts: Vec<usize>,
    /// Amplitude sums per condition.
    pub sums: Vec<f64>,
    pub ztz: DMatrix<f64>,
    pub ztx: DMatrix<f64>,
    pub zty: DVector<f64>,
}

impl GroupStats {
    pub fn n_obs(&self) -> usize {
        self.counts.iter().sum()
    }
}

#[derive(Debug, Clone)]
pub struct ModelData {
    pub spec: ModelSpec,
    pub conditions: Vec<String>,
    pub sfreq: f64,
    /// Fixed design row per condition.
    pub x_rows: Vec<DVector<f64>>,
    /// Random design row per condition.
    pub z_rows: Vec<DVector<f64>>,
    /// Time levels in ascending key order.
    pub groups: Vec<GroupStats>,
    pub xtx: DMatrix<f64>,
    pub xty: DVector<f64>,
    pub yty: f64,
    pub n_obs: usize,
}

impl ModelData {
    pub fn from_table(table: &ObservationTable, spec: &ModelSpec) -> Result<Self, AppError> {
        if table.is_empty() {
            return Err(AppError::config("Observation table is empty; nothing to fit."));
        }
        let n_cond = table.conditions.len();
        spec.validate(n_cond)?;

        let mut index: BTreeMap<TimeKey, (f64, Vec<usize>, Vec<f64>)> = BTreeMap::new();
        let mut yty = 0.0;
        for row in &table.rows {
            if !row.amplitude.is_finite() {
                return Err(AppError::config(format!(
                    "Non-finite amplitude in epoch {} at t={:.4}s.",
                    row.epoch, row.time
                )));
            }
            if row.condition >= n_cond {
                return Err(AppError::config(format!(
                    "Observation refers to unknown condition index {}.",
                    row.condition
                )));
            }
            let entry = index
                .entry(row.time_key)
                .or_insert_with(|| (row.time, vec![0; n_cond], vec![0.0; n_cond]));
            entry.1[row.condition] += 1;
            entry.2[row.condition] += row.amplitude;
            yty += row.amplitude * row.amplitude;
        }

        for (c, label) in table.conditions.iter().enumerate() {
            if index.values().all(|(_, counts, _)| counts[c] == 0) {
                return Err(AppError::config(format!(
                    "Condition '{label}' has no observations (its event code never matched, or every epoch was dropped)."
                )));
            }
        }

        let cells: Vec<(TimeKey, f64, Vec<usize>, Vec<f64>)> = index
            .into_iter()
            .map(|(key, (time, counts, sums))| (key, time, counts, sums))
            .collect();

        let data = Self::assemble(table.conditions.clone(), table.sfreq, spec.clone(), cells, yty);
        if data.n_obs <= data.n_fixed() {
            return Err(AppError::config(format!(
                "Need more observations ({}) than fixed effects ({}).",
                data.n_obs,
                data.n_fixed()
            )));
        }
        Ok(data)
    }

    /// Same design, new response.
    ///
    /// `sums[g][c]` is the response sum of level `g` and condition `c`; `yty`
    /// is the new total sum of squares.
    pub fn with_response(&self, sums: Vec<Vec<f64>>, yty: f64) -> Self {
        let cells = self
            .groups
            .iter()
            .zip(sums)
            .map(|(g, s)| (g.key, g.time, g.counts.clone(), s))
            .collect();
        Self::assemble(self.conditions.clone(), self.sfreq, self.spec.clone(), cells, yty)
    }

    fn assemble(
        conditions: Vec<String>,
        sfreq: f64,
        spec: ModelSpec,
        cells: Vec<(TimeKey, f64, Vec<usize>, Vec<f64>)>,
        yty: f64,
    ) -> Self {
        let n_cond = conditions.len();
        let p = spec.fixed_len(n_cond);
        let k = spec.random_len(n_cond);

        let x_rows: Vec<DVector<f64>> = (0..n_cond)
            .map(|c| {
                let mut row = vec![0.0; p];
                spec.fill_fixed_row(c, n_cond, &mut row);
                DVector::from_vec(row)
            })
            .collect();
        let z_rows: Vec<DVector<f64>> = (0..n_cond)
            .map(|c| {
                let mut row = vec![0.0; k];
                spec.fill_random_row(c, n_cond, &mut row);
                DVector::from_vec(row)
            })
            .collect();

        let mut xtx = DMatrix::zeros(p, p);
        let mut xty = DVector::zeros(p);
        let mut n_obs = 0;
        let mut groups = Vec::with_capacity(cells.len());
        for (key, time, counts, sums) in cells {
            let mut ztz = DMatrix::zeros(k, k);
            let mut ztx = DMatrix::zeros(k, p);
            let mut zty = DVector::zeros(k);
            for c in 0..n_cond {
                let n = counts[c] as f64;
                if counts[c] == 0 {
                    continue;
                }
                let (x, z) = (&x_rows[c], &z_rows[c]);
                ztz += z * z.transpose() * n;
                ztx += z * x.transpose() * n;
                zty += z * sums[c];
                xtx += x * x.transpose() * n;
                xty += x * sums[c];
                n_obs += counts[c];
            }
            groups.push(GroupStats {
                key,
                time,
                counts,
                sums,
                ztz,
                ztx,
                zty,
            });
        }

        Self {
            spec,
            conditions,
            sfreq,
            x_rows,
            z_rows,
            groups,
            xtx,
            xty,
            yty,
            n_obs,
        }
    }

    pub fn n_fixed(&self) -> usize {
        self.x_rows.first().map_or(0, |x| x.len())
    }

    pub fn n_random(&self) -> usize {
        self.z_rows.first().map_or(0, |z| z.len())
    }

    pub fn n_conditions(&self) -> usize {
        self.conditions.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::ObservationRow;

    /// Build a table from `(time_key, condition, amplitude)` triples.
    pub(crate) fn table_from(cells: &[(i64, usize, f64)], conditions: &[&str], sfreq: f64) -> ObservationTable {
        let rows = cells
            .iter()
            .enumerate()
            .map(|(i, &(key, condition, amplitude))| ObservationRow {
                epoch: i,
                condition,
                time_key: TimeKey(key),
                time: key as f64 / sfreq,
                channel: 0,
                amplitude,
            })
            .collect();
        ObservationTable {
            rows,
            conditions: conditions.iter().map(|s| s.to_string()).collect(),
            channels: vec!["Cz".to_string()],
            sfreq,
        }
    }

    #[test]
    fn cross_products_match_dense_design() {
        let table = table_from(
            &[(0, 0, 1.0), (0, 1, 2.0), (0, 1, 4.0), (1, 0, -1.0), (1, 1, 3.0)],
            &["a", "b"],
            100.0,
        );
        let data = ModelData::from_table(&table, &ModelSpec::default()).unwrap();

        assert_eq!(data.groups.len(), 2);
        assert_eq!(data.n_obs, 5);
        assert_eq!(data.groups[0].n_obs(), 3);

        // X = [1 0; 1 1; 1 1; 1 0; 1 1]
        assert_eq!(data.xtx, DMatrix::from_row_slice(2, 2, &[5.0, 3.0, 3.0, 3.0]));
        assert_eq!(data.xty, DVector::from_row_slice(&[9.0, 9.0]));
        assert_eq!(data.yty, 1.0 + 4.0 + 16.0 + 1.0 + 9.0);

        let g0 = &data.groups[0];
        assert_eq!(g0.ztz, DMatrix::from_row_slice(2, 2, &[3.0, 2.0, 2.0, 2.0]));
        assert_eq!(g0.zty, DVector::from_row_slice(&[7.0, 6.0]));
    }

    #[test]
    fn too_few_observations_is_a_config_error() {
        let table = table_from(&[(0, 0, 1.0), (0, 1, 2.0)], &["a", "b"], 100.0);
        let err = ModelData::from_table(&table, &ModelSpec::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn condition_without_observations_is_named_in_the_error() {
        let table = table_from(&[(0, 0, 1.0), (0, 0, 2.0), (1, 0, 0.5), (1, 0, 1.5)], &["a", "b"], 100.0);
        let err = ModelData::from_table(&table, &ModelSpec::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        assert!(err.message().contains("'b'"), "{}", err.message());
    }
}
