//! CSV exports.
//!
//! Both files are long-format tables meant for spreadsheets or for
//! re-plotting in other tools.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{IntervalSummary, ObservationTable, Prediction};
use crate::error::AppError;

/// Write the observation table, one row per (epoch, channel, time point).
pub fn write_observations_csv(path: &Path, table: &ObservationTable) -> Result<(), AppError> {
    let mut file = create(path)?;
    let write_err = |e: std::io::Error| AppError::output(format!("Failed to write '{}': {e}", path.display()));

    writeln!(file, "epoch,condition,time_key,time_s,channel,amplitude_uv").map_err(write_err)?;
    for row in &table.rows {
        writeln!(
            file,
            "{},{},{},{:.6},{},{:.6}",
            row.epoch,
            table.conditions[row.condition],
            row.time_key.0,
            row.time,
            table.channels[row.channel],
            row.amplitude,
        )
        .map_err(write_err)?;
    }
    file.flush().map_err(write_err)
}

/// Write point predictions next to their bootstrap summaries.
///
/// `predictions` and `intervals` must describe the same grid in the same order.
pub fn write_intervals_csv(
    path: &Path,
    predictions: &[Prediction],
    intervals: &[IntervalSummary],
    conditions: &[String],
) -> Result<(), AppError> {
    if predictions.len() != intervals.len() {
        return Err(AppError::output(format!(
            "Prediction grid ({}) and interval grid ({}) differ in length.",
            predictions.len(),
            intervals.len()
        )));
    }
    let mut file = create(path)?;
    let write_err = |e: std::io::Error| AppError::output(format!("Failed to write '{}': {e}", path.display()));

    writeln!(file, "condition,time_s,fit,boot_mean,boot_median,lower,upper").map_err(write_err)?;
    for (p, s) in predictions.iter().zip(intervals) {
        writeln!(
            file,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            conditions[p.condition], p.time, p.fit, s.mean, s.median, s.lower, s.upper,
        )
        .map_err(write_err)?;
    }
    file.flush().map_err(write_err)
}

fn create(path: &Path) -> Result<BufWriter<File>, AppError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| AppError::output(format!("Failed to create '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ObservationRow, TimeKey};

    #[test]
    fn observation_csv_has_header_and_labels() {
        let table = ObservationTable {
            rows: vec![ObservationRow {
                epoch: 3,
                condition: 1,
                time_key: TimeKey(-5),
                time: -0.05,
                channel: 0,
                amplitude: 1.25,
            }],
            conditions: vec!["aud".to_string(), "vis".to_string()],
            channels: vec!["Cz".to_string()],
            sfreq: 100.0,
        };
        let path = std::env::temp_dir().join(format!("erp_lmm_obs_{}.csv", std::process::id()));
        write_observations_csv(&path, &table).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,condition,time_key,time_s,channel,amplitude_uv");
        assert_eq!(lines[1], "3,vis,-5,-0.050000,Cz,1.250000");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn mismatched_grids_are_rejected() {
        let path = std::env::temp_dir().join(format!("erp_lmm_int_{}.csv", std::process::id()));
        let pred = vec![Prediction {
            condition: 0,
            time: 0.0,
            fit: 1.0,
        }];
        let err = write_intervals_csv(&path, &pred, &[], &["a".to_string()]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Output);
    }
}
