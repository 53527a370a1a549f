//! JSON run summary.
//!
//! A self-contained record of one analysis: what was loaded, how many epochs
//! survived, the fitted model and the configuration that produced it. The
//! configuration is echoed verbatim so a run can be reproduced from its
//! summary alone.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::domain::{AnalysisConfig, Epochs, Recording};
use crate::error::AppError;
use crate::fit::{FitDiagnostics, FittedModel, FixedEffect};

#[derive(Debug, Clone, Serialize)]
pub struct ConditionCount {
    pub label: String,
    pub epochs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VarianceComponent {
    pub name: String,
    pub sd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tool: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub recording: String,
    pub meas_date: Option<NaiveDateTime>,
    pub sfreq: f64,
    pub channels: Vec<String>,
    pub formula: String,
    pub epochs_kept: usize,
    pub epochs_dropped: usize,
    pub epochs_out_of_bounds: usize,
    pub conditions: Vec<ConditionCount>,
    pub fixed_effects: Vec<FixedEffect>,
    pub random_effects: Vec<VarianceComponent>,
    /// Row-major correlation matrix of the random effects.
    pub random_correlation: Vec<Vec<f64>>,
    pub residual_sd: f64,
    pub log_likelihood: f64,
    pub diagnostics: FitDiagnostics,
    pub config: AnalysisConfig,
}

impl RunSummary {
    pub fn new(
        config: &AnalysisConfig,
        recording: &Recording,
        epochs: &Epochs,
        model: &FittedModel,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let sd = model.random_sd();
        let k = sd.len();
        let random_correlation = (0..k)
            .map(|i| {
                (0..k)
                    .map(|j| if i == j { 1.0 } else { model.random_corr(i, j) })
                    .collect()
            })
            .collect();

        Self {
            tool: "erp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at,
            recording: config.recording.display().to_string(),
            meas_date: recording.meas_date,
            sfreq: recording.sfreq,
            channels: epochs.channels.clone(),
            formula: model.spec.formula(),
            epochs_kept: epochs.len(),
            epochs_dropped: epochs.drop_log.len(),
            epochs_out_of_bounds: epochs.n_out_of_bounds(),
            conditions: epochs
                .conditions
                .iter()
                .enumerate()
                .map(|(i, label)| ConditionCount {
                    label: label.clone(),
                    epochs: epochs.count_for_condition(i),
                })
                .collect(),
            fixed_effects: model.fixed.clone(),
            random_effects: model
                .random_names
                .iter()
                .zip(sd)
                .map(|(name, sd)| VarianceComponent { name: name.clone(), sd })
                .collect(),
            random_correlation,
            residual_sd: model.sigma,
            log_likelihood: model.log_likelihood(),
            diagnostics: model.diagnostics.clone(),
            config: config.clone(),
        }
    }
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::output(format!("Failed to create summary JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), summary)
        .map_err(|e| AppError::output(format!("Failed to write summary JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticSpec, generate};
    use crate::data::{segment, tabulize};
    use crate::domain::{ConditionMap, EventConfig, EventSource, FitOptions, SingularPolicy};
    use crate::fit::{MixedModelFitter, ModelData, ProfiledFitter};
    use chrono::TimeZone;

    #[test]
    fn summary_json_echoes_config_and_model() {
        let synth = generate(&SyntheticSpec {
            trials_per_condition: 10,
            ..SyntheticSpec::default()
        })
        .unwrap();
        let conditions = ConditionMap::new(vec![(1, "low".to_string()), (2, "high".to_string())]).unwrap();
        let mut config = AnalysisConfig::new(
            "synthetic.vhdr",
            EventConfig {
                source: EventSource::Markers,
                conditions: conditions.clone(),
            },
        );
        config.epochs.tmin = 0.0;
        config.epochs.tmax = 0.1;
        config.epochs.baseline = None;
        config.fit.singular = SingularPolicy::Warn;

        let epochs = segment(&synth.recording, &synth.events, &conditions, &config.epochs, Some("STI")).unwrap();
        let table = tabulize(&epochs);
        let data = ModelData::from_table(&table, &config.model).unwrap();
        let model = ProfiledFitter::new(FitOptions {
            singular: SingularPolicy::Warn,
            ..FitOptions::default()
        })
        .fit(&data)
        .unwrap();

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let summary = RunSummary::new(&config, &synth.recording, &epochs, &model, at);
        let path = std::env::temp_dir().join(format!("erp_lmm_summary_{}.json", std::process::id()));
        write_summary_json(&path, &summary).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tool"], "erp");
        assert_eq!(value["epochs_kept"], 20);
        assert_eq!(value["conditions"][1]["label"], "high");
        assert_eq!(value["fixed_effects"][1]["name"], "conditionhigh");
        assert_eq!(value["config"]["epochs"]["tmax"], 0.1);
        assert_eq!(value["generated_at"], "2024-05-01T12:00:00Z");
        let _ = std::fs::remove_file(path);
    }
}
