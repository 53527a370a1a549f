//! Shared analysis pipeline used by both the report and the TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load -> events -> epochs -> table -> fit -> predict -> bootstrap
//!
//! The report and the TUI can then focus on presentation (printing vs widgets).

use tracing::info;

use crate::data::{find_events, segment, tabulize};
use crate::domain::{
    AnalysisConfig, Epochs, Event, EventSource, GridRow, IntervalSummary, ObservationTable, Prediction, Recording,
};
use crate::error::{AppError, ErrorKind};
use crate::fit::{FittedModel, MixedModelFitter, ModelData, ProfiledFitter, UnpooledEstimate, fit_unpooled};
use crate::io::brainvision::read_recording;
use crate::plot::{ChartData, ViewKind, ribbon_view, spaghetti_view, traces_view};
use crate::predict::{ReplicateSet, bootstrap, predict, prediction_grid, subsample, summarize};

/// All computed outputs of a single analysis run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub config: AnalysisConfig,
    pub recording: Recording,
    pub events: Vec<Event>,
    pub epochs: Epochs,
    pub table: ObservationTable,
    pub data: ModelData,
    pub model: FittedModel,
    pub unpooled: Vec<UnpooledEstimate>,
    pub grid: Vec<GridRow>,
    pub predictions: Vec<Prediction>,
    pub replicates: ReplicateSet,
    pub intervals: Vec<IntervalSummary>,
    /// Replicate indices drawn in the spaghetti view.
    pub subsample: Vec<usize>,
}

/// Load the configured recording and run every stage.
pub fn run_analysis(config: &AnalysisConfig) -> Result<RunOutput, AppError> {
    config.validate()?;
    let recording = read_recording(&config.recording)?;
    run_analysis_with_recording(config, recording)
}

/// Run every stage on an already loaded recording.
///
/// This is useful for tests and for the TUI, which keeps the recording in
/// memory across reruns.
pub fn run_analysis_with_recording(config: &AnalysisConfig, recording: Recording) -> Result<RunOutput, AppError> {
    config.validate()?;

    // 1) Events and epochs.
    let events = find_events(&recording, &config.events.source)?;
    let trigger = match &config.events.source {
        EventSource::TriggerChannel(name) => Some(name.as_str()),
        EventSource::Markers => None,
    };
    let epochs = segment(&recording, &events, &config.events.conditions, &config.epochs, trigger)?;
    if epochs.is_empty() {
        return Err(AppError::new(
            ErrorKind::NoEventsFound,
            format!(
                "No epochs left: {} events, {} matched, {} dropped.",
                events.len(),
                epochs.n_matched(),
                epochs.drop_log.len()
            ),
        ));
    }

    // 2) Observation table and model fit.
    let table = tabulize(&epochs);
    let data = ModelData::from_table(&table, &config.model)?;
    let fitter = ProfiledFitter::new(config.fit.clone());
    let model = fitter.fit(&data)?;
    let unpooled = fit_unpooled(&data);

    // 3) Predictions and bootstrap intervals.
    let policy = config.predict.new_levels;
    let grid = prediction_grid(&model);
    let predictions = predict(&model, &grid, policy)?;
    let replicates = bootstrap(&model, &data, &fitter, &grid, &config.bootstrap, policy)?;
    let intervals = summarize(
        &replicates,
        config.bootstrap.lower_quantile,
        config.bootstrap.upper_quantile,
    );
    let subsample = subsample(
        replicates.n_sims(),
        config.bootstrap.subsample,
        config.bootstrap.subsample_seed,
    )?;

    info!(
        epochs = epochs.len(),
        rows = table.len(),
        grid = grid.len(),
        sims = replicates.n_sims(),
        "analysis complete"
    );

    Ok(RunOutput {
        config: config.clone(),
        recording,
        events,
        epochs,
        table,
        data,
        model,
        unpooled,
        grid,
        predictions,
        replicates,
        intervals,
        subsample,
    })
}

impl RunOutput {
    /// Condition labels in model order.
    pub fn conditions(&self) -> &[String] {
        &self.model.conditions
    }

    /// Index of the channel shown in the trace view.
    pub fn plot_channel(&self) -> Result<usize, AppError> {
        match &self.config.output.plot_channel {
            None => Ok(0),
            Some(name) => self.epochs.channels.iter().position(|c| c == name).ok_or_else(|| {
                AppError::config(format!(
                    "Plot channel '{name}' is not among the epoch channels ({}).",
                    self.epochs.channels.join(", ")
                ))
            }),
        }
    }

    pub fn view(&self, kind: ViewKind, channel: usize) -> ChartData {
        let conditions = self.conditions();
        match kind {
            ViewKind::Traces => traces_view(&self.epochs, channel, &self.predictions, conditions),
            ViewKind::Ribbons => ribbon_view(&self.predictions, &self.intervals, conditions),
            ViewKind::Spaghetti => spaghetti_view(&self.replicates, &self.subsample, &self.predictions, conditions),
        }
    }

    pub fn views(&self, channel: usize) -> Vec<(ViewKind, ChartData)> {
        ViewKind::ALL.iter().map(|&kind| (kind, self.view(kind, channel))).collect()
    }

    /// Redraw the spaghetti subsample with a new seed.
    pub fn reseed_subsample(&mut self, seed: u64) -> Result<(), AppError> {
        self.subsample = subsample(self.replicates.n_sims(), self.config.bootstrap.subsample, seed)?;
        self.config.bootstrap.subsample_seed = seed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SyntheticSpec, synthetic::generate};
    use crate::domain::{ConditionMap, EventConfig, SingularPolicy};

    fn config(source: EventSource) -> AnalysisConfig {
        let conditions = ConditionMap::new(vec![(1, "low".to_string()), (2, "high".to_string())]).unwrap();
        let mut config = AnalysisConfig::new("synthetic.vhdr", EventConfig { source, conditions });
        config.epochs.tmin = 0.0;
        config.epochs.tmax = 0.3;
        config.epochs.baseline = None;
        config.fit.singular = SingularPolicy::Warn;
        config.bootstrap.n_sims = 200;
        config.bootstrap.subsample = 20;
        config
    }

    #[test]
    fn recovers_condition_effect_end_to_end() {
        let synth = generate(&SyntheticSpec::default()).unwrap();
        let config = config(EventSource::TriggerChannel("STI".to_string()));
        let run = run_analysis_with_recording(&config, synth.recording).unwrap();

        assert_eq!(run.epochs.len(), 80);
        assert_eq!(run.epochs.channels, vec!["Cz".to_string()]);
        assert_eq!(run.events, synth.events);

        let effect = run.model.fixed.iter().find(|f| f.name == "conditionhigh").unwrap();
        assert!((effect.estimate - 3.0).abs() < 0.2, "estimate {}", effect.estimate);

        assert_eq!(run.grid.len(), 2 * run.epochs.keys.len());
        assert_eq!(run.intervals.len(), run.predictions.len());
        assert_eq!(run.replicates.n_sims(), 200);
        assert_eq!(run.subsample.len(), 20);

        let views = run.views(run.plot_channel().unwrap());
        assert_eq!(views.len(), 3);
        assert_eq!(views[0].1.background.len(), 80);
    }

    #[test]
    fn no_matching_codes_is_no_events_error() {
        let synth = generate(&SyntheticSpec::default()).unwrap();
        let mut config = config(EventSource::Markers);
        config.events.conditions = ConditionMap::new(vec![(9, "none".to_string())]).unwrap();
        let err = run_analysis_with_recording(&config, synth.recording).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoEventsFound);
    }

    #[test]
    fn mapped_code_without_events_names_the_condition() {
        let synth = generate(&SyntheticSpec::default()).unwrap();
        let mut config = config(EventSource::Markers);
        config.events.conditions =
            ConditionMap::new(vec![(1, "low".to_string()), (3, "missing".to_string())]).unwrap();
        let err = run_analysis_with_recording(&config, synth.recording).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.message().contains("'missing'"), "{}", err.message());
    }

    #[test]
    fn reseeding_changes_only_the_subsample() {
        let synth = generate(&SyntheticSpec {
            trials_per_condition: 10,
            ..SyntheticSpec::default()
        })
        .unwrap();
        let mut config = config(EventSource::Markers);
        config.epochs.picks = vec!["Cz".to_string()];
        let mut run = run_analysis_with_recording(&config, synth.recording).unwrap();

        let before = run.subsample.clone();
        let intervals = run.intervals.clone();
        run.reseed_subsample(999).unwrap();
        assert_ne!(run.subsample, before);
        assert_eq!(run.intervals, intervals);
        assert_eq!(run.config.bootstrap.subsample_seed, 999);
    }

    #[test]
    fn unknown_plot_channel_is_config_error() {
        let synth = generate(&SyntheticSpec {
            trials_per_condition: 10,
            ..SyntheticSpec::default()
        })
        .unwrap();
        let mut config = config(EventSource::TriggerChannel("STI".to_string()));
        config.output.plot_channel = Some("Pz".to_string());
        let run = run_analysis_with_recording(&config, synth.recording).unwrap();
        assert_eq!(run.plot_channel().unwrap_err().kind(), ErrorKind::Config);
    }
}
