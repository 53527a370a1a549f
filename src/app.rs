//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - runs the analysis pipeline
//! - prints reports/plots
//! - writes optional figures and exports

use std::path::Path;

use clap::Parser;
use tracing::info;

use crate::cli::{AnalysisArgs, Command, SimulateArgs};
use crate::data::{SyntheticRecording, SyntheticSpec};
use crate::domain::{
    AnalysisConfig, BaselineWindow, BootstrapConfig, ConditionMap, EpochConfig, EventConfig, EventSource, FitOptions,
    OutputConfig, PredictConfig,
};
use crate::error::AppError;
use crate::logging::LogTarget;
use crate::models::ModelSpec;

pub mod pipeline;

/// Entry point for the `erp` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env file is fine; a broken one is not silently ignored.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(AppError::config(format!("Failed to load .env: {e}")));
        }
    }

    // We want `erp rec.vhdr ...` to behave like `erp report rec.vhdr ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Report(args) => {
            crate::logging::init(LogTarget::Report, cli.verbose);
            handle_report(&args)
        }
        Command::Tui(args) => {
            crate::logging::init(LogTarget::Tui, cli.verbose);
            handle_tui(&args)
        }
        Command::Simulate(args) => {
            crate::logging::init(LogTarget::Report, cli.verbose);
            handle_simulate(&args)
        }
    }
}

fn handle_report(args: &AnalysisArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(args)?;
    let run = pipeline::run_analysis(&config)?;
    let conditions = run.conditions();

    println!(
        "{}",
        crate::report::format_run_summary(&config, &run.recording, &run.epochs, &run.model)
    );

    for c in 1..conditions.len() {
        let rows = crate::report::pooling_comparison(&run.model, &run.unpooled, c);
        println!("{}", crate::report::format_pooling(&rows, &conditions[c], 10));
    }

    // Roughly a dozen rows per condition.
    let step = run.model.levels.len().div_ceil(12);
    println!(
        "{}",
        crate::report::format_intervals(&run.predictions, &run.intervals, conditions, step)
    );

    if config.output.ascii {
        let plot = crate::plot::render_ribbon_plot(
            &run.predictions,
            &run.intervals,
            conditions,
            config.output.ascii_width,
            config.output.ascii_height,
        );
        println!("{plot}");
    }

    // Optional figures and exports.
    if let Some(dir) = &config.output.plot_dir {
        let views = run.views(run.plot_channel()?);
        let written =
            crate::plot::write_views(dir, &views, config.output.plot_width, config.output.plot_height)?;
        for path in written {
            println!("Wrote {}", path.display());
        }
    }
    if let Some(path) = &config.output.export_table {
        crate::io::export::write_observations_csv(path, &run.table)?;
        info!(path = %path.display(), rows = run.table.len(), "exported observation table");
    }
    if let Some(path) = &config.output.export_predictions {
        crate::io::export::write_intervals_csv(path, &run.predictions, &run.intervals, conditions)?;
        info!(path = %path.display(), "exported predictions");
    }
    if let Some(path) = &config.output.export_summary {
        let summary = crate::io::summary::RunSummary::new(
            &config,
            &run.recording,
            &run.epochs,
            &run.model,
            chrono::Utc::now(),
        );
        crate::io::summary::write_summary_json(path, &summary)?;
        info!(path = %path.display(), "exported run summary");
    }

    Ok(())
}

fn handle_tui(args: &AnalysisArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(args)?;
    let run = pipeline::run_analysis(&config)?;
    crate::tui::run(run)
}

fn handle_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let spec = SyntheticSpec {
        sfreq: args.sfreq,
        channels: args.channels.clone(),
        conditions: args.conditions.clone(),
        trials_per_condition: args.trials,
        isi: args.isi,
        noise_sd: args.noise_sd,
        seed: args.seed,
        trigger_channel: (!args.no_trigger).then(|| args.trigger_channel.clone()),
        ..SyntheticSpec::default()
    };
    let mut synth = crate::data::synthetic::generate(&spec)?;
    synth.recording.meas_date = Some(chrono::Local::now().naive_local());

    crate::io::brainvision::write_recording(&args.out, &synth.recording)?;
    println!("{}", simulate_message(&args.out, &synth, &spec));
    Ok(())
}

/// What `simulate` wrote, plus a `report` command line that analyzes it.
///
/// The simulated responses are flat plateaus, so per-time intercepts and
/// slopes are collinear and the default `--singular error` rejects the fit.
fn simulate_message(out: &Path, synth: &SyntheticRecording, spec: &SyntheticSpec) -> String {
    let events = spec
        .conditions
        .iter()
        .map(|(code, _)| format!("{code}=c{code}"))
        .collect::<Vec<_>>()
        .join(",");
    let source = match &spec.trigger_channel {
        Some(name) => format!(" --trigger-channel {name}"),
        None => String::new(),
    };
    format!(
        "Wrote {} ({} events, {} channels, {:.1} s @ {} Hz)\n\
         Plateau responses give a singular random-effect fit; analyze with:\n  \
         erp report {} --event {events}{source} --singular warn",
        out.display(),
        synth.events.len(),
        synth.recording.n_channels(),
        synth.recording.duration_secs(),
        spec.sfreq,
        out.display(),
    )
}

pub fn analysis_config_from_args(args: &AnalysisArgs) -> Result<AnalysisConfig, AppError> {
    let conditions = ConditionMap::new(args.events.clone())?;
    let source = match &args.trigger_channel {
        Some(name) => EventSource::TriggerChannel(name.clone()),
        None => EventSource::Markers,
    };

    let config = AnalysisConfig {
        recording: args.recording.clone(),
        events: EventConfig { source, conditions },
        epochs: EpochConfig {
            tmin: args.tmin,
            tmax: args.tmax,
            baseline: (!args.no_baseline).then_some(BaselineWindow {
                start: args.baseline_start,
                end: Some(args.baseline_end),
            }),
            reject: args.reject,
            flat: args.flat,
            picks: args.picks.clone(),
        },
        model: ModelSpec::with_random(args.random),
        fit: FitOptions {
            criterion: args.criterion,
            singular: args.singular,
            max_evals: args.max_evals,
            ..FitOptions::default()
        },
        predict: PredictConfig {
            new_levels: args.new_levels,
        },
        bootstrap: BootstrapConfig {
            n_sims: args.n_sims,
            seed: args.seed,
            method: args.method,
            include_residual: args.include_residual,
            budget: args.budget,
            lower_quantile: args.lower,
            upper_quantile: args.upper,
            subsample: args.subsample,
            subsample_seed: args.subsample_seed,
        },
        output: OutputConfig {
            plot_dir: args.plot_dir.clone(),
            plot_width: args.plot_width,
            plot_height: args.plot_height,
            plot_channel: args.plot_channel.clone(),
            ascii: !args.no_plot,
            ascii_width: args.width,
            ascii_height: args.height,
            export_table: args.export_table.clone(),
            export_predictions: args.export_predictions.clone(),
            export_summary: args.export_summary.clone(),
        },
    };
    config.validate()?;
    Ok(config)
}

/// Rewrite argv so `erp` defaults to `erp report`.
///
/// Rules:
/// - `erp rec.vhdr ...`         -> `erp report rec.vhdr ...`
/// - `erp --help/--version/-h`  -> unchanged (show top-level help/version)
/// - `erp` / `erp -v ...`       -> unchanged (clap reports the missing subcommand)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        return argv;
    };

    let is_subcommand_or_help = matches!(
        arg1.as_str(),
        "report" | "tui" | "simulate" | "help" | "-h" | "--help" | "-V" | "--version"
    );
    if is_subcommand_or_help || arg1.starts_with('-') {
        return argv;
    }

    argv.insert(1, "report".to_string());
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::error::ErrorKind;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn report_args(extra: &[&str]) -> AnalysisArgs {
        let mut all = vec!["erp", "report", "rec.vhdr", "--event", "1=a,2=b"];
        all.extend_from_slice(extra);
        match Cli::try_parse_from(all).unwrap().command {
            Command::Report(args) => args,
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn bare_recording_defaults_to_report() {
        assert_eq!(
            rewrite_args(argv(&["erp", "rec.vhdr", "-e", "1=a"])),
            argv(&["erp", "report", "rec.vhdr", "-e", "1=a"])
        );
        assert_eq!(rewrite_args(argv(&["erp", "tui", "x"])), argv(&["erp", "tui", "x"]));
        assert_eq!(rewrite_args(argv(&["erp", "--help"])), argv(&["erp", "--help"]));
        assert_eq!(rewrite_args(argv(&["erp"])), argv(&["erp"]));
    }

    #[test]
    fn config_from_args_maps_every_section() {
        let config = analysis_config_from_args(&report_args(&[
            "--trigger-channel",
            "STI",
            "--no-baseline",
            "--picks",
            "Cz,Pz",
            "--singular",
            "warn",
            "--new-levels",
            "population",
            "--no-plot",
        ]))
        .unwrap();
        assert_eq!(config.events.source, EventSource::TriggerChannel("STI".to_string()));
        assert_eq!(config.events.conditions.labels(), vec!["a".to_string(), "b".to_string()]);
        assert!(config.epochs.baseline.is_none());
        assert_eq!(config.epochs.picks, vec!["Cz".to_string(), "Pz".to_string()]);
        assert_eq!(config.fit.singular, crate::domain::SingularPolicy::Warn);
        assert_eq!(config.predict.new_levels, crate::domain::NewLevelPolicy::Population);
        assert!(!config.output.ascii);
        assert_eq!(config.model, ModelSpec::default());
    }

    #[test]
    fn simulate_message_suggests_a_report_that_accepts_singular_fits() {
        let spec = SyntheticSpec {
            trials_per_condition: 2,
            ..SyntheticSpec::default()
        };
        let synth = crate::data::synthetic::generate(&spec).unwrap();
        let message = simulate_message(Path::new("sim.vhdr"), &synth, &spec);
        assert!(message.starts_with("Wrote sim.vhdr (4 events, "), "{message}");
        assert!(
            message.ends_with("erp report sim.vhdr --event 1=c1,2=c2 --trigger-channel STI --singular warn"),
            "{message}"
        );

        // The suggested command parses and selects the lenient policy.
        let argv = rewrite_args(argv(&[
            "erp", "sim.vhdr", "--event", "1=c1,2=c2", "--trigger-channel", "STI", "--singular", "warn",
        ]));
        let Command::Report(args) = Cli::try_parse_from(argv).unwrap().command else {
            panic!("expected report");
        };
        let config = analysis_config_from_args(&args).unwrap();
        assert_eq!(config.fit.singular, crate::domain::SingularPolicy::Warn);
    }

    #[test]
    fn invalid_window_is_config_error() {
        let err = analysis_config_from_args(&report_args(&["--tmin", "0.5", "--tmax", "0.1"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
