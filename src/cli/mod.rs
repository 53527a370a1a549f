//! Command-line parsing for the ERP mixed-model analysis.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code. Every analysis option can also be set
//! through an `ERP_*` environment variable (a `.env` file is loaded first).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{BootstrapMethod, Criterion, NewLevelPolicy, SingularPolicy};
use crate::models::RandomStructure;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "erp", version, about = "ERP mixed-effects analysis with bootstrap intervals")]
pub struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the analysis, print the report and write optional figures/exports.
    Report(AnalysisArgs),
    /// Run the analysis and browse the three views in the terminal.
    Tui(AnalysisArgs),
    /// Write a synthetic BrainVision recording with known condition amplitudes.
    Simulate(SimulateArgs),
}

/// Options shared by `report` and `tui`.
#[derive(Debug, Args, Clone)]
pub struct AnalysisArgs {
    /// BrainVision header (.vhdr).
    #[arg(env = "ERP_RECORDING", value_name = "VHDR")]
    pub recording: PathBuf,

    /// Event code to condition mapping, e.g. `--event 1=standard,2=deviant`.
    #[arg(
        short,
        long = "event",
        env = "ERP_EVENTS",
        value_name = "CODE=LABEL",
        value_parser = parse_event,
        value_delimiter = ',',
        required = true
    )]
    pub events: Vec<(u32, String)>,

    /// Read events from this channel instead of the marker file.
    #[arg(long, env = "ERP_TRIGGER_CHANNEL")]
    pub trigger_channel: Option<String>,

    /// Epoch start relative to the event (s).
    #[arg(long, env = "ERP_TMIN", default_value_t = -0.2, allow_hyphen_values = true)]
    pub tmin: f64,

    /// Epoch end relative to the event (s).
    #[arg(long, env = "ERP_TMAX", default_value_t = 0.5, allow_hyphen_values = true)]
    pub tmax: f64,

    /// Baseline window start (s); defaults to the epoch start.
    #[arg(long, env = "ERP_BASELINE_START", allow_hyphen_values = true)]
    pub baseline_start: Option<f64>,

    /// Baseline window end (s).
    #[arg(long, env = "ERP_BASELINE_END", default_value_t = 0.0, allow_hyphen_values = true)]
    pub baseline_end: f64,

    /// Skip baseline correction.
    #[arg(long)]
    pub no_baseline: bool,

    /// Drop epochs whose peak-to-peak amplitude exceeds this (µV).
    #[arg(long, env = "ERP_REJECT")]
    pub reject: Option<f64>,

    /// Drop epochs whose peak-to-peak amplitude is below this (µV).
    #[arg(long, env = "ERP_FLAT")]
    pub flat: Option<f64>,

    /// Channels to analyze (default: all except the trigger channel).
    #[arg(long, env = "ERP_PICKS", value_delimiter = ',')]
    pub picks: Vec<String>,

    /// Random-effect structure by time offset.
    #[arg(long, env = "ERP_RANDOM", value_enum, default_value_t = RandomStructure::Full)]
    pub random: RandomStructure,

    /// Fitting criterion.
    #[arg(long, env = "ERP_CRITERION", value_enum, default_value_t = Criterion::Reml)]
    pub criterion: Criterion,

    /// What to do with a singular random-effect covariance.
    #[arg(long, env = "ERP_SINGULAR", value_enum, default_value_t = SingularPolicy::Error)]
    pub singular: SingularPolicy,

    /// Optimizer evaluation budget.
    #[arg(long, env = "ERP_MAX_EVALS", default_value_t = 2_000)]
    pub max_evals: usize,

    /// Prediction for time offsets not seen during fitting.
    #[arg(long, env = "ERP_NEW_LEVELS", value_enum, default_value_t = NewLevelPolicy::Error)]
    pub new_levels: NewLevelPolicy,

    /// Bootstrap method.
    #[arg(long, env = "ERP_METHOD", value_enum, default_value_t = BootstrapMethod::Simulation)]
    pub method: BootstrapMethod,

    /// Number of bootstrap simulations.
    #[arg(short = 'n', long, env = "ERP_N_SIMS", default_value_t = 1000)]
    pub n_sims: usize,

    /// Seed for the bootstrap draws.
    #[arg(long, env = "ERP_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Add residual noise to simulated predictions.
    #[arg(long, env = "ERP_INCLUDE_RESIDUAL")]
    pub include_residual: bool,

    /// Largest accepted number of simulations.
    #[arg(long, env = "ERP_BUDGET", default_value_t = 10_000)]
    pub budget: usize,

    /// Lower interval quantile.
    #[arg(long, env = "ERP_LOWER", default_value_t = 0.025)]
    pub lower: f64,

    /// Upper interval quantile.
    #[arg(long, env = "ERP_UPPER", default_value_t = 0.975)]
    pub upper: f64,

    /// Replicate curves drawn in the spaghetti view.
    #[arg(long, env = "ERP_SUBSAMPLE", default_value_t = 100)]
    pub subsample: usize,

    /// Seed for the spaghetti subsample.
    #[arg(long, env = "ERP_SUBSAMPLE_SEED", default_value_t = 43)]
    pub subsample_seed: u64,

    /// Write SVG figures into this directory.
    #[arg(long, env = "ERP_PLOT_DIR")]
    pub plot_dir: Option<PathBuf>,

    /// SVG width (px).
    #[arg(long, default_value_t = 1000)]
    pub plot_width: u32,

    /// SVG height (px).
    #[arg(long, default_value_t = 600)]
    pub plot_height: u32,

    /// Channel shown in the raw-trace view.
    #[arg(long, env = "ERP_PLOT_CHANNEL")]
    pub plot_channel: Option<String>,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export the observation table to CSV.
    #[arg(long, env = "ERP_EXPORT_TABLE")]
    pub export_table: Option<PathBuf>,

    /// Export predictions and intervals to CSV.
    #[arg(long, env = "ERP_EXPORT_PREDICTIONS")]
    pub export_predictions: Option<PathBuf>,

    /// Export a JSON run summary.
    #[arg(long, env = "ERP_EXPORT_SUMMARY")]
    pub export_summary: Option<PathBuf>,
}

/// Options for the synthetic recording generator.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output header path (.vhdr); the .vmrk and .eeg files are written next to it.
    #[arg(short, long, value_name = "VHDR")]
    pub out: PathBuf,

    /// Condition amplitudes, e.g. `--condition 1=2.0,2=5.0` (µV).
    #[arg(
        long = "condition",
        value_name = "CODE=UV",
        value_parser = parse_amplitude,
        value_delimiter = ',',
        default_values = ["1=2.0", "2=5.0"]
    )]
    pub conditions: Vec<(u32, f64)>,

    /// Data channel names.
    #[arg(long, value_delimiter = ',', default_value = "Cz")]
    pub channels: Vec<String>,

    /// Trials per condition.
    #[arg(long, default_value_t = 40)]
    pub trials: usize,

    /// Sampling rate (Hz).
    #[arg(long, default_value_t = 250.0)]
    pub sfreq: f64,

    /// Inter-stimulus interval (s).
    #[arg(long, default_value_t = 1.0)]
    pub isi: f64,

    /// Gaussian noise SD (µV).
    #[arg(long, default_value_t = 1.0)]
    pub noise_sd: f64,

    /// Seed for trial order and noise.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Name of the trigger channel.
    #[arg(long, default_value = "STI")]
    pub trigger_channel: String,

    /// Do not write a trigger channel (markers only).
    #[arg(long)]
    pub no_trigger: bool,
}

fn parse_event(s: &str) -> Result<(u32, String), String> {
    let (code, label) = split_pair(s)?;
    let code = code
        .parse::<u32>()
        .map_err(|e| format!("invalid event code '{code}': {e}"))?;
    if label.is_empty() {
        return Err(format!("missing condition label in '{s}'"));
    }
    Ok((code, label.to_string()))
}

fn parse_amplitude(s: &str) -> Result<(u32, f64), String> {
    let (code, value) = split_pair(s)?;
    let code = code
        .parse::<u32>()
        .map_err(|e| format!("invalid event code '{code}': {e}"))?;
    let value = value
        .parse::<f64>()
        .map_err(|e| format!("invalid amplitude '{value}': {e}"))?;
    Ok((code, value))
}

fn split_pair(s: &str) -> Result<(&str, &str), String> {
    s.split_once('=')
        .map(|(a, b)| (a.trim(), b.trim()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_report_arguments() {
        let cli = Cli::try_parse_from([
            "erp",
            "report",
            "rec.vhdr",
            "--event",
            "1=standard,2=deviant",
            "--tmin",
            "-0.1",
            "--random",
            "intercept",
            "-n",
            "50",
        ])
        .unwrap();
        let Command::Report(args) = cli.command else {
            panic!("expected report");
        };
        assert_eq!(args.events, vec![(1, "standard".to_string()), (2, "deviant".to_string())]);
        assert_eq!(args.tmin, -0.1);
        assert_eq!(args.random, RandomStructure::Intercept);
        assert_eq!(args.n_sims, 50);
        assert_eq!(args.singular, SingularPolicy::Error);
    }

    #[test]
    fn rejects_malformed_event() {
        assert!(parse_event("1").is_err());
        assert!(parse_event("x=a").is_err());
        assert!(parse_event("3=").is_err());
        assert_eq!(parse_amplitude(" 2 = 5.5 ").unwrap(), (2, 5.5));
    }

    #[test]
    fn simulate_defaults() {
        let cli = Cli::try_parse_from(["erp", "simulate", "--out", "sim.vhdr"]).unwrap();
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.conditions, vec![(1, 2.0), (2, 5.0)]);
        assert_eq!(args.channels, vec!["Cz".to_string()]);
    }
}
