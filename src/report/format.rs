//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{AnalysisConfig, Epochs, IntervalSummary, Prediction, Recording};
use crate::fit::FittedModel;
use crate::report::{PoolingRow, shrinkage_stats};

/// Recording, epoch counts and the fitted model.
pub fn format_run_summary(config: &AnalysisConfig, recording: &Recording, epochs: &Epochs, model: &FittedModel) -> String {
    let mut out = String::new();

    out.push_str("=== erp - ERP mixed-effects analysis ===\n");
    out.push_str(&format!("Recording: {}\n", config.recording.display()));
    if let Some(date) = recording.meas_date {
        out.push_str(&format!("Measured: {}\n", date.format("%Y-%m-%d %H:%M:%S")));
    }
    out.push_str(&format!(
        "Data: {} channels @ {:.1} Hz, {:.1} s\n",
        recording.n_channels(),
        recording.sfreq,
        recording.duration_secs()
    ));
    out.push_str(&format!(
        "Epochs: [{:.3}, {:.3}] s on {} | kept={} matched={} out-of-bounds={} rejected={}\n",
        config.epochs.tmin,
        config.epochs.tmax,
        epochs.channels.join(","),
        epochs.len(),
        epochs.n_matched(),
        epochs.n_out_of_bounds(),
        epochs.drop_log.len() - epochs.n_out_of_bounds(),
    ));
    for (i, label) in epochs.conditions.iter().enumerate() {
        out.push_str(&format!("  {label:<16} {:>5} epochs\n", epochs.count_for_condition(i)));
    }

    let d = &model.diagnostics;
    out.push_str(&format!("\nModel: {}\n", model.spec.formula()));
    out.push_str(&format!(
        "Fit: {:?} criterion={:.3} logLik={:.3} evals={} n={} levels={}{}\n",
        d.criterion,
        d.objective,
        model.log_likelihood(),
        d.evals,
        d.n_obs,
        d.n_groups,
        if d.singular { " (singular)" } else { "" }
    ));

    out.push_str("\nFixed effects:\n");
    out.push_str(&format!("{:<24} {:>12} {:>12} {:>10}\n", "term", "estimate", "std.error", "t"));
    out.push_str(&format!("{:-<24} {:-<12} {:-<12} {:-<10}\n", "", "", "", ""));
    for f in &model.fixed {
        out.push_str(&format!(
            "{:<24} {:>12.4} {:>12.4} {:>10.2}\n",
            truncate(&f.name, 24),
            f.estimate,
            f.std_error,
            f.t_value
        ));
    }

    out.push_str("\nRandom effects (group: time):\n");
    let sd = model.random_sd();
    for (i, name) in model.random_names.iter().enumerate() {
        let corr: Vec<String> = (0..i).map(|j| fmt_corr(model.random_corr(i, j))).collect();
        out.push_str(&format!(
            "  {:<22} sd={:>10.4} {}\n",
            truncate(name, 22),
            sd[i],
            if corr.is_empty() { String::new() } else { format!("corr={}", corr.join(" ")) }
        ));
    }
    out.push_str(&format!("  {:<22} sd={:>10.4}\n", "Residual", model.sigma));

    out
}

/// The `max_rows` time points where pooling moved the contrast the most.
pub fn format_pooling(rows: &[PoolingRow], label: &str, max_rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("Condition effect '{label}' per time point (no pooling vs partial pooling):\n"));

    if let Some(stats) = shrinkage_stats(rows) {
        out.push_str(&format!(
            "  sd across time: unpooled={:.4} pooled={:.4} ratio={:.3}\n",
            stats.unpooled_sd,
            stats.pooled_sd,
            stats.ratio()
        ));
    }

    let mut ranked: Vec<&PoolingRow> = rows.iter().filter(|r| r.unpooled.is_some()).collect();
    ranked.sort_by(|a, b| shift(b).total_cmp(&shift(a)));
    ranked.truncate(max_rows);
    ranked.sort_by(|a, b| a.time.total_cmp(&b.time));

    out.push_str(&format!("{:>10} {:>12} {:>12} {:>10}\n", "time_s", "unpooled", "pooled", "shift"));
    out.push_str(&format!("{:->10} {:->12} {:->12} {:->10}\n", "", "", "", ""));
    for r in ranked {
        out.push_str(&format!(
            "{:>10.3} {:>12.4} {:>12.4} {:>10.4}\n",
            r.time,
            r.unpooled.unwrap_or(f64::NAN),
            r.pooled,
            r.pooled - r.unpooled.unwrap_or(f64::NAN)
        ));
    }
    out
}

/// Predictions and intervals at every `step`-th time point.
pub fn format_intervals(predictions: &[Prediction], intervals: &[IntervalSummary], conditions: &[String], step: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<16} {:>9} {:>10} {:>10} {:>10} {:>10}\n",
        "condition", "time_s", "fit", "mean", "lower", "upper"
    ));
    out.push_str(&format!("{:-<16} {:->9} {:->10} {:->10} {:->10} {:->10}\n", "", "", "", "", "", ""));

    let step = step.max(1);
    let mut last_condition = None;
    let mut seen = 0usize;
    for (p, s) in predictions.iter().zip(intervals) {
        if last_condition != Some(p.condition) {
            last_condition = Some(p.condition);
            seen = 0;
        }
        if seen % step == 0 {
            out.push_str(&format!(
                "{:<16} {:>9.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3}\n",
                truncate(&conditions[p.condition], 16),
                p.time,
                p.fit,
                s.mean,
                s.lower,
                s.upper
            ));
        }
        seen += 1;
    }
    out
}

fn shift(r: &PoolingRow) -> f64 {
    r.unpooled.map_or(0.0, |u| (r.pooled - u).abs())
}

fn fmt_corr(v: f64) -> String {
    if v.is_finite() { format!("{v:+.2}") } else { "n/a".to_string() }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooling_table_keeps_largest_shifts_in_time_order() {
        let rows = vec![
            PoolingRow { time: 0.0, unpooled: Some(1.0), pooled: 1.1 },
            PoolingRow { time: 0.1, unpooled: Some(5.0), pooled: 3.0 },
            PoolingRow { time: 0.2, unpooled: Some(0.0), pooled: 1.0 },
            PoolingRow { time: 0.3, unpooled: None, pooled: 2.0 },
        ];
        let text = format_pooling(&rows, "vis", 2);
        let body: Vec<&str> = text.lines().skip(4).collect();
        assert_eq!(body.len(), 2);
        assert!(body[0].trim_start().starts_with("0.100"));
        assert!(body[1].trim_start().starts_with("0.200"));
    }

    #[test]
    fn interval_table_thins_by_step() {
        let preds: Vec<Prediction> = (0..6)
            .map(|i| Prediction { condition: i / 3, time: (i % 3) as f64 * 0.01, fit: 1.0 })
            .collect();
        let ints: Vec<IntervalSummary> = preds
            .iter()
            .map(|p| IntervalSummary {
                condition: p.condition,
                time: p.time,
                mean: 1.0,
                median: 1.0,
                lower: 0.5,
                upper: 1.5,
            })
            .collect();
        let text = format_intervals(&preds, &ints, &["a".to_string(), "b".to_string()], 2);
        // Header + rule + times 0.00 and 0.02 for each condition.
        assert_eq!(text.lines().count(), 2 + 4);
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("conditionvisual", 8), "conditi.");
        assert_eq!(truncate("short", 8), "short");
    }
}
