//! Backend-independent chart descriptions for the three result views.
//!
//! Each view is reduced to plain series (faint background lines, shaded
//! ribbons, bold mean lines) plus bounds. The SVG writer and the terminal
//! viewer both draw from these, so the two stay visually consistent.

use crate::domain::{Epochs, GridRow, IntervalSummary, Prediction};
use crate::predict::ReplicateSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Raw per-epoch traces of one channel under the mean predictions.
    Traces,
    /// Mean predictions with bootstrap interval ribbons.
    Ribbons,
    /// Subsampled bootstrap curves under the mean predictions.
    Spaghetti,
}

impl ViewKind {
    pub const ALL: [ViewKind; 3] = [ViewKind::Traces, ViewKind::Ribbons, ViewKind::Spaghetti];

    pub fn title(self) -> &'static str {
        match self {
            ViewKind::Traces => "Epochs and model predictions",
            ViewKind::Ribbons => "Predictions with compatibility intervals",
            ViewKind::Spaghetti => "Bootstrap prediction curves",
        }
    }

    pub fn file_stem(self) -> &'static str {
        match self {
            ViewKind::Traces => "traces",
            ViewKind::Ribbons => "ribbons",
            ViewKind::Spaghetti => "spaghetti",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub label: Option<String>,
    /// Palette index (one color per condition).
    pub color: usize,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ribbon {
    pub color: usize,
    pub lower: Vec<(f64, f64)>,
    pub upper: Vec<(f64, f64)>,
}

impl Ribbon {
    /// Closed outline: lower edge left to right, upper edge back.
    pub fn outline(&self) -> Vec<(f64, f64)> {
        self.lower.iter().chain(self.upper.iter().rev()).copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Drawn first at low opacity.
    pub background: Vec<Polyline>,
    pub ribbons: Vec<Ribbon>,
    /// Drawn last, labeled in the legend.
    pub lines: Vec<Polyline>,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
}

impl ChartData {
    fn new(kind: ViewKind, subtitle: Option<&str>) -> Self {
        let title = match subtitle {
            Some(s) => format!("{} ({s})", kind.title()),
            None => kind.title().to_string(),
        };
        Self {
            title,
            x_label: "time (s)".to_string(),
            y_label: "amplitude (µV)".to_string(),
            background: Vec::new(),
            ribbons: Vec::new(),
            lines: Vec::new(),
            x_bounds: [0.0, 1.0],
            y_bounds: [0.0, 1.0],
        }
    }

    fn finish(mut self) -> Self {
        let mut x = (f64::INFINITY, f64::NEG_INFINITY);
        let mut y = (f64::INFINITY, f64::NEG_INFINITY);
        let points = self
            .background
            .iter()
            .chain(&self.lines)
            .flat_map(|l| l.points.iter())
            .chain(self.ribbons.iter().flat_map(|r| r.lower.iter().chain(&r.upper)));
        for &(px, py) in points {
            if px.is_finite() && py.is_finite() {
                x = (x.0.min(px), x.1.max(px));
                y = (y.0.min(py), y.1.max(py));
            }
        }
        if x.0.is_finite() && x.1 > x.0 {
            self.x_bounds = [x.0, x.1];
        }
        if y.0.is_finite() && y.1 >= y.0 {
            let pad = ((y.1 - y.0) * 0.05).max(1e-6);
            self.y_bounds = [y.0 - pad, y.1 + pad];
        }
        self
    }
}

/// View (a): every epoch of `channel` with the per-condition predictions.
pub fn traces_view(epochs: &Epochs, channel: usize, predictions: &[Prediction], conditions: &[String]) -> ChartData {
    let name = epochs.channels.get(channel).map(String::as_str);
    let mut chart = ChartData::new(ViewKind::Traces, name);
    for epoch in &epochs.epochs {
        if let Some(trace) = epoch.data.get(channel) {
            chart.background.push(Polyline {
                label: None,
                color: epoch.condition,
                points: epochs.times.iter().copied().zip(trace.iter().copied()).collect(),
            });
        }
    }
    chart.lines = mean_lines(predictions, conditions);
    chart.finish()
}

/// View (b): interval ribbons under the mean predictions.
pub fn ribbon_view(predictions: &[Prediction], intervals: &[IntervalSummary], conditions: &[String]) -> ChartData {
    let mut chart = ChartData::new(ViewKind::Ribbons, None);
    for c in 0..conditions.len() {
        let mut rows: Vec<&IntervalSummary> = intervals.iter().filter(|s| s.condition == c).collect();
        rows.sort_by(|a, b| a.time.total_cmp(&b.time));
        if rows.is_empty() {
            continue;
        }
        chart.ribbons.push(Ribbon {
            color: c,
            lower: rows.iter().map(|s| (s.time, s.lower)).collect(),
            upper: rows.iter().map(|s| (s.time, s.upper)).collect(),
        });
    }
    chart.lines = mean_lines(predictions, conditions);
    chart.finish()
}

/// View (c): the subsampled replicate curves under the mean predictions.
pub fn spaghetti_view(
    replicates: &ReplicateSet,
    subsample: &[usize],
    predictions: &[Prediction],
    conditions: &[String],
) -> ChartData {
    let mut chart = ChartData::new(ViewKind::Spaghetti, None);
    for &sim in subsample {
        let Some(curve) = replicates.curves.get(sim) else {
            continue;
        };
        for (c, points) in split_by_condition(&replicates.grid, curve, conditions.len()) {
            chart.background.push(Polyline {
                label: None,
                color: c,
                points,
            });
        }
    }
    chart.lines = mean_lines(predictions, conditions);
    chart.finish()
}

fn mean_lines(predictions: &[Prediction], conditions: &[String]) -> Vec<Polyline> {
    let grid: Vec<GridRow> = predictions.iter().map(|p| GridRow::new(p.condition, p.time)).collect();
    let values: Vec<f64> = predictions.iter().map(|p| p.fit).collect();
    split_by_condition(&grid, &values, conditions.len())
        .into_iter()
        .map(|(c, points)| Polyline {
            label: Some(conditions[c].clone()),
            color: c,
            points,
        })
        .collect()
}

/// Time-sorted `(time, value)` series per condition that has any rows.
fn split_by_condition(grid: &[GridRow], values: &[f64], n_conditions: usize) -> Vec<(usize, Vec<(f64, f64)>)> {
    let mut out: Vec<(usize, Vec<(f64, f64)>)> = (0..n_conditions).map(|c| (c, Vec::new())).collect();
    for (row, &v) in grid.iter().zip(values) {
        if let Some((_, points)) = out.get_mut(row.condition) {
            points.push((row.time, v));
        }
    }
    out.retain(|(_, p)| !p.is_empty());
    for (_, points) in &mut out {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn predictions() -> Vec<Prediction> {
        (0..6)
            .map(|i| Prediction {
                condition: i / 3,
                time: (2 - i % 3) as f64 * 0.1,
                fit: i as f64,
            })
            .collect()
    }

    #[test]
    fn mean_lines_are_sorted_by_time_per_condition() {
        let lines = mean_lines(&predictions(), &labels());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].label.as_deref(), Some("b"));
        assert_eq!(lines[0].points, vec![(0.0, 2.0), (0.1, 1.0), (0.2, 0.0)]);
    }

    #[test]
    fn spaghetti_draws_one_curve_per_condition_and_sample() {
        let preds = predictions();
        let grid: Vec<GridRow> = preds.iter().map(|p| GridRow::new(p.condition, p.time)).collect();
        let set = ReplicateSet {
            grid,
            curves: (0..10).map(|s| vec![s as f64; 6]).collect(),
        };
        let chart = spaghetti_view(&set, &[1, 4, 9], &preds, &labels());
        assert_eq!(chart.background.len(), 6);
        assert_eq!(chart.lines.len(), 2);
        assert!(chart.y_bounds[0] < 0.0 && chart.y_bounds[1] > 9.0);
        assert_eq!(chart.x_bounds, [0.0, 0.2]);
    }

    #[test]
    fn ribbon_outline_closes_the_band() {
        let preds = predictions();
        let intervals: Vec<IntervalSummary> = preds
            .iter()
            .map(|p| IntervalSummary {
                condition: p.condition,
                time: p.time,
                mean: p.fit,
                median: p.fit,
                lower: p.fit - 1.0,
                upper: p.fit + 1.0,
            })
            .collect();
        let chart = ribbon_view(&preds, &intervals, &labels());
        assert_eq!(chart.ribbons.len(), 2);
        let outline = chart.ribbons[0].outline();
        assert_eq!(outline.len(), 6);
        assert_eq!(outline[0], (0.0, 1.0));
        assert_eq!(outline[5], (0.0, 3.0));
    }
}
