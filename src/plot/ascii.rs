//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - interval band at each time point: `.`
//! - per-condition prediction lines: `*`, `+`, `x`, `o`, `#`

use crate::domain::{IntervalSummary, Prediction};

const SYMBOLS: [char; 5] = ['*', '+', 'x', 'o', '#'];
const BAND: char = '.';

/// Render predictions and their intervals for every condition on one grid.
pub fn render_ribbon_plot(
    predictions: &[Prediction],
    intervals: &[IntervalSummary],
    conditions: &[String],
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (t_min, t_max) = time_range(predictions).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = y_range(predictions, intervals).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Bands first so the lines overlay them.
    for s in intervals {
        if !(s.lower.is_finite() && s.upper.is_finite()) {
            continue;
        }
        let x = map_x(s.time, t_min, t_max, width);
        let top = map_y(s.upper, y_min, y_max, height);
        let bottom = map_y(s.lower, y_min, y_max, height);
        for row in grid.iter_mut().take(bottom.max(top) + 1).skip(top.min(bottom)) {
            row[x] = BAND;
        }
    }

    for c in 0..conditions.len() {
        let mut points: Vec<(f64, f64)> = predictions
            .iter()
            .filter(|p| p.condition == c && p.fit.is_finite())
            .map(|p| (p.time, p.fit))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        draw_curve(&mut grid, &points, SYMBOLS[c % SYMBOLS.len()], (t_min, t_max), (y_min, y_max));
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: time=[{t_min:.3}, {t_max:.3}] s | amplitude=[{y_min:.2}, {y_max:.2}] µV\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    let legend: Vec<String> = conditions
        .iter()
        .enumerate()
        .map(|(c, label)| format!("{} {label}", SYMBOLS[c % SYMBOLS.len()]))
        .chain(std::iter::once(format!("{BAND} interval")))
        .collect();
    out.push_str(&format!("Legend: {}\n", legend.join(" | ")));
    out
}

fn time_range(predictions: &[Prediction]) -> Option<(f64, f64)> {
    let mut min_t = f64::INFINITY;
    let mut max_t = f64::NEG_INFINITY;
    for p in predictions {
        min_t = min_t.min(p.time);
        max_t = max_t.max(p.time);
    }
    if min_t.is_finite() && max_t.is_finite() && max_t > min_t {
        Some((min_t, max_t))
    } else {
        None
    }
}

fn y_range(predictions: &[Prediction], intervals: &[IntervalSummary]) -> Option<(f64, f64)> {
    let values = predictions
        .iter()
        .map(|p| p.fit)
        .chain(intervals.iter().flat_map(|s| [s.lower, s.upper]))
        .filter(|v| v.is_finite());

    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for v in values {
        min_y = min_y.min(v);
        max_y = max_y.max(v);
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], ch: char, t: (f64, f64), y: (f64, f64)) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(time, value) in curve {
        let x = map_x(time, t.0, t.1, width);
        let yy = map_y(value, y.0, y.1, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, yy, ch),
            None => draw_line(grid, x, yy, x, yy, ch),
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham). Only blank or band cells are painted,
/// so earlier conditions stay visible where lines cross.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if let Some(cell) = grid
            .get_mut(y0 as usize)
            .and_then(|row| row.get_mut(x0 as usize))
            .filter(|cell| **cell == ' ' || **cell == BAND)
        {
            *cell = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(time: f64, fit: f64) -> IntervalSummary {
        IntervalSummary {
            condition: 0,
            time,
            mean: fit,
            median: fit,
            lower: fit - 1.0,
            upper: fit + 1.0,
        }
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let predictions = vec![
            Prediction { condition: 0, time: 0.0, fit: 0.0 },
            Prediction { condition: 0, time: 0.1, fit: 2.0 },
        ];
        let intervals = vec![summary(0.0, 0.0), summary(0.1, 2.0)];

        let txt = render_ribbon_plot(&predictions, &intervals, &["vis".to_string()], 10, 5);
        let expected = concat!(
            "Plot: time=[0.000, 0.100] s | amplitude=[-1.20, 3.20] µV\n",
            "         .\n",
            "       ***\n",
            ".  ****  .\n",
            "***       \n",
            ".         \n",
            "Legend: * vis | . interval\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn second_condition_does_not_overwrite_first() {
        let predictions = vec![
            Prediction { condition: 0, time: 0.0, fit: 1.0 },
            Prediction { condition: 0, time: 1.0, fit: 1.0 },
            Prediction { condition: 1, time: 0.0, fit: 1.0 },
            Prediction { condition: 1, time: 1.0, fit: 1.0 },
            Prediction { condition: 1, time: 0.5, fit: 3.0 },
        ];
        let txt = render_ribbon_plot(&predictions, &[], &["a".to_string(), "b".to_string()], 12, 6);
        assert!(txt.contains('*'));
        assert!(txt.contains('+'));
        assert!(!txt.lines().nth(1).unwrap().contains('*'));
    }
}
