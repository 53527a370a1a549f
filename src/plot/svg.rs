//! Plotters drawing of `ChartData`, with an SVG file writer.
//!
//! `draw_chart` is generic over the Plotters backend; the terminal viewer
//! reuses it with the Ratatui backend and a dark style.

use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::info;

use crate::error::AppError;
use crate::plot::views::{ChartData, ViewKind};

/// One color per condition; wraps around for more than eight.
const PALETTE: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(214, 39, 40),
    RGBColor(44, 160, 44),
    RGBColor(255, 127, 14),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(23, 190, 207),
];

pub fn palette(index: usize) -> RGBColor {
    PALETTE[index % PALETTE.len()]
}

#[derive(Debug, Clone, Copy)]
pub struct ChartStyle {
    pub foreground: RGBColor,
    pub font_size: u32,
    pub x_label_area: u32,
    pub y_label_area: u32,
    pub margin: u32,
    pub background_opacity: f64,
    pub ribbon_opacity: f64,
    pub legend: bool,
    pub caption: bool,
}

impl ChartStyle {
    /// Print-friendly style for SVG files.
    pub fn document() -> Self {
        Self {
            foreground: BLACK,
            font_size: 16,
            x_label_area: 40,
            y_label_area: 60,
            margin: 15,
            background_opacity: 0.15,
            ribbon_opacity: 0.25,
            legend: true,
            caption: true,
        }
    }
}

pub fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    data: &ChartData,
    style: &ChartStyle,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let [x0, x1] = data.x_bounds;
    let [y0, y1] = data.y_bounds;

    let mut builder = ChartBuilder::on(root);
    builder
        .margin(style.margin)
        .set_label_area_size(LabelAreaPosition::Left, style.y_label_area)
        .set_label_area_size(LabelAreaPosition::Bottom, style.x_label_area);
    if style.caption {
        builder.caption(&data.title, ("sans-serif", style.font_size + 4).into_font().color(&style.foreground));
    }
    let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc(data.x_label.as_str())
        .y_desc(data.y_label.as_str())
        .x_labels(6)
        .y_labels(6)
        .x_label_formatter(&|v| format!("{v:.2}"))
        .y_label_formatter(&|v| format!("{v:.1}"))
        .label_style(("sans-serif", style.font_size).into_font().color(&style.foreground))
        .axis_style(&style.foreground)
        .draw()?;

    for line in &data.background {
        let color = palette(line.color).mix(style.background_opacity);
        chart.draw_series(LineSeries::new(line.points.iter().copied(), &color))?;
    }

    for ribbon in &data.ribbons {
        let color = palette(ribbon.color).mix(style.ribbon_opacity);
        chart.draw_series(std::iter::once(Polygon::new(ribbon.outline(), color.filled())))?;
    }

    for line in &data.lines {
        let color = palette(line.color);
        let series = chart.draw_series(LineSeries::new(line.points.iter().copied(), color.stroke_width(2)))?;
        if let Some(label) = &line.label {
            series
                .label(label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }
    }

    if style.legend && data.lines.iter().any(|l| l.label.is_some()) {
        chart
            .configure_series_labels()
            .label_font(("sans-serif", style.font_size).into_font().color(&style.foreground))
            .border_style(&style.foreground)
            .draw()?;
    }

    Ok(())
}

/// Render one chart to an SVG file.
pub fn render_svg(path: &Path, data: &ChartData, width: u32, height: u32) -> Result<(), AppError> {
    let plot_err = |e: String| AppError::output(format!("Failed to render '{}': {e}", path.display()));

    let root = SVGBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| plot_err(e.to_string()))?;
    draw_chart(&root, data, &ChartStyle::document()).map_err(|e| plot_err(e.to_string()))?;
    root.present().map_err(|e| plot_err(e.to_string()))
}

/// Write every view into `dir` as `<stem>.svg`, creating the directory if needed.
pub fn write_views(dir: &Path, views: &[(ViewKind, ChartData)], width: u32, height: u32) -> Result<Vec<PathBuf>, AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::output(format!("Failed to create plot directory '{}': {e}", dir.display())))?;

    let mut written = Vec::with_capacity(views.len());
    for (kind, data) in views {
        let path = dir.join(format!("{}.svg", kind.file_stem()));
        render_svg(&path, data, width, height)?;
        written.push(path);
    }
    info!(count = written.len(), dir = %dir.display(), "wrote figures");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::views::{Polyline, Ribbon};

    fn chart() -> ChartData {
        ChartData {
            title: "test".to_string(),
            x_label: "time (s)".to_string(),
            y_label: "amplitude".to_string(),
            background: vec![Polyline {
                label: None,
                color: 1,
                points: vec![(0.0, 0.5), (1.0, 1.5)],
            }],
            ribbons: vec![Ribbon {
                color: 0,
                lower: vec![(0.0, -1.0), (1.0, 0.0)],
                upper: vec![(0.0, 1.0), (1.0, 2.0)],
            }],
            lines: vec![Polyline {
                label: Some("a".to_string()),
                color: 0,
                points: vec![(0.0, 0.0), (1.0, 1.0)],
            }],
            x_bounds: [0.0, 1.0],
            y_bounds: [-1.5, 2.5],
        }
    }

    #[test]
    fn svg_contains_ribbon_and_lines() {
        let dir = std::env::temp_dir().join(format!("erp_lmm_svg_{}", std::process::id()));
        let written = write_views(&dir, &[(ViewKind::Ribbons, chart())], 400, 300).unwrap();
        assert_eq!(written, vec![dir.join("ribbons.svg")]);

        let svg = std::fs::read_to_string(&written[0]).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("<polygon"));
        assert!(svg.contains("<polyline"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn palette_wraps() {
        assert_eq!(palette(0), palette(8));
    }
}
