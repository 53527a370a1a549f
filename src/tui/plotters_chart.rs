//! Plotters-powered chart widget for Ratatui.
//!
//! The widget draws a prepared `ChartData` with the same routine the SVG
//! writer uses, rendered into the Ratatui buffer through
//! `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

use crate::plot::{ChartData, ChartStyle, draw_chart};

pub struct ErpChart<'a> {
    pub data: &'a ChartData,
}

/// Terminal cells are low-res, so keep label areas compact and skip the
/// in-chart caption and legend (the surrounding block shows both).
fn terminal_style() -> ChartStyle {
    ChartStyle {
        foreground: WHITE,
        font_size: 10,
        x_label_area: 3,
        y_label_area: 6,
        margin: 1,
        background_opacity: 0.3,
        ribbon_opacity: 0.4,
        legend: false,
        caption: false,
    }
}

impl<'a> Widget for ErpChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // When the available area is too small, Plotters may fail to build a chart.
        // In that case, we render a small hint rather than panicking.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.data.x_bounds;
        let [y0, y1] = self.data.y_bounds;
        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let data = self.data;
        let widget = widget_fn(move |root| {
            draw_chart(&root, data, &terminal_style())?;
            Ok(())
        });

        widget.render(area, buf);
    }
}
