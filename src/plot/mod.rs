//! Figures: ASCII plots for the terminal and SVG files.

pub mod ascii;
pub mod svg;
pub mod views;

pub use ascii::render_ribbon_plot;
pub use svg::{ChartStyle, draw_chart, palette, render_svg, write_views};
pub use views::{ChartData, Polyline, Ribbon, ViewKind, ribbon_view, spaghetti_view, traces_view};
