//! Ratatui-based terminal viewer.
//!
//! Browses the three result views of a finished run: raw traces with the
//! model predictions, interval ribbons and the bootstrap spaghetti plot.
//! The spaghetti subsample can be redrawn and the current views exported as
//! SVG without rerunning the analysis.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Tabs},
};

use crate::app::pipeline::RunOutput;
use crate::error::AppError;
use crate::plot::{ChartData, ViewKind, palette};

mod plotters_chart;

use plotters_chart::ErpChart;

/// Export directory when the run has no `--plot-dir`.
const DEFAULT_EXPORT_DIR: &str = "figures";

/// Start the viewer over a finished run.
pub fn run(output: RunOutput) -> Result<(), AppError> {
    let mut app = App::new(output)?;

    let _guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| AppError::output(format!("Failed to initialize terminal: {e}")))?;

    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::output(format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::output(format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App {
    run: RunOutput,
    view: ViewKind,
    channel: usize,
    /// Cached chart for the current (view, channel, subsample).
    chart: ChartData,
    status: String,
}

impl App {
    fn new(run: RunOutput) -> Result<Self, AppError> {
        let channel = run.plot_channel()?;
        let view = ViewKind::Ribbons;
        let chart = run.view(view, channel);
        Ok(Self {
            run,
            view,
            channel,
            chart,
            status: "Ready.".to_string(),
        })
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::output(format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::output(format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::output(format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the viewer should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('1') => self.set_view(ViewKind::Traces),
            KeyCode::Char('2') => self.set_view(ViewKind::Ribbons),
            KeyCode::Char('3') => self.set_view(ViewKind::Spaghetti),
            KeyCode::Tab => self.set_view(next_view(self.view)),
            KeyCode::Right | KeyCode::Char('c') => self.step_channel(1),
            KeyCode::Left => self.step_channel(-1),
            KeyCode::Char('r') => {
                let seed = self.run.config.bootstrap.subsample_seed.wrapping_add(1);
                match self.run.reseed_subsample(seed) {
                    Ok(()) => {
                        self.refresh_chart();
                        self.status = format!("Subsample reseeded ({seed}).");
                    }
                    Err(err) => self.status = format!("Reseed failed: {err}"),
                }
            }
            KeyCode::Char('e') => {
                let dir = self
                    .run
                    .config
                    .output
                    .plot_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR));
                let out = &self.run.config.output;
                match crate::plot::write_views(&dir, &self.run.views(self.channel), out.plot_width, out.plot_height) {
                    Ok(paths) => self.status = format!("Wrote {} figures to {}", paths.len(), dir.display()),
                    Err(err) => self.status = format!("Export failed: {err}"),
                }
            }
            _ => {}
        }
        false
    }

    fn set_view(&mut self, view: ViewKind) {
        self.view = view;
        self.refresh_chart();
        self.status = format!("view: {}", view.title());
    }

    fn step_channel(&mut self, delta: isize) {
        let n = self.run.epochs.channels.len();
        if n == 0 {
            return;
        }
        self.channel = (self.channel as isize + delta).rem_euclid(n as isize) as usize;
        self.refresh_chart();
        self.status = format!("channel: {}", self.run.epochs.channels[self.channel]);
    }

    fn refresh_chart(&mut self) {
        self.chart = self.run.view(self.view, self.channel);
    }

    fn draw(&self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(5),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_tabs(frame, chunks[1]);
        self.draw_chart(frame, chunks[2]);
        self.draw_footer(frame, chunks[3]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let run = &self.run;
        let model = &run.model;
        let d = &model.diagnostics;

        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("erp", Style::default().fg(Color::Cyan)),
            Span::raw(format!(": {}", run.config.recording.display())),
        ]));
        lines.push(Line::from(Span::styled(
            format!(
                "{} | epochs={} dropped={} | channel: {}",
                model.spec.formula(),
                run.epochs.len(),
                run.epochs.drop_log.len(),
                run.epochs.channels.get(self.channel).map(String::as_str).unwrap_or("-"),
            ),
            Style::default().fg(Color::Gray),
        )));
        lines.push(Line::from(Span::styled(
            format!(
                "logLik={:.2} sigma={:.3} evals={}{} | sims={} shown={}",
                model.log_likelihood(),
                model.sigma,
                d.evals,
                if d.singular { " (singular)" } else { "" },
                run.replicates.n_sims(),
                run.subsample.len(),
            ),
            Style::default().fg(Color::Gray),
        )));

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_tabs(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let titles: Vec<String> = ViewKind::ALL
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{} {}", i + 1, v.file_stem()))
            .collect();
        let selected = ViewKind::ALL.iter().position(|v| *v == self.view).unwrap_or(0);
        let tabs = Tabs::new(titles)
            .select(selected)
            .block(Block::default().borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White).add_modifier(Modifier::BOLD));
        frame.render_widget(tabs, area);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut title = vec![Span::raw(format!(" {} ", self.chart.title))];
        for (c, label) in self.run.conditions().iter().enumerate() {
            let color = palette(c);
            title.push(Span::styled(
                format!("━ {label} "),
                Style::default().fg(Color::Rgb(color.0, color.1, color.2)),
            ));
        }

        let block = Block::default().title(Line::from(title)).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);
        frame.render_widget(ErpChart { data: &self.chart }, inner);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "1/2/3/Tab view  ←/→ channel  r reseed  e export svg  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

fn next_view(cur: ViewKind) -> ViewKind {
    match cur {
        ViewKind::Traces => ViewKind::Ribbons,
        ViewKind::Ribbons => ViewKind::Spaghetti,
        ViewKind::Spaghetti => ViewKind::Traces,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::run_analysis_with_recording;
    use crate::data::{SyntheticSpec, synthetic::generate};
    use crate::domain::{AnalysisConfig, ConditionMap, EventConfig, EventSource, SingularPolicy};
    use ratatui::backend::TestBackend;

    fn app() -> App {
        let synth = generate(&SyntheticSpec {
            trials_per_condition: 8,
            channels: vec!["Cz".to_string(), "Pz".to_string()],
            ..SyntheticSpec::default()
        })
        .unwrap();
        let conditions = ConditionMap::new(vec![(1, "low".to_string()), (2, "high".to_string())]).unwrap();
        let mut config = AnalysisConfig::new(
            "synthetic.vhdr",
            EventConfig {
                source: EventSource::TriggerChannel("STI".to_string()),
                conditions,
            },
        );
        config.epochs.tmin = 0.0;
        config.epochs.tmax = 0.1;
        config.epochs.baseline = None;
        config.fit.singular = SingularPolicy::Warn;
        config.bootstrap.n_sims = 50;
        config.bootstrap.subsample = 5;
        App::new(run_analysis_with_recording(&config, synth.recording).unwrap()).unwrap()
    }

    #[test]
    fn keys_switch_views_and_channels() {
        let mut app = app();
        assert_eq!(app.view, ViewKind::Ribbons);
        assert!(!app.handle_key(KeyCode::Char('1')));
        assert_eq!(app.view, ViewKind::Traces);
        assert_eq!(app.chart.background.len(), 16);

        app.handle_key(KeyCode::Tab);
        assert_eq!(app.view, ViewKind::Ribbons);

        app.handle_key(KeyCode::Left);
        assert_eq!(app.channel, 1);
        app.handle_key(KeyCode::Right);
        assert_eq!(app.channel, 0);

        assert!(app.handle_key(KeyCode::Char('q')));
    }

    #[test]
    fn reseed_redraws_spaghetti() {
        let mut app = app();
        app.handle_key(KeyCode::Char('3'));
        let before = app.run.subsample.clone();
        app.handle_key(KeyCode::Char('r'));
        assert_ne!(app.run.subsample, before);
        assert_eq!(app.chart.background.len(), 5 * 2);
    }

    #[test]
    fn draws_into_test_backend() {
        let app = app();
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|f| app.draw(f)).unwrap();
        let text: String = terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("ribbons"));
        assert!(text.contains("low"));
    }
}
