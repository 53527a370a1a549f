//! Tracing subscriber setup.
//!
//! Logs go to stderr so report output on stdout stays clean. `RUST_LOG`
//! overrides the default filter.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "erp_lmm=info";
const VERBOSE_FILTER: &str = "erp_lmm=debug";

/// Which front-end is about to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Report,
    /// Log lines would corrupt the alternate screen; only log on request.
    Tui,
}

/// Filter directive used when `RUST_LOG` is unset; `None` disables logging.
pub fn default_filter(target: LogTarget, verbose: bool) -> Option<&'static str> {
    match (target, verbose) {
        (LogTarget::Tui, _) => None,
        (LogTarget::Report, true) => Some(VERBOSE_FILTER),
        (LogTarget::Report, false) => Some(DEFAULT_FILTER),
    }
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(target: LogTarget, verbose: bool) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match default_filter(target, verbose) {
            Some(directive) => EnvFilter::new(directive),
            None => return,
        },
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tui_is_silent_by_default() {
        assert_eq!(default_filter(LogTarget::Tui, true), None);
        assert_eq!(default_filter(LogTarget::Report, false), Some("erp_lmm=info"));
        assert_eq!(default_filter(LogTarget::Report, true), Some("erp_lmm=debug"));
    }
}
