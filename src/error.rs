//! Error type shared by every pipeline stage.
//!
//! Each failure carries a kind (used by tests and callers to branch on the
//! failure class) and a process exit code for the `erp` binary.

/// Failure classes of the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid settings (window, thresholds, model spec, channel names).
    Config,
    /// Recording file missing, unreadable or malformed.
    Load,
    /// The event extractor produced no events.
    NoEventsFound,
    /// The fitter could not produce a stable solution.
    Convergence,
    /// Bootstrap request exceeds the simulation budget or is empty.
    Sampling,
    /// A prediction grid row refers to a time offset the model never saw.
    UnknownTimeOffset,
    /// Writing exports, figures or driving the terminal failed.
    Output,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Config | ErrorKind::Load => 2,
            ErrorKind::NoEventsFound => 3,
            ErrorKind::Convergence | ErrorKind::Sampling | ErrorKind::UnknownTimeOffset => 4,
            ErrorKind::Output => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Config => "config error",
            ErrorKind::Load => "load error",
            ErrorKind::NoEventsFound => "no events found",
            ErrorKind::Convergence => "convergence error",
            ErrorKind::Sampling => "sampling error",
            ErrorKind::UnknownTimeOffset => "unknown time offset",
            ErrorKind::Output => "output error",
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            exit_code: kind.exit_code(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Load, message)
    }

    pub fn convergence(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Convergence, message)
    }

    pub fn sampling(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Sampling, message)
    }

    pub fn output(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Output, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_kind() {
        assert_eq!(AppError::load("x").exit_code(), 2);
        assert_eq!(AppError::new(ErrorKind::NoEventsFound, "x").exit_code(), 3);
        assert_eq!(AppError::convergence("x").exit_code(), 4);
        assert_eq!(AppError::output("x").exit_code(), 5);
    }

    #[test]
    fn display_prefixes_kind() {
        let err = AppError::sampling("n_sims=0");
        assert_eq!(err.to_string(), "sampling error: n_sims=0");
    }
}
