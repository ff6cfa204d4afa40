//! Status reported to the monitoring host after each phase.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusCode {
    Success,
    PartialSuccess,
    /// The monitor itself failed (bad config, query errors).
    ErrorInternal,
    /// The environment failed (host unreachable, provider unavailable).
    ErrorInfrastructure,
}

impl StatusCode {
    pub fn is_error(self) -> bool {
        matches!(self, StatusCode::ErrorInternal | StatusCode::ErrorInfrastructure)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: Option<String>,
    /// Longer explanation, usually the diagnostics report.
    pub detail: Option<String>,
}

impl Status {
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success,
            message: None,
            detail: None,
        }
    }

    pub fn new(code: StatusCode, message: &str, detail: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.to_string()),
            detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.code)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}
