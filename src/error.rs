use thiserror::Error;

/// Failures raised by the core pipeline stages.
///
/// Every variant is raised at the stage that detects it and is never retried
/// internally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UqError {
    /// Invalid experiment descriptor or analysis option.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The results table could not be parsed or lacks a requested column.
    #[error("malformed table (line {line}): {reason}")]
    MalformedTable { line: usize, reason: String },
    /// A statistic was requested on an empty or degenerate sample.
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    /// A run count does not match the design's expansion formula.
    #[error("{context} run count mismatch: expected {expected}, got {got}")]
    Expansion {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    /// Recurrence interval requested for an exceedance count of zero.
    #[error("recurrence interval is undefined for an exceedance count of zero (duration {duration})")]
    UndefinedRecurrence { duration: f64 },
}

impl UqError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedTable {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        Self::InsufficientData(reason.into())
    }
}

pub(crate) fn ensure_len(
    context: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), UqError> {
    if expected == actual {
        return Ok(());
    }

    Err(UqError::Expansion {
        context,
        expected,
        got: actual,
    })
}
