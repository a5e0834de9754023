//! Exit codes and structured error output.

use serde::Serialize;

/// Process exit codes.
///
/// - 0: every candidate ended in a clean record or a fresh cache hit
/// - 1: the run could not start or the cache could not be saved
/// - 3: the run finished but some files failed to analyze or hash
/// - 4: the cache was saved but the report could not be written
/// - 130: interrupted by Ctrl+C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Completed with per-file failures recorded in the cache.
    PartialSuccess = 3,
    /// Analysis results were persisted; only the report failed.
    ReportFailed = 4,
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "HR000",
            Self::GeneralError => "HR001",
            Self::PartialSuccess => "HR003",
            Self::ReportFailed => "HR004",
            Self::Interrupted => "HR130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "HR001")
    pub code: String,
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    pub interrupted: bool,
}

impl StructuredError {
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
