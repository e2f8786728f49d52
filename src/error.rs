//! Structured error handling and exit codes.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Exit codes for lakediff.
///
/// - 0: Success (completed normally)
/// - 1: General error (unexpected failure)
/// - 2: Invalid input (bad path, target is a file, missing resume file)
/// - 3: Partial success (completed, but some files failed to copy)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed normally.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The command line named something unusable.
    InvalidInput = 2,
    /// Completed, but some items failed.
    PartialSuccess = 3,
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
            Self::Success => "LD000",
            Self::GeneralError => "LD001",
            Self::InvalidInput => "LD002",
            Self::PartialSuccess => "LD003",
        }
    }
}

/// Errors in user input detected before any work starts.
#[derive(Debug, Error)]
pub enum AppError {
    /// A directory argument does not exist or is not a directory.
    #[error("{role} directory is not usable: {path}")]
    InvalidDirectory {
        /// Which argument ("datalake", "library", ...)
        role: &'static str,
        /// Path given
        path: PathBuf,
    },

    /// A path that must become a directory exists as a file.
    #[error("{0} exists as a file, expected a directory")]
    TargetIsFile(PathBuf),

    /// The `--resume` file does not exist.
    #[error("Resume file not found: {0}")]
    ResumeFileMissing(PathBuf),

    /// The results CSV given to `copy` does not exist.
    #[error("Results file not found: {0}")]
    ResultsFileMissing(PathBuf),
}

impl AppError {
    /// Exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::InvalidInput
    }
}

/// Map an application error to the exit code it should produce.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(app) = err.downcast_ref::<AppError>() {
        return app.exit_code();
    }
    if let Some(crate::actions::CopyError::TargetIsFile(_)) =
        err.downcast_ref::<crate::actions::CopyError>()
    {
        return ExitCode::InvalidInput;
    }
    ExitCode::GeneralError
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "LD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
        }
    }
}
