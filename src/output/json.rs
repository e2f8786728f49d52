//! JSON run summary for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "datalake": "/data/lake",
//!   "library": "/data/library",
//!   "output": "/out/missing_from_library_20240309_140507.csv",
//!   "duplicates_report": null,
//!   "exit_code": 0,
//!   "exit_code_name": "LD000",
//!   "datalake_files": 1200,
//!   "library_files": 800,
//!   "stage1_unique": 300,
//!   "...": "remaining AnalysisSummary fields"
//! }
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::comparison::AnalysisSummary;
use crate::error::ExitCode;

/// Summary of one `analyze` run.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Datalake root
    pub datalake: PathBuf,
    /// Library root
    pub library: PathBuf,
    /// Results CSV
    pub output: PathBuf,
    /// Duplicates report, when one was written
    pub duplicates_report: Option<PathBuf>,
    /// Exit code number
    pub exit_code: i32,
    /// Machine-readable exit code name (e.g., "LD000")
    pub exit_code_name: String,
    /// Pipeline counts and timings
    #[serde(flatten)]
    pub analysis: AnalysisSummary,
}

impl JsonSummary {
    /// Assemble a summary.
    #[must_use]
    pub fn new(
        datalake: &Path,
        library: &Path,
        output: &Path,
        duplicates_report: Option<&Path>,
        analysis: AnalysisSummary,
        exit_code: ExitCode,
    ) -> Self {
        Self {
            datalake: datalake.to_path_buf(),
            library: library.to_path_buf(),
            output: output.to_path_buf(),
            duplicates_report: duplicates_report.map(Path::to_path_buf),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
            analysis,
        }
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), JsonOutputError> {
        let json = self.to_json_pretty()?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write the summary to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_file(&self, path: &Path) -> Result<(), JsonOutputError> {
        let mut file = std::fs::File::create(path)?;
        self.write_to(&mut file)
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
