//! Output files produced by an analysis run.
//!
//! This module provides:
//! - [`csv`]: the unique-files results CSV (batched, resumable), its reader,
//!   and the within-datalake duplicates report
//! - [`json`]: a machine-readable run summary
//!
//! It also decides where the results CSV goes (see [`resolve_output_path`]).

pub mod csv;
pub mod json;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

pub use self::csv::{
    append_duplicates_report, read_duplicate_paths, read_processed_paths, read_results,
    write_duplicates_report, CsvOutputError, ResultRow, UniqueCsvWriter,
};
pub use self::json::JsonSummary;

/// File-name prefix of generated results files.
pub const OUTPUT_PREFIX: &str = "missing_from_library";

/// `missing_from_library_YYYYMMDD_HHMMSS.csv` for `now`.
#[must_use]
pub fn timestamped_name(now: DateTime<Utc>) -> String {
    format!("{}_{}.csv", OUTPUT_PREFIX, now.format("%Y%m%d_%H%M%S"))
}

/// Work out the results CSV path, creating directories as needed.
///
/// - no request: timestamped file in `cwd`
/// - no extension, or an existing directory: timestamped file inside it
///   (an existing *file* without extension gets a `_dir` sibling instead)
/// - any other extension is replaced with `.csv`
///
/// # Errors
///
/// Returns an I/O error if a directory cannot be created.
pub fn resolve_output_path(
    requested: Option<&Path>,
    cwd: &Path,
    now: DateTime<Utc>,
) -> io::Result<PathBuf> {
    let Some(requested) = requested else {
        return Ok(cwd.join(timestamped_name(now)));
    };
    let path = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        cwd.join(requested)
    };

    if path.extension().is_none() {
        let mut dir = path;
        if dir.is_file() {
            let mut renamed = dir.into_os_string();
            renamed.push("_dir");
            let renamed = PathBuf::from(renamed);
            log::warn!(
                "Output path exists as a file, using directory {} instead",
                renamed.display()
            );
            dir = renamed;
        }
        fs::create_dir_all(&dir)?;
        return Ok(dir.join(timestamped_name(now)));
    }

    if path.is_dir() {
        return Ok(path.join(timestamped_name(now)));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let is_csv = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    Ok(if is_csv {
        path
    } else {
        path.with_extension("csv")
    })
}

/// `<dir>/<stem>_duplicates.csv` next to `results`.
#[must_use]
pub fn duplicates_report_path(results: &Path) -> PathBuf {
    let stem = results
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| OUTPUT_PREFIX.to_string());
    results.with_file_name(format!("{stem}_duplicates.csv"))
}
