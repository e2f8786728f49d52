//! CSV files written and read by the analyzer.
//!
//! # Results file columns
//!
//! - `relative_path`: path relative to the datalake root
//! - `filename`: final path component
//! - `file_size`: size in bytes
//! - `full_path`: absolute path (the resume key)
//! - `processed_at`: when the row was written (RFC 3339, UTC)
//!
//! # Duplicates report columns
//!
//! `duplicate_path`, `original_path`, `method`, `file_size`, `filename`
//!
//! # Example
//!
//! ```no_run
//! use lakediff::output::csv::UniqueCsvWriter;
//! use std::path::Path;
//!
//! let mut writer = UniqueCsvWriter::create(Path::new("missing.csv"), 100).unwrap();
//! // writer.write(&record)?; for each unique record
//! writer.finish().unwrap();
//! ```

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::comparison::{DedupMethod, DuplicatePair};
use crate::records::FileRecord;

/// Header of the results file.
pub const RESULT_COLUMNS: [&str; 5] = [
    "relative_path",
    "filename",
    "file_size",
    "full_path",
    "processed_at",
];

/// Errors that can occur while reading or writing CSV files.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error on the CSV file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One row of the results file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Path relative to the datalake root
    pub relative_path: String,
    /// Final path component
    pub filename: String,
    /// Size in bytes
    pub file_size: u64,
    /// Absolute path
    pub full_path: String,
    /// Write time (RFC 3339)
    pub processed_at: String,
}

impl ResultRow {
    /// Build a row for `record`, stamped with the current time.
    #[must_use]
    pub fn from_record(record: &FileRecord) -> Self {
        Self {
            relative_path: record.relative_path.to_string_lossy().into_owned(),
            filename: record.filename.clone(),
            file_size: record.size,
            full_path: record.path.to_string_lossy().into_owned(),
            processed_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DuplicateRow<'a> {
    duplicate_path: String,
    original_path: String,
    method: DedupMethod,
    file_size: u64,
    filename: &'a str,
}

/// Buffered writer for the results file.
///
/// Rows are held in memory and appended to disk every `batch_size` rows and
/// on [`finish`](Self::finish).
#[derive(Debug)]
pub struct UniqueCsvWriter {
    path: PathBuf,
    batch_size: usize,
    buffer: Vec<ResultRow>,
    rows_written: usize,
}

impl UniqueCsvWriter {
    /// Create (or truncate) `path` and write the header.
    ///
    /// # Errors
    ///
    /// Returns [`CsvOutputError`] if the file cannot be created.
    pub fn create(path: &Path, batch_size: usize) -> Result<Self, CsvOutputError> {
        let file = File::create(path).map_err(|source| CsvOutputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(RESULT_COLUMNS)?;
        writer.flush().map_err(|source| CsvOutputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::with_path(path, batch_size))
    }

    /// Append to `path`, keeping existing rows. The header is written only if
    /// the file is missing or empty.
    ///
    /// # Errors
    ///
    /// Returns [`CsvOutputError`] if the file cannot be created.
    pub fn append(path: &Path, batch_size: usize) -> Result<Self, CsvOutputError> {
        let has_content = std::fs::metadata(path).is_ok_and(|m| m.len() > 0);
        if has_content {
            log::debug!("Appending to existing results file {}", path.display());
            Ok(Self::with_path(path, batch_size))
        } else {
            Self::create(path, batch_size)
        }
    }

    fn with_path(path: &Path, batch_size: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            rows_written: 0,
        }
    }

    /// Path being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue one record, flushing if the batch is full.
    ///
    /// # Errors
    ///
    /// Returns [`CsvOutputError`] if a flush fails.
    pub fn write(&mut self, record: &FileRecord) -> Result<(), CsvOutputError> {
        self.buffer.push(ResultRow::from_record(record));
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Queue every record in order.
    ///
    /// # Errors
    ///
    /// Returns [`CsvOutputError`] if a flush fails.
    pub fn write_all<'r, I>(&mut self, records: I) -> Result<(), CsvOutputError>
    where
        I: IntoIterator<Item = &'r FileRecord>,
    {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// Append buffered rows to disk.
    ///
    /// # Errors
    ///
    /// Returns [`CsvOutputError`] if the file cannot be opened or written.
    pub fn flush(&mut self) -> Result<(), CsvOutputError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let io_err = |source| CsvOutputError::Io {
            path: self.path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(io_err)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in &self.buffer {
            writer.serialize(row)?;
        }
        writer.flush().map_err(io_err)?;

        log::trace!("Flushed {} rows to {}", self.buffer.len(), self.path.display());
        self.rows_written += self.buffer.len();
        self.buffer.clear();
        Ok(())
    }

    /// Flush and return the number of rows written by this writer.
    ///
    /// # Errors
    ///
    /// Returns [`CsvOutputError`] if the final flush fails.
    pub fn finish(mut self) -> Result<usize, CsvOutputError> {
        self.flush()?;
        Ok(self.rows_written)
    }
}

/// Read every well-formed row of a results file. Malformed rows are skipped
/// with a warning.
///
/// # Errors
///
/// Returns [`CsvOutputError`] if the file cannot be opened.
pub fn read_results(path: &Path) -> Result<Vec<ResultRow>, CsvOutputError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for (line, result) in reader.deserialize::<ResultRow>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => log::warn!(
                "Skipping invalid row {} in {}: {}",
                line + 2,
                path.display(),
                e
            ),
        }
    }
    Ok(rows)
}

/// Collect the `full_path` column of a results file into a set.
///
/// Only the `full_path` column is required, so files from older runs with
/// extra or missing columns still resume.
///
/// # Errors
///
/// Returns [`CsvOutputError`] if the file cannot be opened or has no
/// `full_path` column.
pub fn read_processed_paths(path: &Path) -> Result<HashSet<PathBuf>, CsvOutputError> {
    read_path_column(path, "full_path")
}

/// Collect the `duplicate_path` column of a duplicates report into a set.
///
/// Records dropped by an earlier run must stay dropped when it is resumed,
/// so these paths join the processed set alongside the results file's.
///
/// # Errors
///
/// Returns [`CsvOutputError`] if the file cannot be opened or has no
/// `duplicate_path` column.
pub fn read_duplicate_paths(path: &Path) -> Result<HashSet<PathBuf>, CsvOutputError> {
    read_path_column(path, "duplicate_path")
}

fn read_path_column(path: &Path, name: &str) -> Result<HashSet<PathBuf>, CsvOutputError> {
    let mut reader = csv::Reader::from_path(path)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| CsvOutputError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, format!("missing {name} column")),
        })?;

    let mut paths = HashSet::new();
    for result in reader.records() {
        match result {
            Ok(record) => match record.get(column) {
                Some(value) if !value.is_empty() => {
                    paths.insert(PathBuf::from(value));
                }
                _ => log::warn!("Skipping row without {} in {}", name, path.display()),
            },
            Err(e) => log::warn!("Skipping unreadable row in {}: {}", path.display(), e),
        }
    }
    Ok(paths)
}

/// Write the within-datalake duplicates report, replacing any existing file.
///
/// # Errors
///
/// Returns [`CsvOutputError`] if the file cannot be written.
pub fn write_duplicates_report(
    path: &Path,
    duplicates: &[DuplicatePair],
) -> Result<(), CsvOutputError> {
    write_duplicate_rows(path, duplicates, false)
}

/// Append to the duplicates report of an earlier run. The header is written
/// only if the file is missing or empty.
///
/// # Errors
///
/// Returns [`CsvOutputError`] if the file cannot be written.
pub fn append_duplicates_report(
    path: &Path,
    duplicates: &[DuplicatePair],
) -> Result<(), CsvOutputError> {
    write_duplicate_rows(path, duplicates, true)
}

fn write_duplicate_rows(
    path: &Path,
    duplicates: &[DuplicatePair],
    append: bool,
) -> Result<(), CsvOutputError> {
    let io_err = |source| CsvOutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    let has_content = append && std::fs::metadata(path).is_ok_and(|m| m.len() > 0);
    let file = if append {
        OpenOptions::new().append(true).create(true).open(path)
    } else {
        File::create(path)
    }
    .map_err(io_err)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(!has_content)
        .from_writer(file);
    for pair in duplicates {
        writer.serialize(DuplicateRow {
            duplicate_path: pair.duplicate.path.to_string_lossy().into_owned(),
            original_path: pair.original.path.to_string_lossy().into_owned(),
            method: pair.method,
            file_size: pair.duplicate.size,
            filename: &pair.duplicate.filename,
        })?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}
