//! Per-file descriptor carried through the comparison pipeline.
//!
//! # Overview
//!
//! A [`FileRecord`] is created once by discovery and then owned by exactly one
//! [`FileIndex`](super::FileIndex). Its path metadata never changes; the two
//! digests are filled in at most once each as the pipeline escalates, and its
//! [`RecordStatus`] only ever moves forward.
//!
//! # Example
//!
//! ```
//! use lakediff::records::{FileRecord, RecordStatus};
//! use std::path::Path;
//!
//! let mut record = FileRecord::new(
//!     Path::new("/lake/books/novel.epub"),
//!     Path::new("/lake"),
//!     2048,
//! );
//! assert_eq!(record.filename, "novel.epub");
//! assert_eq!(record.extension, ".epub");
//!
//! assert!(record.advance(RecordStatus::SizeChecked));
//! assert!(!record.advance(RecordStatus::Pending)); // never regresses
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hashing::Digest;

/// Which backend computes (or will compute) the full hash of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMethod {
    /// Multi-threaded CPU hashing.
    #[default]
    Cpu,
    /// Accelerator-staged hashing for large files.
    Gpu,
}

impl fmt::Display for ProcessingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu => write!(f, "gpu"),
        }
    }
}

/// Last pipeline stage a record was evaluated through.
///
/// Variants are ordered so that `a < b` means `a` happens before `b`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Discovered, not yet compared.
    #[default]
    Pending,
    /// Visited by the size comparator.
    SizeChecked,
    /// Visited by the prefix-hash comparator.
    PrefixHashed,
    /// Visited by the full-hash comparator.
    FullHashed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::SizeChecked => "size_checked",
            Self::PrefixHashed => "prefix_hashed",
            Self::FullHashed => "full_hashed",
        };
        f.write_str(name)
    }
}

/// Errors raised when a record's write-once fields are misused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// The prefix digest was already assigned.
    #[error("prefix hash already assigned for {0}")]
    PrefixHashAlreadySet(PathBuf),

    /// The full digest was already assigned.
    #[error("full hash already assigned for {0}")]
    FullHashAlreadySet(PathBuf),
}

/// One discovered file plus its progressively computed digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path (record identity)
    pub path: PathBuf,
    /// Path relative to the root it was discovered under
    pub relative_path: PathBuf,
    /// Final path component
    pub filename: String,
    /// Lower-cased extension including the leading dot, or empty
    pub extension: String,
    /// File size in bytes (the Stage 1 "hash")
    pub size: u64,
    prefix_hash: Option<Digest>,
    full_hash: Option<Digest>,
    method: ProcessingMethod,
    status: RecordStatus,
}

impl FileRecord {
    /// Create a record for `path` discovered under `root`.
    ///
    /// The relative path falls back to the bare filename when `path` is not
    /// inside `root`.
    #[must_use]
    pub fn new(path: &Path, root: &Path, size: u64) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let relative_path = path
            .strip_prefix(root)
            .map_or_else(|_| PathBuf::from(&filename), Path::to_path_buf);

        Self::from_parts(path.to_path_buf(), relative_path, filename, size)
    }

    /// Create a record from already-split path metadata.
    #[must_use]
    pub fn from_parts(path: PathBuf, relative_path: PathBuf, filename: String, size: u64) -> Self {
        let extension = extension_of(&path);
        Self {
            path,
            relative_path,
            filename,
            extension,
            size,
            prefix_hash: None,
            full_hash: None,
            method: ProcessingMethod::Cpu,
            status: RecordStatus::Pending,
        }
    }

    /// Digest of the first 1024 bytes, if computed.
    #[must_use]
    pub fn prefix_hash(&self) -> Option<&Digest> {
        self.prefix_hash.as_ref()
    }

    /// Digest of the whole file, if computed.
    #[must_use]
    pub fn full_hash(&self) -> Option<&Digest> {
        self.full_hash.as_ref()
    }

    /// Backend assigned to compute this record's full hash.
    #[must_use]
    pub fn processing_method(&self) -> ProcessingMethod {
        self.method
    }

    /// Last stage this record passed through.
    #[must_use]
    pub fn status(&self) -> RecordStatus {
        self.status
    }

    /// Advance the status. Returns `false` (and changes nothing) when `to`
    /// would move the record backwards.
    pub fn advance(&mut self, to: RecordStatus) -> bool {
        if to < self.status {
            log::trace!(
                "Refusing status regression {} -> {} for {}",
                self.status,
                to,
                self.path.display()
            );
            return false;
        }
        self.status = to;
        true
    }

    pub(crate) fn set_prefix_hash(&mut self, digest: Digest) -> Result<(), RecordError> {
        if self.prefix_hash.is_some() {
            return Err(RecordError::PrefixHashAlreadySet(self.path.clone()));
        }
        self.prefix_hash = Some(digest);
        Ok(())
    }

    pub(crate) fn set_full_hash(&mut self, digest: Digest) -> Result<(), RecordError> {
        if self.full_hash.is_some() {
            return Err(RecordError::FullHashAlreadySet(self.path.clone()));
        }
        self.full_hash = Some(digest);
        Ok(())
    }

    pub(crate) fn set_processing_method(&mut self, method: ProcessingMethod) {
        self.method = method;
    }
}

/// Lower-cased extension with a leading dot (`"/a/B.EPUB"` -> `".epub"`).
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
