//! Flat copy of analysis results into a target directory.
//!
//! # Overview
//!
//! Every row of a results CSV is copied to `<target>/<filename>`; the
//! directory structure of the datalake is not reproduced. When that name is
//! taken the [`ConflictPolicy`] decides what happens:
//! - `rename`: use `<stem>_<n><ext>` with the first free `n >= 1`
//! - `skip`: leave the existing file alone and count the row as skipped
//! - `overwrite`: replace the existing file
//!
//! After each copy the target is checked (it must exist, and must not be
//! empty when the source was not) and the source modification time is
//! carried over.
//!
//! # Example
//!
//! ```no_run
//! use lakediff::actions::copy::{ConflictPolicy, FileCopier};
//! use std::path::Path;
//!
//! let copier = FileCopier::new(Path::new("/import"))
//!     .with_conflict_policy(ConflictPolicy::Skip)
//!     .with_dry_run(true);
//! let stats = copier.copy_from_csv(Path::new("missing.csv")).unwrap();
//! println!("{}", stats.summary());
//! ```

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::output::{read_results, CsvOutputError, ResultRow};
use crate::progress::ProgressCallback;

/// What to do when the target name already exists.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Copy under the first free `<stem>_<n><ext>` name
    #[default]
    Rename,
    /// Keep the existing file and skip the row
    Skip,
    /// Replace the existing file
    Overwrite,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename => write!(f, "rename"),
            Self::Skip => write!(f, "skip"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Errors that stop a copy run before any file is processed.
#[derive(Debug, Error)]
pub enum CopyError {
    /// The target path exists and is not a directory.
    #[error("Cannot use {0} as target directory: it exists as a file")]
    TargetIsFile(PathBuf),

    /// The target directory could not be created.
    #[error("Failed to create target directory {path}: {source}")]
    CreateTarget {
        /// Directory being created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The results CSV could not be read.
    #[error(transparent)]
    Results(#[from] CsvOutputError),
}

/// Result of processing one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// File was copied.
    Copied {
        /// Source file
        source: PathBuf,
        /// Written file
        target: PathBuf,
    },
    /// Dry run: file would have been copied.
    WouldCopy {
        /// Source file
        source: PathBuf,
        /// Planned target
        target: PathBuf,
    },
    /// Target name was taken and the policy is `skip`.
    Skipped {
        /// Source file
        source: PathBuf,
        /// Existing file
        target: PathBuf,
    },
    /// Copy failed.
    Failed {
        /// Source file
        source: PathBuf,
        /// What went wrong
        message: String,
    },
}

/// Totals for a copy run.
#[derive(Debug, Clone, Default)]
pub struct CopyStats {
    /// Rows processed
    pub total: usize,
    /// Rows copied (or that would be copied on a dry run)
    pub copied: usize,
    /// Rows skipped because the target existed
    pub skipped: usize,
    /// Rows that failed
    pub failed: usize,
    /// Bytes copied
    pub bytes_copied: u64,
    /// Per-row outcomes in input order
    pub outcomes: Vec<CopyOutcome>,
}

impl CopyStats {
    /// Check if no row failed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Human-readable summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} file(s): {} copied, {} skipped, {} failed ({})",
            self.total,
            self.copied,
            self.skipped,
            self.failed,
            bytesize::ByteSize::b(self.bytes_copied)
        )
    }

    fn record(&mut self, outcome: CopyOutcome, bytes: u64) {
        self.total += 1;
        match &outcome {
            CopyOutcome::Copied { .. } | CopyOutcome::WouldCopy { .. } => {
                self.copied += 1;
                self.bytes_copied += bytes;
            }
            CopyOutcome::Skipped { .. } => self.skipped += 1,
            CopyOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Copies result rows flat into a target directory.
#[derive(Clone)]
pub struct FileCopier {
    target: PathBuf,
    source_root: Option<PathBuf>,
    conflict: ConflictPolicy,
    dry_run: bool,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl fmt::Debug for FileCopier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCopier")
            .field("target", &self.target)
            .field("source_root", &self.source_root)
            .field("conflict", &self.conflict)
            .field("dry_run", &self.dry_run)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl FileCopier {
    /// Copy into `target` with the default `rename` policy.
    #[must_use]
    pub fn new(target: &Path) -> Self {
        Self {
            target: target.to_path_buf(),
            source_root: None,
            conflict: ConflictPolicy::default(),
            dry_run: false,
            progress_callback: None,
        }
    }

    /// Resolve missing sources as `<root>/<relative_path>`.
    #[must_use]
    pub fn with_source_root(mut self, root: Option<PathBuf>) -> Self {
        self.source_root = root;
        self
    }

    /// Set the conflict policy.
    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict = policy;
        self
    }

    /// Report what would be copied without touching the filesystem.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Report per-file progress to `callback`.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Target directory.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Read `csv` and copy every row.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError`] if the CSV cannot be read or the target is
    /// unusable. Per-file failures are counted in the stats instead.
    pub fn copy_from_csv(&self, csv: &Path) -> Result<CopyStats, CopyError> {
        let rows = read_results(csv)?;
        log::info!("Loaded {} files from {}", rows.len(), csv.display());
        self.copy_all(&rows)
    }

    /// Copy every row in order.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError`] if the target exists as a file or cannot be created.
    pub fn copy_all(&self, rows: &[ResultRow]) -> Result<CopyStats, CopyError> {
        self.prepare_target()?;

        if let Some(ref cb) = self.progress_callback {
            cb.on_phase_start("copy", rows.len());
        }

        // Names handed out during this run; a dry run never creates them on disk.
        let mut claimed = HashSet::new();
        let mut stats = CopyStats::default();
        for (i, row) in rows.iter().enumerate() {
            if let Some(ref cb) = self.progress_callback {
                cb.on_progress(i + 1, &row.full_path);
            }
            let outcome = self.copy_one(row, &mut claimed);
            match &outcome {
                CopyOutcome::Failed { source, message } => {
                    log::warn!("Failed to copy {}: {}", source.display(), message);
                }
                CopyOutcome::Skipped { target, .. } => {
                    log::debug!("Target exists, skipping: {}", target.display());
                }
                CopyOutcome::WouldCopy { source, target } => {
                    log::info!("Would copy {} -> {}", source.display(), target.display());
                }
                CopyOutcome::Copied { target, .. } => {
                    log::debug!("Copied {}", target.display());
                }
            }
            if let Some(ref cb) = self.progress_callback {
                cb.on_item_completed(row.file_size);
            }
            stats.record(outcome, row.file_size);
        }

        if let Some(ref cb) = self.progress_callback {
            cb.on_phase_end("copy");
        }
        log::info!("Copy finished: {}", stats.summary());
        Ok(stats)
    }

    fn prepare_target(&self) -> Result<(), CopyError> {
        if self.target.exists() && !self.target.is_dir() {
            return Err(CopyError::TargetIsFile(self.target.clone()));
        }
        if !self.dry_run {
            fs::create_dir_all(&self.target).map_err(|source| CopyError::CreateTarget {
                path: self.target.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Locate the source of `row`, trying the source root when the recorded
    /// absolute path is gone.
    fn resolve_source(&self, row: &ResultRow) -> Option<PathBuf> {
        let recorded = PathBuf::from(&row.full_path);
        if !row.full_path.is_empty() && recorded.is_file() {
            return Some(recorded);
        }
        let root = self.source_root.as_ref()?;
        let candidate = root.join(&row.relative_path);
        if candidate.is_file() {
            log::debug!(
                "Resolved {} via source root as {}",
                row.full_path,
                candidate.display()
            );
            Some(candidate)
        } else {
            None
        }
    }

    fn copy_one(&self, row: &ResultRow, claimed: &mut HashSet<PathBuf>) -> CopyOutcome {
        let Some(source) = self.resolve_source(row) else {
            return CopyOutcome::Failed {
                source: PathBuf::from(&row.full_path),
                message: "Source file does not exist".to_string(),
            };
        };

        // Only the final component, so a hand-edited row cannot leave the target.
        let Some(name) = Path::new(&row.filename).file_name() else {
            return CopyOutcome::Failed {
                source,
                message: format!("Invalid file name: '{}'", row.filename),
            };
        };
        let mut target = self.target.join(name);
        if target.exists() || claimed.contains(&target) {
            match self.conflict {
                ConflictPolicy::Skip => return CopyOutcome::Skipped { source, target },
                ConflictPolicy::Rename => {
                    target = free_name(&target, |p| p.exists() || claimed.contains(p));
                }
                ConflictPolicy::Overwrite => {}
            }
        }
        claimed.insert(target.clone());

        if self.dry_run {
            return CopyOutcome::WouldCopy { source, target };
        }

        match copy_verified(&source, &target) {
            Ok(()) => CopyOutcome::Copied { source, target },
            Err(message) => CopyOutcome::Failed { source, message },
        }
    }
}

/// First `<stem>_<n><ext>` next to `path` (n >= 1) for which `taken` is false.
#[must_use]
pub fn free_name<F>(path: &Path, taken: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1usize;
    loop {
        let candidate = path.with_file_name(format!("{stem}_{n}{ext}"));
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn copy_verified(source: &Path, target: &Path) -> Result<(), String> {
    let source_meta = fs::metadata(source).map_err(|e| describe_io(source, &e))?;
    fs::copy(source, target).map_err(|e| describe_io(target, &e))?;

    let target_meta = fs::metadata(target)
        .map_err(|_| "Copy appeared to succeed but target file does not exist".to_string())?;
    if target_meta.len() == 0 && source_meta.len() > 0 {
        return Err("Copy appeared to succeed but target file is empty".to_string());
    }

    let mtime = FileTime::from_last_modification_time(&source_meta);
    if let Err(e) = filetime::set_file_mtime(target, mtime) {
        log::warn!(
            "Could not preserve modification time on {}: {}",
            target.display(),
            e
        );
    }
    Ok(())
}

fn describe_io(path: &Path, error: &io::Error) -> String {
    match error.kind() {
        io::ErrorKind::PermissionDenied => format!("Permission denied: {}", path.display()),
        io::ErrorKind::NotFound => format!("Not found: {}", path.display()),
        _ => format!("Filesystem error for {}: {}", path.display(), error),
    }
}
