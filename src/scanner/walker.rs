//! Directory walker implementation using jwalk for parallel traversal.
//!
//! # Overview
//!
//! [`Walker`] turns one root directory into an ordered list of
//! [`FileRecord`]s. Children are sorted by name while reading each
//! directory, so two walks of an unchanged tree produce the same order.
//!
//! # Features
//!
//! - Parallel directory traversal using rayon thread pool
//! - Case-insensitive extension filter
//! - Gitignore-style pattern matching via the `ignore` crate
//! - Optional symlink following and hidden-file skipping
//! - Unreadable entries are logged and skipped, never fatal

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::{ScanError, WalkerConfig};
use crate::records::{extension_of, FileRecord};

/// Directory walker for parallel file discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk (canonical when it exists)
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// The root is canonicalized so every record carries an absolute path.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self { root, config }
    }

    /// Root being walked.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discover every matching file under the root.
    ///
    /// Errors on individual entries are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotFound`] or [`ScanError::NotADirectory`] if the
    /// root itself is unusable.
    pub fn walk(&self) -> Result<Vec<FileRecord>, ScanError> {
        if !self.root.exists() {
            return Err(ScanError::NotFound(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(ScanError::NotADirectory(self.root.clone()));
        }

        let mut skipped = 0usize;
        let records: Vec<FileRecord> = self
            .entries()
            .filter_map(|result| match result {
                Ok(record) => Some(record),
                Err(_) => {
                    skipped += 1;
                    None
                }
            })
            .collect();

        log::info!(
            "Found {} files in {}{}",
            records.len(),
            self.root.display(),
            if skipped > 0 {
                format!(" ({skipped} unreadable entries skipped)")
            } else {
                String::new()
            }
        );
        Ok(records)
    }

    /// Walk the tree lazily, yielding one result per matching file or
    /// per entry that could not be read.
    pub fn entries(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let gitignore = self.build_gitignore();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(move |_depth, _path, _read_dir_state, children| {
                // Sort children for deterministic output
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| match entry_result {
            Ok(entry) => {
                let path = entry.path();
                if path == self.root {
                    return None;
                }

                let file_type = entry.file_type();
                if file_type.is_dir() {
                    return None;
                }

                if self.should_ignore(&path, &gitignore) {
                    log::trace!("Ignoring file: {}", path.display());
                    return None;
                }

                if file_type.is_symlink() && !self.config.follow_symlinks {
                    log::trace!("Skipping symlink: {}", path.display());
                    return None;
                }

                let extension = extension_of(&path);
                if !self.config.accepts_extension(&extension) {
                    return None;
                }

                let metadata = if self.config.follow_symlinks {
                    std::fs::metadata(&path)
                } else {
                    std::fs::symlink_metadata(&path)
                };
                let metadata = match metadata {
                    Ok(m) => m,
                    Err(e) => return Some(Err(self.handle_io_error(&path, e))),
                };
                if !metadata.is_file() {
                    return None;
                }

                Some(Ok(FileRecord::new(&path, &self.root, metadata.len())))
            }
            Err(e) => {
                let path = e
                    .path()
                    .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                log::warn!("Walker error for {}: {}", path.display(), e);
                Some(Err(ScanError::Io {
                    path,
                    source: std::io::Error::other(e.to_string()),
                }))
            }
        })
    }

    /// Build a matcher from the configured ignore patterns.
    fn build_gitignore(&self) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if gitignore.is_empty() => None,
            Ok(gitignore) => Some(gitignore),
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    /// Check a file and all its parent directories against the patterns.
    fn should_ignore(&self, path: &Path, gitignore: &Option<Gitignore>) -> bool {
        let Some(gi) = gitignore else {
            return false;
        };
        let relative_path = path.strip_prefix(&self.root).unwrap_or(path);
        gi.matched_path_or_any_parents(relative_path, false)
            .is_ignore()
    }

    fn handle_io_error(&self, path: &Path, error: std::io::Error) -> ScanError {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::PermissionDenied => {
                log::warn!("Permission denied: {}", path.display());
                ScanError::PermissionDenied(path.to_path_buf())
            }
            ErrorKind::NotFound => {
                log::debug!("File not found (may have been deleted): {}", path.display());
                ScanError::NotFound(path.to_path_buf())
            }
            _ => {
                log::warn!("I/O error for {}: {}", path.display(), error);
                ScanError::Io {
                    path: path.to_path_buf(),
                    source: error,
                }
            }
        }
    }
}
