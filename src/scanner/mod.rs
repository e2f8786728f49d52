//! Scanner module for discovering the files on each side of a comparison.
//!
//! This module provides:
//! - Parallel directory walking using jwalk
//! - Extension filtering (case-insensitive, leading dot optional)
//! - Gitignore-style ignore patterns
//!
//! Discovery produces [`FileRecord`](crate::records::FileRecord)s that carry
//! the absolute path, path relative to the scanned root, filename, size and
//! lower-cased extension.
//!
//! # Example
//!
//! ```no_run
//! use lakediff::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig::default().with_extensions(&["epub", ".PDF"]);
//! let walker = Walker::new(Path::new("/data/lake"), config);
//! for record in walker.walk().unwrap() {
//!     println!("{}: {} bytes", record.relative_path.display(), record.size);
//! }
//! ```

pub mod walker;

use std::path::PathBuf;

pub use walker::Walker;

/// Extensions scanned when none are configured explicitly.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "epub", "pdf", "mobi", "azw", "azw3", "cbr", "cbz", "djvu", "fb2",
];

/// Configuration for directory walking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Warning: May cause infinite loops with symlink cycles.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Normalized extensions to keep (`".epub"`). Empty keeps every file.
    pub extensions: Vec<String>,

    /// Glob patterns to ignore (gitignore-style).
    pub ignore_patterns: Vec<String>,
}

impl WalkerConfig {
    /// Keep only files with one of `extensions` (any case, dot optional).
    #[must_use]
    pub fn with_extensions<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        let mut normalized: Vec<String> = extensions
            .iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| e.len() > 1)
            .collect();
        normalized.sort();
        normalized.dedup();
        self.extensions = normalized;
        self
    }

    /// Add gitignore-style patterns.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Follow symbolic links.
    #[must_use]
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Skip dot-files and dot-directories.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Whether a normalized extension passes the filter.
    #[must_use]
    pub fn accepts_extension(&self, extension: &str) -> bool {
        self.extensions.is_empty() || self.extensions.iter().any(|e| e == extension)
    }
}

/// Lower-case an extension and make sure it starts with a dot.
#[must_use]
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().to_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{trimmed}")
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
