//! Content hashing backends and the orchestration that drives them.
//!
//! # Overview
//!
//! Hashing is the only expensive, parallel part of the pipeline. It is split into:
//!
//! - [`HashBackend`]: the capability every backend exposes (prefix, full, batch)
//! - [`cpu`]: SHA-256 over a bounded rayon worker pool
//! - [`gpu`]: accelerator-staged reads for large files, falling back to [`cpu`]
//! - `cuda`: the CUDA staging device, with the `cuda` feature
//! - [`policy`]: decides which records are eligible for the accelerator
//! - [`orchestrator`]: picks which records on both sides need hashing and
//!   writes the results back into each [`FileIndex`](crate::records::FileIndex)
//!
//! Every backend produces byte-identical SHA-256 digests for the same content.
//! A file that cannot be read yields `None` in a batch rather than an error,
//! so one bad file never aborts the rest.

pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod gpu;
pub mod orchestrator;
pub mod policy;

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest as _, Sha256};

use crate::records::FileRecord;

pub use cpu::CpuHasher;
pub use gpu::{DeviceError, GpuHasher, StagingDevice};
pub use orchestrator::{HashingOrchestrator, HashingStats};
pub use policy::ProcessingPolicy;

/// A SHA-256 digest.
pub type Digest = [u8; 32];

/// Number of leading bytes covered by the prefix digest.
pub const PREFIX_SIZE: usize = 1024;

/// Read size used when streaming a whole file through the hasher.
pub const FULL_HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Which digest a batch should compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashStage {
    /// First [`PREFIX_SIZE`] bytes.
    Prefix,
    /// Entire file contents.
    Full,
}

impl fmt::Display for HashStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix => write!(f, "1k"),
            Self::Full => write!(f, "full"),
        }
    }
}

impl FromStr for HashStage {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1k" | "prefix" => Ok(Self::Prefix),
            "full" => Ok(Self::Full),
            other => Err(HashError::UnknownStage(other.to_string())),
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A stage identifier that no backend understands.
    #[error("Unknown hash stage: '{0}'")]
    UnknownStage(String),
}

impl HashError {
    /// Classify an I/O error raised while reading `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// The hashing capability shared by every backend.
///
/// Callers dispatch purely through this trait and never inspect which
/// backend they hold.
pub trait HashBackend: Send + Sync {
    /// Short backend name for log messages.
    fn name(&self) -> &'static str;

    /// Digest of the first [`PREFIX_SIZE`] bytes of `file`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    fn hash_prefix(&self, file: &FileRecord) -> Result<Digest, HashError>;

    /// Digest of the entire contents of `file`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    fn hash_full(&self, file: &FileRecord) -> Result<Digest, HashError>;

    /// Hash every file for `stage`. The result has exactly one entry per
    /// input, in input order; `None` marks a file that could not be hashed.
    fn hash_batch(&self, files: &[&FileRecord], stage: HashStage) -> Vec<Option<Digest>>;
}

/// Hash the first [`PREFIX_SIZE`] bytes of a file on the calling thread.
///
/// # Errors
///
/// Returns [`HashError`] if the file cannot be opened or read.
pub fn prefix_digest(path: &Path) -> Result<Digest, HashError> {
    let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
    let mut buffer = Vec::with_capacity(PREFIX_SIZE);
    file.take(PREFIX_SIZE as u64)
        .read_to_end(&mut buffer)
        .map_err(|e| HashError::from_io(path, e))?;
    Ok(digest_bytes(&buffer))
}

/// Stream a whole file through SHA-256 in `chunk_size` reads.
///
/// # Errors
///
/// Returns [`HashError`] if the file cannot be opened or a read fails part way.
pub fn full_digest(path: &Path, chunk_size: usize) -> Result<Digest, HashError> {
    let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(HashError::from_io(path, e)),
        };
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize().into())
}

/// SHA-256 of an in-memory buffer.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> Digest {
    Sha256::digest(bytes).into()
}

/// Lower-case hexadecimal rendering of a digest.
#[must_use]
pub fn hash_to_hex(digest: &Digest) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
