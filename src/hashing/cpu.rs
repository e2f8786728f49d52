//! SHA-256 hashing on a bounded rayon worker pool.
//!
//! Each file is an independent task. Results are collected positionally, so
//! the output of [`CpuHasher::hash_batch`] always lines up with its input
//! regardless of which worker finished first.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;

use super::{full_digest, prefix_digest, Digest, HashBackend, HashError, HashStage};
use super::FULL_HASH_CHUNK_SIZE;
use crate::progress::ProgressCallback;
use crate::records::FileRecord;

/// Default number of hashing workers.
pub const DEFAULT_WORKERS: usize = 10;

/// Multi-threaded CPU hash backend.
pub struct CpuHasher {
    pool: Option<rayon::ThreadPool>,
    workers: usize,
    chunk_size: usize,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl fmt::Debug for CpuHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuHasher")
            .field("workers", &self.workers)
            .field("chunk_size", &self.chunk_size)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for CpuHasher {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl CpuHasher {
    /// Create a backend with `workers` threads (at least one).
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("lakediff-hash-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!(
                    "Failed to create hashing thread pool ({}), using global pool with {} threads",
                    e,
                    rayon::current_num_threads()
                );
                None
            }
        };

        Self {
            pool,
            workers,
            chunk_size: FULL_HASH_CHUNK_SIZE,
            progress_callback: None,
        }
    }

    /// Override the read size used for full hashes.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Report per-file progress to `callback`.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn hash_one(&self, file: &FileRecord, stage: HashStage) -> Result<Digest, HashError> {
        match stage {
            HashStage::Prefix => prefix_digest(&file.path),
            HashStage::Full => full_digest(&file.path, self.chunk_size),
        }
    }

    fn run_batch(&self, files: &[&FileRecord], stage: HashStage) -> Vec<Option<Digest>> {
        files
            .par_iter()
            .enumerate()
            .map(|(idx, file)| {
                if let Some(ref callback) = self.progress_callback {
                    callback.on_progress(idx + 1, file.path.to_string_lossy().as_ref());
                }

                let result = match self.hash_one(file, stage) {
                    Ok(digest) => {
                        log::trace!("{} hash computed: {}", stage, file.path.display());
                        Some(digest)
                    }
                    Err(e) => {
                        log::warn!("Failed to compute {} hash: {}", stage, e);
                        None
                    }
                };

                if let Some(ref callback) = self.progress_callback {
                    callback.on_item_completed(file.size);
                }
                result
            })
            .collect()
    }
}

impl HashBackend for CpuHasher {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn hash_prefix(&self, file: &FileRecord) -> Result<Digest, HashError> {
        self.hash_one(file, HashStage::Prefix)
    }

    fn hash_full(&self, file: &FileRecord) -> Result<Digest, HashError> {
        self.hash_one(file, HashStage::Full)
    }

    fn hash_batch(&self, files: &[&FileRecord], stage: HashStage) -> Vec<Option<Digest>> {
        if files.is_empty() {
            return Vec::new();
        }

        let phase = match stage {
            HashStage::Prefix => "prehash",
            HashStage::Full => "fullhash",
        };
        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start(phase, files.len());
        }

        let results = match self.pool {
            Some(ref pool) => pool.install(|| self.run_batch(files, stage)),
            None => self.run_batch(files, stage),
        };

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end(phase);
        }

        let failed = results.iter().filter(|r| r.is_none()).count();
        log::debug!(
            "CPU {} batch: {} files, {} failed",
            stage,
            files.len(),
            failed
        );
        results
    }
}
