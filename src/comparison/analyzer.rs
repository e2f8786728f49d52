//! End-to-end datalake vs. library analysis.
//!
//! # Overview
//!
//! [`Analyzer::analyze`] runs the whole funnel over two discovered record lists:
//!
//! 1. Drop already-processed paths from both sides (resume)
//! 2. Assign each datalake record its hashing method (GPU/CPU policy)
//! 3. **Stage 1**: size lookup
//! 4. Prefix-hash the survivors and matching library records, then **Stage 2**
//! 5. Full-hash the survivors and matching library records, then **Stage 3**
//! 6. Merge every stage's unique records and deduplicate within the datalake
//!
//! Hashing failures never abort the run; they only make more records unique.
//!
//! # Example
//!
//! ```no_run
//! use lakediff::comparison::{Analyzer, AnalyzerConfig};
//! use lakediff::scanner::{Walker, WalkerConfig};
//! use std::collections::HashSet;
//! use std::path::Path;
//!
//! let walk = |root: &str| Walker::new(Path::new(root), WalkerConfig::default()).walk().unwrap();
//! let analyzer = Analyzer::new(AnalyzerConfig::default().with_workers(8));
//! let report = analyzer.analyze(walk("/data/lake"), walk("/data/library"), &HashSet::new());
//!
//! println!("{} files missing from the library", report.unique.len());
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::dedup::{dedupe_within, DedupMethod};
use super::stages::{stage1_size, stage2_prefix, stage3_full};
use crate::hashing::gpu::{GpuSettings, DEFAULT_GPU_THRESHOLD};
use crate::hashing::{
    CpuHasher, GpuHasher, HashBackend, HashingOrchestrator, HashingStats, ProcessingPolicy,
    StagingDevice,
};
use crate::progress::ProgressCallback;
use crate::records::{FileIndex, FileRecord, RecordId};

/// Configuration for an [`Analyzer`].
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// CPU hashing worker count
    pub workers: usize,
    /// Accelerator settings; `None` keeps everything on the CPU
    pub gpu: Option<GpuSettings>,
    /// Minimum size routed to the accelerator
    pub gpu_threshold: u64,
    /// Optional progress reporting for hash batches
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("workers", &self.workers)
            .field("gpu", &self.gpu)
            .field("gpu_threshold", &self.gpu_threshold)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            workers: crate::hashing::cpu::DEFAULT_WORKERS,
            gpu: None,
            gpu_threshold: DEFAULT_GPU_THRESHOLD,
            progress_callback: None,
        }
    }
}

impl AnalyzerConfig {
    /// Set the CPU worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Request accelerator hashing for files of at least `threshold` bytes.
    #[must_use]
    pub fn with_gpu(mut self, settings: GpuSettings, threshold: u64) -> Self {
        self.gpu = Some(settings);
        self.gpu_threshold = threshold;
        self
    }

    /// Report hash progress to `callback`.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// A datalake record dropped because another datalake record has the same identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePair {
    /// The dropped record
    pub duplicate: FileRecord,
    /// The record that was kept
    pub original: FileRecord,
    /// Key that matched
    pub method: DedupMethod,
}

/// Wall-clock time spent in each step, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageDurations {
    /// Size comparison
    pub stage1_ms: u64,
    /// Prefix hashing plus Stage 2 comparison
    pub stage2_ms: u64,
    /// Full hashing plus Stage 3 comparison
    pub stage3_ms: u64,
    /// Within-datalake deduplication
    pub dedup_ms: u64,
    /// Whole analysis
    pub total_ms: u64,
}

/// Counts describing one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    /// Datalake records entering the pipeline
    pub datalake_files: usize,
    /// Library records entering the pipeline
    pub library_files: usize,
    /// Records skipped on either side because they were already processed
    pub skipped_processed: usize,
    /// Datalake records assigned to the accelerator
    pub gpu_assigned: usize,
    /// Unique after Stage 1
    pub stage1_unique: usize,
    /// Unique after Stage 2
    pub stage2_unique: usize,
    /// Unique after Stage 3
    pub stage3_unique: usize,
    /// Datalake records whose full content already exists in the library
    pub found_in_library: usize,
    /// Records removed by within-datalake deduplication
    pub duplicates_removed: usize,
    /// Records in the final output
    pub final_unique: usize,
    /// Hashing counts for both sides
    pub hashing: HashingStats,
    /// Whether an accelerator was active
    pub gpu_active: bool,
    /// Files the accelerator handed back to the CPU
    pub gpu_fallbacks: usize,
    /// Timing per step
    pub durations: StageDurations,
}

/// Output of [`Analyzer::analyze`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// Datalake records missing from the library, deduplicated, in stage order
    pub unique: Vec<FileRecord>,
    /// Datalake records dropped as duplicates of a kept record
    pub duplicates: Vec<DuplicatePair>,
    /// Run statistics
    pub summary: AnalysisSummary,
}

/// Runs the three-stage comparison.
pub struct Analyzer {
    orchestrator: HashingOrchestrator,
    gpu: Option<Arc<GpuHasher>>,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("orchestrator", &self.orchestrator)
            .field("gpu", &self.gpu)
            .finish()
    }
}

impl Analyzer {
    /// Build an analyzer, probing for an accelerator if one was requested.
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::build(config, GpuHasher::probe)
    }

    /// Build an analyzer that stages large files through `device`.
    /// `device` is ignored unless `config.gpu` is set.
    #[must_use]
    pub fn with_device(config: AnalyzerConfig, device: Box<dyn StagingDevice>) -> Self {
        Self::build(config, move |settings, cpu| {
            GpuHasher::with_device(device, settings, cpu)
        })
    }

    /// Use a caller-assembled orchestrator.
    #[must_use]
    pub fn with_orchestrator(orchestrator: HashingOrchestrator) -> Self {
        Self {
            orchestrator,
            gpu: None,
        }
    }

    fn build<F>(config: AnalyzerConfig, make_gpu: F) -> Self
    where
        F: FnOnce(GpuSettings, Arc<dyn HashBackend>) -> GpuHasher,
    {
        let mut cpu = CpuHasher::new(config.workers);
        if let Some(callback) = config.progress_callback {
            cpu = cpu.with_progress_callback(callback);
        }
        let cpu: Arc<dyn HashBackend> = Arc::new(cpu);
        let mut orchestrator = HashingOrchestrator::new(cpu.clone());
        let mut active_gpu = None;

        if let Some(settings) = config.gpu {
            let gpu = Arc::new(make_gpu(settings, cpu));
            if gpu.is_available() {
                log::info!("GPU hash processor available");
                let policy = ProcessingPolicy::new(true, Some(config.gpu_threshold));
                orchestrator = orchestrator.with_gpu(gpu.clone(), policy);
                active_gpu = Some(gpu);
            } else {
                log::warn!(
                    "GPU requested but not available: {}",
                    gpu.unavailable_reason().unwrap_or("unknown error")
                );
                log::warn!("Falling back to CPU only");
            }
        }
        if active_gpu.is_none() {
            log::info!("Using CPU hash processor only");
        }

        Self {
            orchestrator,
            gpu: active_gpu,
        }
    }

    /// Whether full hashes may be routed to an accelerator.
    #[must_use]
    pub fn gpu_active(&self) -> bool {
        self.gpu.is_some()
    }

    /// Compare `datalake` against `library`, skipping any path in `processed`.
    #[must_use]
    pub fn analyze(
        &self,
        datalake: Vec<FileRecord>,
        library: Vec<FileRecord>,
        processed: &HashSet<PathBuf>,
    ) -> AnalysisReport {
        let start = Instant::now();
        let mut summary = AnalysisSummary {
            gpu_active: self.gpu_active(),
            ..AnalysisSummary::default()
        };

        let (datalake, skipped_lake) = exclude_processed(datalake, processed);
        let (library, skipped_lib) = exclude_processed(library, processed);
        summary.skipped_processed = skipped_lake + skipped_lib;
        if summary.skipped_processed > 0 {
            log::info!(
                "Skipping {} already processed files",
                summary.skipped_processed
            );
        }

        let mut datalake = FileIndex::from_records(datalake);
        let mut library = FileIndex::from_records(library);
        summary.datalake_files = datalake.len();
        summary.library_files = library.len();

        summary.gpu_assigned = self.orchestrator.policy().assign(&mut datalake);
        log::info!(
            "Categorized {} datalake files: {} GPU, {} CPU",
            datalake.len(),
            summary.gpu_assigned,
            datalake.len() - summary.gpu_assigned
        );

        // Stage 1
        let phase = Instant::now();
        let all_ids: Vec<RecordId> = datalake.ids().collect();
        let stage1 = stage1_size(&mut datalake, &library, &all_ids);
        summary.stage1_unique = stage1.unique.len();
        summary.durations.stage1_ms = millis(phase.elapsed());

        // Stage 2
        let phase = Instant::now();
        let mut stage2_unique = Vec::new();
        let mut stage3_candidates = Vec::new();
        if !stage1.candidates.is_empty() {
            let stats =
                self.orchestrator
                    .hash_prefix_stage(&mut datalake, &mut library, &stage1.candidates);
            summary.hashing.merge(&stats);
            let stage2 = stage2_prefix(&mut datalake, &library, &stage1.candidates);
            stage2_unique = stage2.unique;
            stage3_candidates = stage2.candidates;
        }
        summary.stage2_unique = stage2_unique.len();
        summary.durations.stage2_ms = millis(phase.elapsed());

        // Stage 3
        let phase = Instant::now();
        let mut stage3_unique = Vec::new();
        if !stage3_candidates.is_empty() {
            let stats =
                self.orchestrator
                    .hash_full_stage(&mut datalake, &mut library, &stage3_candidates);
            summary.hashing.merge(&stats);
            stage3_unique = stage3_full(&mut datalake, &library, &stage3_candidates).unique;
        }
        summary.stage3_unique = stage3_unique.len();
        summary.found_in_library = stage3_candidates.len() - stage3_unique.len();
        summary.durations.stage3_ms = millis(phase.elapsed());

        // Dedup
        let phase = Instant::now();
        let merged: Vec<RecordId> = stage1
            .unique
            .into_iter()
            .chain(stage2_unique)
            .chain(stage3_unique)
            .collect();
        let dedup = dedupe_within(&datalake, &merged);
        summary.duplicates_removed = dedup.duplicates.len();
        summary.final_unique = dedup.kept.len();
        summary.durations.dedup_ms = millis(phase.elapsed());

        summary.gpu_fallbacks = self.gpu.as_ref().map_or(0, |g| g.fallback_count());

        let unique = dedup
            .kept
            .iter()
            .map(|&id| datalake.get(id).clone())
            .collect();
        let duplicates = dedup
            .duplicates
            .iter()
            .map(|entry| DuplicatePair {
                duplicate: datalake.get(entry.duplicate).clone(),
                original: datalake.get(entry.original).clone(),
                method: entry.method,
            })
            .collect();

        summary.durations.total_ms = millis(start.elapsed());
        log::info!(
            "Analysis complete: {} unique (stage 1: {}, stage 2: {}, stage 3: {}), {} duplicates removed",
            summary.final_unique,
            summary.stage1_unique,
            summary.stage2_unique,
            summary.stage3_unique,
            summary.duplicates_removed
        );

        AnalysisReport {
            unique,
            duplicates,
            summary,
        }
    }
}

fn exclude_processed(
    records: Vec<FileRecord>,
    processed: &HashSet<PathBuf>,
) -> (Vec<FileRecord>, usize) {
    if processed.is_empty() {
        return (records, 0);
    }
    let before = records.len();
    let kept: Vec<FileRecord> = records
        .into_iter()
        .filter(|r| !processed.contains(&r.path))
        .collect();
    let skipped = before - kept.len();
    (kept, skipped)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
