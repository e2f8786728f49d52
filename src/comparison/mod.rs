//! Datalake vs. library comparison.
//!
//! - [`stages`]: size, prefix-hash and full-hash comparators
//! - [`dedup`]: within-datalake deduplication of the merged unique set
//! - [`analyzer`]: runs stages, hashing and dedup end to end

pub mod analyzer;
pub mod dedup;
pub mod stages;

pub use analyzer::{
    AnalysisReport, AnalysisSummary, Analyzer, AnalyzerConfig, DuplicatePair, StageDurations,
};
pub use dedup::{dedupe_within, DedupMethod, DedupOutcome, DuplicateEntry};
pub use stages::{stage1_size, stage2_prefix, stage3_full, StageOutcome};
