//! Selective hashing of both sides between comparison stages.
//!
//! # Overview
//!
//! The orchestrator decides which records need a digest before the next
//! stage can run, hands them to the active backends, and writes the results
//! back through [`FileIndex`] so the lookups never go stale.
//!
//! - Prefix stage: datalake candidates plus the library records that share
//!   a candidate size. Always CPU.
//! - Full stage: datalake candidates plus the library records that share a
//!   candidate `(size, prefix)` pair. Each group is split by its assigned
//!   [`ProcessingMethod`](crate::records::ProcessingMethod).
//!
//! The library is never hashed wholesale. Records whose hash fails are left
//! without a digest and classified downstream.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::{Digest, HashBackend, HashStage, ProcessingPolicy};
use crate::records::{FileIndex, FileRecord, RecordId};

/// Counts produced by one or more orchestration steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HashingStats {
    /// Datalake records that received a prefix digest
    pub datalake_prefix_hashed: usize,
    /// Library records that received a prefix digest
    pub library_prefix_hashed: usize,
    /// Prefix hashes that failed (either side)
    pub prefix_failures: usize,
    /// Datalake records that received a full digest
    pub datalake_full_hashed: usize,
    /// Library records that received a full digest
    pub library_full_hashed: usize,
    /// Full hashes that failed (either side)
    pub full_failures: usize,
    /// Records dispatched to the accelerator backend
    pub gpu_dispatched: usize,
}

impl HashingStats {
    /// Fold another step's counts into this one.
    pub fn merge(&mut self, other: &Self) {
        self.datalake_prefix_hashed += other.datalake_prefix_hashed;
        self.library_prefix_hashed += other.library_prefix_hashed;
        self.prefix_failures += other.prefix_failures;
        self.datalake_full_hashed += other.datalake_full_hashed;
        self.library_full_hashed += other.library_full_hashed;
        self.full_failures += other.full_failures;
        self.gpu_dispatched += other.gpu_dispatched;
    }

    /// Total digests computed.
    #[must_use]
    pub fn total_hashed(&self) -> usize {
        self.datalake_prefix_hashed
            + self.library_prefix_hashed
            + self.datalake_full_hashed
            + self.library_full_hashed
    }
}

/// Drives the hash backends for both sides of a comparison.
pub struct HashingOrchestrator {
    cpu: Arc<dyn HashBackend>,
    gpu: Option<Arc<dyn HashBackend>>,
    policy: ProcessingPolicy,
}

impl fmt::Debug for HashingOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashingOrchestrator")
            .field("cpu", &self.cpu.name())
            .field("gpu", &self.gpu.as_ref().map(|g| g.name()))
            .field("policy", &self.policy)
            .finish()
    }
}

impl HashingOrchestrator {
    /// Create an orchestrator that hashes everything on `cpu`.
    #[must_use]
    pub fn new(cpu: Arc<dyn HashBackend>) -> Self {
        Self {
            cpu,
            gpu: None,
            policy: ProcessingPolicy::cpu_only(),
        }
    }

    /// Route large files to `gpu` according to `policy`.
    #[must_use]
    pub fn with_gpu(mut self, gpu: Arc<dyn HashBackend>, policy: ProcessingPolicy) -> Self {
        self.gpu = Some(gpu);
        self.policy = policy;
        self
    }

    /// Active eligibility policy.
    #[must_use]
    pub fn policy(&self) -> ProcessingPolicy {
        self.policy
    }

    /// Compute prefix digests for `candidates` (datalake ids) and for every
    /// library record sharing one of their sizes.
    pub fn hash_prefix_stage(
        &self,
        datalake: &mut FileIndex,
        library: &mut FileIndex,
        candidates: &[RecordId],
    ) -> HashingStats {
        let mut stats = HashingStats::default();

        let sizes: HashSet<u64> = candidates.iter().map(|&id| datalake.get(id).size).collect();
        let library_ids: Vec<RecordId> = library
            .iter()
            .filter(|(_, r)| sizes.contains(&r.size) && r.prefix_hash().is_none())
            .map(|(id, _)| id)
            .collect();
        let datalake_ids: Vec<RecordId> = candidates
            .iter()
            .copied()
            .filter(|&id| datalake.get(id).prefix_hash().is_none())
            .collect();

        if !library_ids.is_empty() {
            log::info!("Hashing {} library files (1KB)...", library_ids.len());
            let results = dispatch(self.cpu.as_ref(), library, &library_ids, HashStage::Prefix);
            let (ok, failed) = apply(library, &library_ids, results, HashStage::Prefix);
            stats.library_prefix_hashed = ok;
            stats.prefix_failures += failed;
        }

        if !datalake_ids.is_empty() {
            log::info!("Hashing {} datalake files (1KB)...", datalake_ids.len());
            let results = dispatch(self.cpu.as_ref(), datalake, &datalake_ids, HashStage::Prefix);
            let (ok, failed) = apply(datalake, &datalake_ids, results, HashStage::Prefix);
            stats.datalake_prefix_hashed = ok;
            stats.prefix_failures += failed;
        }

        stats
    }

    /// Compute full digests for `candidates` (datalake ids) and for every
    /// library record sharing a `(size, prefix)` pair with one of them.
    ///
    /// Datalake candidates keep the method assigned before hashing began;
    /// the selected library records are assigned by the same policy here.
    pub fn hash_full_stage(
        &self,
        datalake: &mut FileIndex,
        library: &mut FileIndex,
        candidates: &[RecordId],
    ) -> HashingStats {
        let mut stats = HashingStats::default();

        let keys: HashSet<(u64, Digest)> = candidates
            .iter()
            .filter_map(|&id| {
                let record = datalake.get(id);
                record.prefix_hash().map(|prefix| (record.size, *prefix))
            })
            .collect();

        // BTreeSet keeps library order stable across runs
        let library_ids: Vec<RecordId> = keys
            .iter()
            .flat_map(|(size, prefix)| library.by_size_and_prefix(*size, prefix).iter().copied())
            .filter(|&id| library.get(id).full_hash().is_none())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.policy.assign_ids(library, &library_ids);

        let datalake_ids: Vec<RecordId> = candidates
            .iter()
            .copied()
            .filter(|&id| datalake.get(id).full_hash().is_none())
            .collect();

        let (library_gpu, library_cpu) = ProcessingPolicy::categorize(library, &library_ids);
        let (datalake_gpu, datalake_cpu) = ProcessingPolicy::categorize(datalake, &datalake_ids);
        log::info!(
            "Full hash candidates: datalake {} GPU / {} CPU, library {} GPU / {} CPU",
            datalake_gpu.len(),
            datalake_cpu.len(),
            library_gpu.len(),
            library_cpu.len()
        );

        let (ok, failed) =
            self.hash_full_group(library, &library_gpu, &library_cpu, "library", &mut stats);
        stats.library_full_hashed = ok;
        stats.full_failures += failed;

        let (ok, failed) =
            self.hash_full_group(datalake, &datalake_gpu, &datalake_cpu, "datalake", &mut stats);
        stats.datalake_full_hashed = ok;
        stats.full_failures += failed;

        stats
    }

    fn hash_full_group(
        &self,
        index: &mut FileIndex,
        gpu_ids: &[RecordId],
        cpu_ids: &[RecordId],
        side: &str,
        stats: &mut HashingStats,
    ) -> (usize, usize) {
        let mut ok = 0;
        let mut failed = 0;

        let mut cpu_ids = cpu_ids.to_vec();
        match self.gpu {
            Some(ref gpu) if !gpu_ids.is_empty() => {
                log::info!("Hashing {} {} files on GPU (full)...", gpu_ids.len(), side);
                stats.gpu_dispatched += gpu_ids.len();
                let results = dispatch(gpu.as_ref(), index, gpu_ids, HashStage::Full);
                let (o, f) = apply(index, gpu_ids, results, HashStage::Full);
                ok += o;
                failed += f;
            }
            _ => cpu_ids.extend_from_slice(gpu_ids),
        }

        if !cpu_ids.is_empty() {
            log::info!("Hashing {} {} files on CPU (full)...", cpu_ids.len(), side);
            let results = dispatch(self.cpu.as_ref(), index, &cpu_ids, HashStage::Full);
            let (o, f) = apply(index, &cpu_ids, results, HashStage::Full);
            ok += o;
            failed += f;
        }

        (ok, failed)
    }
}

fn dispatch(
    backend: &dyn HashBackend,
    index: &FileIndex,
    ids: &[RecordId],
    stage: HashStage,
) -> Vec<Option<Digest>> {
    let files: Vec<&FileRecord> = ids.iter().map(|&id| index.get(id)).collect();
    backend.hash_batch(&files, stage)
}

/// Write results back positionally. Returns `(assigned, failed)`.
fn apply(
    index: &mut FileIndex,
    ids: &[RecordId],
    results: Vec<Option<Digest>>,
    stage: HashStage,
) -> (usize, usize) {
    if results.len() != ids.len() {
        log::error!(
            "Hash backend returned {} results for {} files; unmatched files stay unhashed",
            results.len(),
            ids.len()
        );
    }

    let mut assigned = 0;
    let mut failed = 0;
    for (&id, result) in ids.iter().zip(results) {
        let Some(digest) = result else {
            failed += 1;
            continue;
        };
        let outcome = match stage {
            HashStage::Prefix => index.set_prefix_hash(id, digest),
            HashStage::Full => index.set_full_hash(id, digest),
        };
        match outcome {
            Ok(()) => assigned += 1,
            Err(e) => log::debug!("Skipping hash update: {}", e),
        }
    }
    (assigned, failed)
}
