//! GPU eligibility policy.
//!
//! A record goes to the accelerator iff the accelerator is available, a
//! threshold is configured, and the record is at least that large. The
//! decision is made once per record, before any hashing starts, and the same
//! rule applies to datalake and library records alike.

use crate::records::{FileIndex, ProcessingMethod, RecordId};

/// Size-threshold rule for routing full hashes to the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingPolicy {
    gpu_available: bool,
    threshold: Option<u64>,
}

impl ProcessingPolicy {
    /// Create a policy from the probed availability flag and configured threshold.
    #[must_use]
    pub fn new(gpu_available: bool, threshold: Option<u64>) -> Self {
        Self {
            gpu_available,
            threshold,
        }
    }

    /// Policy that routes everything to the CPU.
    #[must_use]
    pub fn cpu_only() -> Self {
        Self::default()
    }

    /// Whether any record could be routed to the accelerator.
    #[must_use]
    pub fn gpu_enabled(&self) -> bool {
        self.gpu_available && self.threshold.is_some()
    }

    /// Method for a file of `size` bytes.
    #[must_use]
    pub fn method_for(&self, size: u64) -> ProcessingMethod {
        match self.threshold {
            Some(threshold) if self.gpu_available && size >= threshold => ProcessingMethod::Gpu,
            _ => ProcessingMethod::Cpu,
        }
    }

    /// Assign a method to every record in `index`. Returns the number routed
    /// to the accelerator.
    pub fn assign(&self, index: &mut FileIndex) -> usize {
        let ids: Vec<RecordId> = index.ids().collect();
        self.assign_ids(index, &ids)
    }

    /// Assign a method to the given records only.
    pub fn assign_ids(&self, index: &mut FileIndex, ids: &[RecordId]) -> usize {
        let mut gpu = 0;
        for &id in ids {
            let method = self.method_for(index.get(id).size);
            if method == ProcessingMethod::Gpu {
                gpu += 1;
            }
            index.set_processing_method(id, method);
        }
        gpu
    }

    /// Split `ids` by their already-assigned method into `(gpu, cpu)`,
    /// preserving order within each group.
    #[must_use]
    pub fn categorize(index: &FileIndex, ids: &[RecordId]) -> (Vec<RecordId>, Vec<RecordId>) {
        ids.iter()
            .partition(|&&id| index.get(id).processing_method() == ProcessingMethod::Gpu)
    }
}
