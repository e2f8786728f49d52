//! Collapse duplicates that exist within the datalake itself.
//!
//! The comparators only look across the two sides, so two datalake files with
//! the same content that are both missing from the library would both survive.
//! This pass keys each unique record by the most specific identity it has and
//! keeps only the first record seen per key.
//!
//! Key preference: full digest, then `(size, prefix digest)`, then size alone.
//! The three key kinds never match each other.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hashing::Digest;
use crate::records::{FileIndex, RecordId};

/// Which identity proved two datalake files to be duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DedupMethod {
    /// Identical full-content digest.
    #[serde(rename = "full_hash")]
    FullHash,
    /// Same size and same first-1KB digest.
    #[serde(rename = "size+1k_hash")]
    SizeAndPrefix,
    /// Same size; no digests were computed.
    #[serde(rename = "size_only")]
    SizeOnly,
}

impl fmt::Display for DedupMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FullHash => "full_hash",
            Self::SizeAndPrefix => "size+1k_hash",
            Self::SizeOnly => "size_only",
        };
        f.write_str(name)
    }
}

/// A dropped record and the record it duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateEntry {
    /// The record removed from the output
    pub duplicate: RecordId,
    /// The first record seen with the same key
    pub original: RecordId,
    /// Key that matched
    pub method: DedupMethod,
}

/// Output of [`dedupe_within`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    /// Records kept, in input order
    pub kept: Vec<RecordId>,
    /// Records dropped, in input order
    pub duplicates: Vec<DuplicateEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DedupKey {
    Full(Digest),
    SizeAndPrefix(u64, Digest),
    Size(u64),
}

impl DedupKey {
    fn method(self) -> DedupMethod {
        match self {
            Self::Full(_) => DedupMethod::FullHash,
            Self::SizeAndPrefix(..) => DedupMethod::SizeAndPrefix,
            Self::Size(_) => DedupMethod::SizeOnly,
        }
    }
}

/// Keep the first record per identity key among `ids`.
#[must_use]
pub fn dedupe_within(index: &FileIndex, ids: &[RecordId]) -> DedupOutcome {
    let mut seen: HashMap<DedupKey, RecordId> = HashMap::with_capacity(ids.len());
    let mut outcome = DedupOutcome::default();

    for &id in ids {
        let record = index.get(id);
        let key = match (record.full_hash(), record.prefix_hash()) {
            (Some(full), _) => DedupKey::Full(*full),
            (None, Some(prefix)) => DedupKey::SizeAndPrefix(record.size, *prefix),
            (None, None) => DedupKey::Size(record.size),
        };

        match seen.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(id);
                outcome.kept.push(id);
            }
            Entry::Occupied(slot) => {
                let original = *slot.get();
                log::debug!(
                    "Skipping duplicate ({}): {} (duplicate of {})",
                    key.method(),
                    record.path.display(),
                    index.get(original).path.display()
                );
                outcome.duplicates.push(DuplicateEntry {
                    duplicate: id,
                    original,
                    method: key.method(),
                });
            }
        }
    }

    if outcome.duplicates.is_empty() {
        log::debug!("No duplicates found in datalake");
    } else {
        log::info!(
            "Deduplicating datalake files: {} -> {} ({} duplicates removed)",
            ids.len(),
            outcome.kept.len(),
            outcome.duplicates.len()
        );
    }
    outcome
}
