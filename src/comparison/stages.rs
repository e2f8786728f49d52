//! The three datalake-vs-library comparators.
//!
//! Each comparator is a single-threaded pass of index lookups that splits
//! its input into records proven unique and records that still collide
//! with the library and must go to the next, more expensive stage. Every
//! visited record has its status advanced, whatever the outcome.
//!
//! A record missing the digest its stage needs (because hashing failed)
//! cannot be proven to exist in the library, so it is classified unique.

use crate::records::{FileIndex, RecordId, RecordStatus};

/// Result of one comparison stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutcome {
    /// Records with no possible match in the library
    pub unique: Vec<RecordId>,
    /// Records that collided and need the next stage
    pub candidates: Vec<RecordId>,
}

/// Stage 1: compare by size.
///
/// No digest is read here; a size that does not occur in the library can
/// never collide.
pub fn stage1_size(
    datalake: &mut FileIndex,
    library: &FileIndex,
    ids: &[RecordId],
) -> StageOutcome {
    let mut outcome = StageOutcome::default();

    for &id in ids {
        if library.contains_size(datalake.get(id).size) {
            outcome.candidates.push(id);
        } else {
            outcome.unique.push(id);
        }
        datalake.advance(id, RecordStatus::SizeChecked);
    }

    log::info!(
        "Stage 1: {} unique by size, {} need further checking",
        outcome.unique.len(),
        outcome.candidates.len()
    );
    outcome
}

/// Stage 2: compare by `(size, prefix digest)`.
pub fn stage2_prefix(
    datalake: &mut FileIndex,
    library: &FileIndex,
    candidates: &[RecordId],
) -> StageOutcome {
    let mut outcome = StageOutcome::default();

    for &id in candidates {
        let record = datalake.get(id);
        match record.prefix_hash() {
            None => {
                log::debug!(
                    "No prefix hash for {}, treating as unique",
                    record.path.display()
                );
                outcome.unique.push(id);
            }
            Some(prefix) if library.by_size_and_prefix(record.size, prefix).is_empty() => {
                outcome.unique.push(id);
            }
            Some(_) => outcome.candidates.push(id),
        }
        datalake.advance(id, RecordStatus::PrefixHashed);
    }

    log::info!(
        "Stage 2: {} unique by 1KB hash, {} need full hash comparison",
        outcome.unique.len(),
        outcome.candidates.len()
    );
    outcome
}

/// Stage 3: compare by full digest. Candidates whose digest exists in the
/// library are true duplicates and are dropped from the output entirely.
pub fn stage3_full(
    datalake: &mut FileIndex,
    library: &FileIndex,
    candidates: &[RecordId],
) -> StageOutcome {
    let mut outcome = StageOutcome::default();
    let mut in_library = 0usize;

    for &id in candidates {
        let record = datalake.get(id);
        match record.full_hash() {
            None => {
                log::debug!(
                    "No full hash for {}, treating as unique",
                    record.path.display()
                );
                outcome.unique.push(id);
            }
            Some(full) => match library.by_full_hash(full) {
                Some(existing) => {
                    log::debug!(
                        "{} already in library as {}",
                        record.path.display(),
                        library.get(existing).path.display()
                    );
                    in_library += 1;
                }
                None => outcome.unique.push(id),
            },
        }
        datalake.advance(id, RecordStatus::FullHashed);
    }

    log::info!(
        "Stage 3: {} unique by full hash, {} already in library",
        outcome.unique.len(),
        in_library
    );
    outcome
}
