//! Indexed collection of file records for one side of the comparison.
//!
//! # Overview
//!
//! A [`FileIndex`] owns every [`FileRecord`] discovered under one root and
//! keeps three lookups in lockstep with them:
//!
//! - size -> records
//! - (size, prefix digest) -> records
//! - full digest -> record (last write wins)
//!
//! Digests can only be assigned through [`FileIndex::set_prefix_hash`] and
//! [`FileIndex::set_full_hash`], which update the record and the matching
//! lookup together, so a populated digest is always findable.
//!
//! # Example
//!
//! ```
//! use lakediff::records::{FileIndex, FileRecord};
//! use std::path::Path;
//!
//! let mut index = FileIndex::new();
//! let id = index.insert(FileRecord::new(Path::new("/lib/a.epub"), Path::new("/lib"), 100));
//!
//! assert!(index.contains_size(100));
//! index.set_prefix_hash(id, [7u8; 32]).unwrap();
//! assert_eq!(index.by_size_and_prefix(100, &[7u8; 32]), &[id]);
//! ```

use std::collections::{HashMap, HashSet};

use super::record::{FileRecord, ProcessingMethod, RecordError, RecordStatus};
use crate::hashing::Digest;

/// Position of a record inside its owning [`FileIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(usize);

impl RecordId {
    /// Raw position in insertion order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Records of one side plus their lookup structures.
#[derive(Debug, Default, Clone)]
pub struct FileIndex {
    records: Vec<FileRecord>,
    by_size: HashMap<u64, Vec<RecordId>>,
    by_size_and_prefix: HashMap<(u64, Digest), Vec<RecordId>>,
    by_full_hash: HashMap<Digest, RecordId>,
}

impl FileIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from discovered records, preserving their order.
    #[must_use]
    pub fn from_records<I: IntoIterator<Item = FileRecord>>(records: I) -> Self {
        let mut index = Self::new();
        for record in records {
            index.insert(record);
        }
        index
    }

    /// Add a record, indexing whatever digests it already carries.
    pub fn insert(&mut self, record: FileRecord) -> RecordId {
        let id = RecordId(self.records.len());
        self.by_size.entry(record.size).or_default().push(id);
        if let Some(prefix) = record.prefix_hash() {
            self.by_size_and_prefix
                .entry((record.size, *prefix))
                .or_default()
                .push(id);
        }
        if let Some(full) = record.full_hash() {
            self.by_full_hash.insert(*full, id);
        }
        self.records.push(record);
        id
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Borrow a record.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this index.
    #[must_use]
    pub fn get(&self, id: RecordId) -> &FileRecord {
        &self.records[id.0]
    }

    /// All ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        (0..self.records.len()).map(RecordId)
    }

    /// All records with their ids, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &FileRecord)> + '_ {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| (RecordId(i), record))
    }

    /// Consume the index, returning records in insertion order.
    #[must_use]
    pub fn into_records(self) -> Vec<FileRecord> {
        self.records
    }

    /// Whether any record has exactly `size` bytes.
    #[must_use]
    pub fn contains_size(&self, size: u64) -> bool {
        self.by_size.contains_key(&size)
    }

    /// Set of distinct sizes present.
    #[must_use]
    pub fn sizes(&self) -> HashSet<u64> {
        self.by_size.keys().copied().collect()
    }

    /// Records with the given size.
    #[must_use]
    pub fn by_size(&self, size: u64) -> &[RecordId] {
        self.by_size.get(&size).map_or(&[], Vec::as_slice)
    }

    /// Records with the given size and prefix digest.
    #[must_use]
    pub fn by_size_and_prefix(&self, size: u64, prefix: &Digest) -> &[RecordId] {
        self.by_size_and_prefix
            .get(&(size, *prefix))
            .map_or(&[], Vec::as_slice)
    }

    /// The record most recently indexed under `full`.
    #[must_use]
    pub fn by_full_hash(&self, full: &Digest) -> Option<RecordId> {
        self.by_full_hash.get(full).copied()
    }

    /// Assign a prefix digest and index it.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::PrefixHashAlreadySet`] if the record already has one;
    /// the index is left untouched in that case.
    pub fn set_prefix_hash(&mut self, id: RecordId, digest: Digest) -> Result<(), RecordError> {
        let record = &mut self.records[id.0];
        record.set_prefix_hash(digest)?;
        self.by_size_and_prefix
            .entry((record.size, digest))
            .or_default()
            .push(id);
        Ok(())
    }

    /// Assign a full digest and index it. A later record with the same digest
    /// replaces the earlier one as the lookup target.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::FullHashAlreadySet`] if the record already has one.
    pub fn set_full_hash(&mut self, id: RecordId, digest: Digest) -> Result<(), RecordError> {
        self.records[id.0].set_full_hash(digest)?;
        if let Some(previous) = self.by_full_hash.insert(digest, id) {
            if previous != id {
                log::trace!(
                    "Full hash lookup now points at {} instead of {}",
                    self.records[id.0].path.display(),
                    self.records[previous.0].path.display()
                );
            }
        }
        Ok(())
    }

    /// Move a record's status forward; regressions are ignored.
    pub fn advance(&mut self, id: RecordId, status: RecordStatus) -> bool {
        self.records[id.0].advance(status)
    }

    /// Record which backend will compute this record's full hash.
    pub fn set_processing_method(&mut self, id: RecordId, method: ProcessingMethod) {
        self.records[id.0].set_processing_method(method);
    }
}
