//! File records and the per-side index that owns them.
//!
//! - [`record`]: a single discovered file and its digests
//! - [`index`]: size / prefix / full-hash lookups kept in lockstep with the records

pub mod index;
pub mod record;

pub use index::{FileIndex, RecordId};
pub use record::{extension_of, FileRecord, ProcessingMethod, RecordError, RecordStatus};
