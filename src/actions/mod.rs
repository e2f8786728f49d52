//! File actions run on analysis results.
//!
//! - [`copy`]: flat copy of the results CSV into an import directory, with
//!   rename/skip/overwrite conflict handling and dry-run support
//!
//! ```no_run
//! use lakediff::actions::{ConflictPolicy, FileCopier};
//! use std::path::Path;
//!
//! let stats = FileCopier::new(Path::new("/import"))
//!     .with_conflict_policy(ConflictPolicy::Rename)
//!     .copy_from_csv(Path::new("missing.csv"))
//!     .unwrap();
//! println!("{}", stats.summary());
//! ```

pub mod copy;

pub use copy::{ConflictPolicy, CopyError, CopyOutcome, CopyStats, FileCopier};
