//! Command-line interface definitions for lakediff.
//!
//! Defines global options (verbosity, color, config file) and the two
//! subcommands using the clap derive API.
//!
//! # Example
//!
//! ```bash
//! # Find datalake files missing from the library
//! lakediff analyze /data/lake /data/library -o reports/
//!
//! # Continue an interrupted run, appending to its results
//! lakediff analyze /data/lake /data/library --resume reports/missing.csv
//!
//! # Copy the results into an import folder, skipping name clashes
//! lakediff copy reports/missing.csv /import --conflict skip
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::actions::ConflictPolicy;

/// Find files in a datalake that are missing from a library.
///
/// Files are compared by size, then by a hash of their first kilobyte, then
/// by a full SHA-256 content hash. Unique files are written to a CSV that the
/// `copy` command can import.
#[derive(Debug, Parser)]
#[command(name = "lakediff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compare a datalake against a library and write the missing files to CSV
    Analyze(AnalyzeArgs),
    /// Copy the files listed in a results CSV into a directory
    Copy(CopyArgs),
}

/// Arguments for the analyze subcommand.
#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Unsorted collection to search for new files
    #[arg(value_name = "DATALAKE")]
    pub datalake: PathBuf,

    /// Curated library to compare against
    #[arg(value_name = "LIBRARY")]
    pub library: PathBuf,

    /// Results CSV path, or a directory to hold a timestamped CSV
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Extensions to scan (overrides the configured list)
    #[arg(long = "file-types", value_name = "EXT", num_args = 1.., conflicts_with = "all_files")]
    pub file_types: Vec<String>,

    /// Scan every file regardless of extension
    #[arg(long)]
    pub all_files: bool,

    /// Skip files listed in a previous results CSV and append to it
    #[arg(long, value_name = "CSV", conflicts_with = "output")]
    pub resume: Option<PathBuf>,

    /// Full-hash large files on an accelerator when one is available
    #[arg(long)]
    pub use_gpu: bool,

    /// Accelerator device ordinal
    #[arg(long, value_name = "N")]
    pub gpu_device: Option<u32>,

    /// Minimum size for accelerator hashing (e.g., 100MiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub gpu_threshold: Option<u64>,

    /// Hash worker threads
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Result rows buffered per CSV write
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Glob patterns to ignore in both trees (can be specified multiple times)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links during scan
    ///
    /// Warning: May cause infinite loops if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Write a JSON run summary to this file
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,

    /// Show progress bars while hashing
    #[arg(long)]
    pub progress: bool,
}

/// Arguments for the copy subcommand.
#[derive(Debug, Args)]
pub struct CopyArgs {
    /// Results CSV written by `analyze`
    #[arg(value_name = "CSV")]
    pub csv: PathBuf,

    /// Directory to copy into (created if missing)
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Look up sources as <DIR>/<relative_path> when the recorded path is gone
    #[arg(long, value_name = "DIR")]
    pub source_root: Option<PathBuf>,

    /// What to do when the target name exists
    #[arg(long, value_enum, value_name = "POLICY")]
    pub conflict: Option<ConflictPolicy>,

    /// Report what would be copied without copying
    #[arg(long)]
    pub dry_run: bool,

    /// Show a progress bar while copying
    #[arg(long)]
    pub progress: bool,
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use lakediff::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("100MiB").unwrap(), 104_857_600);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    if s.starts_with('-') {
        return Err("Size cannot be negative".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
