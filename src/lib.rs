//! lakediff - find files in an unsorted datalake that are missing from a
//! curated library.
//!
//! Files are compared in three narrowing stages (size, SHA-256 of the first
//! kilobyte, full SHA-256), survivors are deduplicated within the datalake,
//! and the result is written to a CSV that can be copied into an import
//! folder.

pub mod actions;
pub mod cli;
pub mod comparison;
pub mod config;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod output;
pub mod progress;
pub mod records;
pub mod scanner;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use chrono::Utc;

use crate::actions::FileCopier;
use crate::cli::{AnalyzeArgs, Cli, Commands, CopyArgs};
use crate::comparison::{Analyzer, AnalyzerConfig};
use crate::config::Config;
use crate::error::{AppError, ExitCode};
use crate::output::{
    append_duplicates_report, duplicates_report_path, read_duplicate_paths, read_processed_paths,
    resolve_output_path, write_duplicates_report, JsonSummary, UniqueCsvWriter,
};
use crate::progress::{Progress, ProgressCallback};
use crate::scanner::Walker;

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns an error if the command cannot complete; [`error::exit_code_for`]
/// maps it to an exit code.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging_styled(cli.verbose, cli.quiet, !cli.no_color);

    let mut config = Config::load_from_path(cli.config.as_deref());
    match cli.command {
        Commands::Analyze(ref args) => {
            config.apply_analyze(args);
            run_analyze(args, &config, cli.quiet)
        }
        Commands::Copy(ref args) => {
            config.apply_copy(args);
            run_copy(args, &config, cli.quiet)
        }
    }
}

fn require_dir(role: &'static str, path: &Path) -> Result<(), AppError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(AppError::InvalidDirectory {
            role,
            path: path.to_path_buf(),
        })
    }
}

fn progress_reporter(enabled: bool, quiet: bool) -> Option<Arc<dyn ProgressCallback>> {
    (enabled && !quiet).then(|| Arc::new(Progress::new(false)) as Arc<dyn ProgressCallback>)
}

fn run_analyze(args: &AnalyzeArgs, config: &Config, quiet: bool) -> Result<ExitCode> {
    require_dir("datalake", &args.datalake)?;
    require_dir("library", &args.library)?;

    let (output, processed) = match args.resume {
        Some(ref resume) => {
            if !resume.is_file() {
                return Err(AppError::ResumeFileMissing(resume.clone()).into());
            }
            let mut processed = read_processed_paths(resume)
                .with_context(|| format!("Failed to read resume file {}", resume.display()))?;
            let report = duplicates_report_path(resume);
            if report.is_file() {
                let dropped = read_duplicate_paths(&report).with_context(|| {
                    format!("Failed to read duplicates report {}", report.display())
                })?;
                log::debug!(
                    "{} duplicates dropped by the earlier run stay dropped",
                    dropped.len()
                );
                processed.extend(dropped);
            }
            log::info!(
                "Resuming from {}: {} files already processed",
                resume.display(),
                processed.len()
            );
            (resume.clone(), processed)
        }
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            let output = resolve_output_path(args.output.as_deref(), &cwd, Utc::now())
                .context("Failed to prepare output location")?;
            (output, HashSet::new())
        }
    };
    log::info!("Results will be written to {}", output.display());

    let walker_config = config.walker_config();
    log::info!("Scanning datalake {}", args.datalake.display());
    let datalake = Walker::new(&args.datalake, walker_config.clone())
        .walk()
        .with_context(|| format!("Failed to scan datalake {}", args.datalake.display()))?;
    log::info!("Scanning library {}", args.library.display());
    let library = Walker::new(&args.library, walker_config)
        .walk()
        .with_context(|| format!("Failed to scan library {}", args.library.display()))?;

    let mut analyzer_config = AnalyzerConfig::default().with_workers(config.workers);
    if let Some(settings) = config.gpu_settings() {
        analyzer_config = analyzer_config.with_gpu(settings, config.gpu.threshold);
    }
    if let Some(progress) = progress_reporter(args.progress, quiet) {
        analyzer_config = analyzer_config.with_progress_callback(progress);
    }

    let report = Analyzer::new(analyzer_config).analyze(datalake, library, &processed);

    let mut writer = if args.resume.is_some() {
        UniqueCsvWriter::append(&output, config.csv_batch_size)
    } else {
        UniqueCsvWriter::create(&output, config.csv_batch_size)
    }
    .with_context(|| format!("Failed to open results file {}", output.display()))?;
    writer
        .write_all(&report.unique)
        .with_context(|| format!("Failed to write results to {}", output.display()))?;
    let rows = writer
        .finish()
        .with_context(|| format!("Failed to write results to {}", output.display()))?;

    let duplicates_report: Option<PathBuf> = if report.duplicates.is_empty() {
        None
    } else {
        let path = duplicates_report_path(&output);
        let written = if args.resume.is_some() {
            append_duplicates_report(&path, &report.duplicates)
        } else {
            write_duplicates_report(&path, &report.duplicates)
        };
        written
            .with_context(|| format!("Failed to write duplicates report {}", path.display()))?;
        log::info!(
            "Wrote {} duplicate entries to {}",
            report.duplicates.len(),
            path.display()
        );
        Some(path)
    };

    let exit_code = ExitCode::Success;
    if let Some(ref path) = args.summary_json {
        JsonSummary::new(
            &args.datalake,
            &args.library,
            &output,
            duplicates_report.as_deref(),
            report.summary.clone(),
            exit_code,
        )
        .write_file(path)
        .with_context(|| format!("Failed to write summary {}", path.display()))?;
    }

    if !quiet {
        let total_bytes: u64 = report.unique.iter().map(|r| r.size).sum();
        println!(
            "{} files ({}) missing from the library, written to {}",
            rows,
            ByteSize::b(total_bytes),
            output.display()
        );
        if let Some(ref path) = duplicates_report {
            println!(
                "{} duplicates within the datalake listed in {}",
                report.duplicates.len(),
                path.display()
            );
        }
    }
    Ok(exit_code)
}

fn run_copy(args: &CopyArgs, config: &Config, quiet: bool) -> Result<ExitCode> {
    if !args.csv.is_file() {
        return Err(AppError::ResultsFileMissing(args.csv.clone()).into());
    }
    if args.target.exists() && !args.target.is_dir() {
        return Err(AppError::TargetIsFile(args.target.clone()).into());
    }
    if let Some(ref root) = args.source_root {
        require_dir("source root", root)?;
    }

    let mut copier = FileCopier::new(&args.target)
        .with_source_root(args.source_root.clone())
        .with_conflict_policy(config.copy.conflict)
        .with_dry_run(args.dry_run);
    if let Some(progress) = progress_reporter(args.progress, quiet) {
        copier = copier.with_progress_callback(progress);
    }

    let stats = copier
        .copy_from_csv(&args.csv)
        .with_context(|| format!("Failed to copy files listed in {}", args.csv.display()))?;

    if !quiet {
        let prefix = if args.dry_run { "Dry run: " } else { "" };
        println!("{prefix}{}", stats.summary());
    }

    Ok(if stats.all_succeeded() {
        ExitCode::Success
    } else {
        ExitCode::PartialSuccess
    })
}
