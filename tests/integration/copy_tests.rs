use clap::Parser;
use lakediff::actions::{ConflictPolicy, CopyOutcome, FileCopier};
use lakediff::cli::Cli;
use lakediff::error::{exit_code_for, ExitCode};
use lakediff::output::UniqueCsvWriter;
use lakediff::records::FileRecord;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn results_csv(dir: &Path, root: &Path, rels: &[&str]) -> std::path::PathBuf {
    let csv = dir.join("results.csv");
    let mut writer = UniqueCsvWriter::create(&csv, 10).unwrap();
    for rel in rels {
        let path = root.join(rel);
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        writer.write(&FileRecord::new(&path, root, size)).unwrap();
    }
    writer.finish().unwrap();
    csv
}

fn copy(csv: &Path, target: &Path, extra: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec![
        "lakediff".to_string(),
        "-q".to_string(),
        "--config".to_string(),
        "/nonexistent/lakediff.toml".to_string(),
        "copy".to_string(),
        csv.display().to_string(),
        target.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| (*s).to_string()));
    lakediff::run_app(Cli::try_parse_from(argv).unwrap())
}

#[test]
fn test_copy_from_results_csv_is_flat() {
    let lake = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::create_dir_all(lake.path().join("deep/nested")).unwrap();
    fs::write(lake.path().join("deep/nested/a.epub"), b"aaa").unwrap();
    fs::write(lake.path().join("b.pdf"), b"bbbb").unwrap();
    let csv = results_csv(work.path(), lake.path(), &["deep/nested/a.epub", "b.pdf"]);

    let target = work.path().join("import");
    let code = copy(&csv, &target, &[]).unwrap();

    assert_eq!(code, ExitCode::Success);
    assert_eq!(fs::read(target.join("a.epub")).unwrap(), b"aaa");
    assert_eq!(fs::read(target.join("b.pdf")).unwrap(), b"bbbb");
    assert!(!target.join("deep").exists());
}

#[test]
fn test_missing_source_is_partial_success() {
    let lake = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::write(lake.path().join("a.epub"), b"a").unwrap();
    fs::write(lake.path().join("b.epub"), b"b").unwrap();
    let csv = results_csv(work.path(), lake.path(), &["a.epub", "b.epub"]);
    fs::remove_file(lake.path().join("b.epub")).unwrap();

    let code = copy(&csv, &work.path().join("out"), &[]).unwrap();
    assert_eq!(code, ExitCode::PartialSuccess);
    assert!(work.path().join("out/a.epub").exists());
}

#[test]
fn test_source_root_after_move() {
    let lake = tempdir().unwrap();
    let moved = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::create_dir_all(lake.path().join("sub")).unwrap();
    fs::write(lake.path().join("sub/a.epub"), b"content").unwrap();
    let csv = results_csv(work.path(), lake.path(), &["sub/a.epub"]);

    fs::create_dir_all(moved.path().join("sub")).unwrap();
    fs::rename(lake.path().join("sub/a.epub"), moved.path().join("sub/a.epub")).unwrap();

    let target = work.path().join("out");
    let code = copy(
        &csv,
        &target,
        &["--source-root", moved.path().to_str().unwrap()],
    )
    .unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(fs::read(target.join("a.epub")).unwrap(), b"content");
}

#[test]
fn test_target_is_file_is_invalid_input() {
    let lake = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::write(lake.path().join("a.epub"), b"a").unwrap();
    let csv = results_csv(work.path(), lake.path(), &["a.epub"]);
    let target = work.path().join("file_target");
    fs::write(&target, b"x").unwrap();

    let err = copy(&csv, &target, &[]).unwrap_err();
    assert_eq!(exit_code_for(&err), ExitCode::InvalidInput);
}

#[test]
fn test_dry_run_creates_nothing() {
    let lake = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::write(lake.path().join("a.epub"), b"a").unwrap();
    let csv = results_csv(work.path(), lake.path(), &["a.epub"]);
    let target = work.path().join("planned");

    let code = copy(&csv, &target, &["--dry-run"]).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert!(!target.exists());
}

#[test]
fn test_rename_against_existing_target_files() {
    let lake = tempdir().unwrap();
    let work = tempdir().unwrap();
    fs::write(lake.path().join("a.epub"), b"new").unwrap();
    let csv = results_csv(work.path(), lake.path(), &["a.epub"]);
    let target = work.path().join("out");
    fs::create_dir_all(&target).unwrap();
    fs::write(target.join("a.epub"), b"old").unwrap();
    fs::write(target.join("a_1.epub"), b"older").unwrap();

    let stats = FileCopier::new(&target)
        .with_conflict_policy(ConflictPolicy::Rename)
        .copy_from_csv(&csv)
        .unwrap();

    assert_eq!(stats.copied, 1);
    match &stats.outcomes[0] {
        CopyOutcome::Copied { target: written, .. } => {
            assert_eq!(written.file_name().unwrap(), "a_2.epub");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(fs::read(target.join("a.epub")).unwrap(), b"old");
}
