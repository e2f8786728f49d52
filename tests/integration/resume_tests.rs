use clap::Parser;
use lakediff::cli::Cli;
use lakediff::error::{exit_code_for, ExitCode};
use lakediff::output::{
    duplicates_report_path, read_duplicate_paths, read_processed_paths, read_results,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn analyze(lake: &Path, lib: &Path, extra: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec![
        "lakediff".to_string(),
        "-q".to_string(),
        "--config".to_string(),
        "/nonexistent/lakediff.toml".to_string(),
        "analyze".to_string(),
        lake.display().to_string(),
        lib.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| (*s).to_string()));
    lakediff::run_app(Cli::try_parse_from(argv).unwrap())
}

#[test]
fn test_resume_appends_only_new_files() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    let out = tempdir().unwrap();
    let csv = out.path().join("results.csv");

    fs::write(lake.path().join("first.epub"), b"first book").unwrap();
    fs::write(lib.path().join("other.epub"), b"x").unwrap();

    let code = analyze(lake.path(), lib.path(), &["-o", csv.to_str().unwrap()]).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(read_results(&csv).unwrap().len(), 1);

    fs::write(lake.path().join("second.epub"), b"second book, longer").unwrap();
    let code = analyze(lake.path(), lib.path(), &["--resume", csv.to_str().unwrap()]).unwrap();
    assert_eq!(code, ExitCode::Success);

    let rows = read_results(&csv).unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(names, vec!["first.epub", "second.epub"]);
    assert_eq!(fs::read_to_string(&csv).unwrap().matches("relative_path").count(), 1);
}

#[test]
fn test_resume_with_nothing_new_keeps_file() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    let out = tempdir().unwrap();
    let csv = out.path().join("results.csv");
    fs::write(lake.path().join("only.pdf"), b"only").unwrap();

    analyze(lake.path(), lib.path(), &["-o", csv.to_str().unwrap()]).unwrap();
    let before = fs::read_to_string(&csv).unwrap();
    analyze(lake.path(), lib.path(), &["--resume", csv.to_str().unwrap()]).unwrap();
    assert_eq!(fs::read_to_string(&csv).unwrap(), before);
}

#[test]
fn test_processed_paths_are_absolute_walker_paths() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    let out = tempdir().unwrap();
    let csv = out.path().join("results.csv");
    fs::write(lake.path().join("a.epub"), b"a").unwrap();

    analyze(lake.path(), lib.path(), &["-o", csv.to_str().unwrap()]).unwrap();
    let processed = read_processed_paths(&csv).unwrap();
    let expected = lake.path().canonicalize().unwrap().join("a.epub");
    assert!(processed.contains(&expected));
}

#[test]
fn test_missing_resume_file_is_invalid_input() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    let err = analyze(lake.path(), lib.path(), &["--resume", "/nonexistent/prev.csv"]).unwrap_err();
    assert_eq!(exit_code_for(&err), ExitCode::InvalidInput);
}

#[test]
fn test_resume_keeps_dropped_duplicates_dropped() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    let out = tempdir().unwrap();
    let csv = out.path().join("results.csv");
    let report = duplicates_report_path(&csv);

    fs::write(lake.path().join("dup1.epub"), b"same book").unwrap();
    fs::write(lake.path().join("dup2.epub"), b"same book").unwrap();

    analyze(lake.path(), lib.path(), &["-o", csv.to_str().unwrap()]).unwrap();
    let names = |csv: &Path| -> Vec<String> {
        read_results(csv).unwrap().into_iter().map(|r| r.filename).collect()
    };
    assert_eq!(names(&csv), vec!["dup1.epub"]);
    let report_before = fs::read_to_string(&report).unwrap();

    analyze(lake.path(), lib.path(), &["--resume", csv.to_str().unwrap()]).unwrap();
    assert_eq!(names(&csv), vec!["dup1.epub"]);
    assert_eq!(fs::read_to_string(&report).unwrap(), report_before);
}

#[test]
fn test_resume_appends_to_duplicates_report() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    let out = tempdir().unwrap();
    let csv = out.path().join("results.csv");
    let report = duplicates_report_path(&csv);

    fs::write(lake.path().join("a1.pdf"), b"alpha").unwrap();
    fs::write(lake.path().join("a2.pdf"), b"alpha").unwrap();
    analyze(lake.path(), lib.path(), &["-o", csv.to_str().unwrap()]).unwrap();

    fs::write(lake.path().join("b1.pdf"), b"beta, longer").unwrap();
    fs::write(lake.path().join("b2.pdf"), b"beta, longer").unwrap();
    analyze(lake.path(), lib.path(), &["--resume", csv.to_str().unwrap()]).unwrap();

    let dropped: Vec<String> = read_duplicate_paths(&report)
        .unwrap()
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(dropped.len(), 2);
    assert!(dropped.contains(&"a2.pdf".to_string()));
    assert!(dropped.contains(&"b2.pdf".to_string()));
    assert_eq!(fs::read_to_string(&report).unwrap().matches("duplicate_path").count(), 1);

    let rows = read_results(&csv).unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(names, vec!["a1.pdf", "b1.pdf"]);
}
