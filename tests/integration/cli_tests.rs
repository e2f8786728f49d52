use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn lakediff() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_lakediff"));
    cmd.env_remove("RUST_LOG")
        .args(["--config", "/nonexistent/lakediff.toml"]);
    cmd
}

#[test]
fn test_help_succeeds() {
    let output = lakediff().arg("--help").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("analyze"));
    assert!(text.contains("copy"));
}

#[test]
fn test_analyze_end_to_end() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    let out = tempdir().unwrap();
    fs::write(lake.path().join("new.epub"), b"new book").unwrap();
    fs::write(lake.path().join("dup1.epub"), b"dup").unwrap();
    fs::write(lake.path().join("dup2.epub"), b"dup").unwrap();
    fs::write(lib.path().join("have.epub"), b"have it").unwrap();
    let summary = out.path().join("summary.json");

    let status = lakediff()
        .args(["-q", "analyze"])
        .arg(lake.path())
        .arg(lib.path())
        .arg("-o")
        .arg(out.path().join("run.csv"))
        .arg("--summary-json")
        .arg(&summary)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));

    let results = fs::read_to_string(out.path().join("run.csv")).unwrap();
    assert_eq!(results.lines().count(), 3);
    assert!(out.path().join("run_duplicates.csv").exists());

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["final_unique"], 2);
    assert_eq!(json["duplicates_removed"], 1);
    assert_eq!(json["exit_code_name"], "LD000");
}

#[test]
fn test_output_directory_gets_timestamped_file() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    let out = tempdir().unwrap();
    fs::write(lake.path().join("a.epub"), b"a").unwrap();
    let reports = out.path().join("reports");

    let status = lakediff()
        .args(["-q", "analyze"])
        .arg(lake.path())
        .arg(lib.path())
        .arg("-o")
        .arg(&reports)
        .status()
        .unwrap();
    assert!(status.success());

    let files: Vec<_> = fs::read_dir(&reports)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("missing_from_library_"));
    assert!(files[0].ends_with(".csv"));
}

#[test]
fn test_invalid_datalake_exit_code() {
    let lib = tempdir().unwrap();
    let output = lakediff()
        .args(["analyze", "/nonexistent/lake/12345"])
        .arg(lib.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("[LD002]"));
}

#[test]
fn test_json_errors() {
    let lib = tempdir().unwrap();
    let output = lakediff()
        .args(["--json-errors", "analyze", "/nonexistent/lake/12345"])
        .arg(lib.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let stderr = String::from_utf8_lossy(&output.stderr);
    let start = stderr.find('{').unwrap();
    let json: serde_json::Value = serde_json::from_str(&stderr[start..]).unwrap();
    assert_eq!(json["code"], "LD002");
    assert_eq!(json["exit_code"], 2);
    assert!(json["message"].as_str().unwrap().contains("datalake"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let status = lakediff().arg("scan").status().unwrap();
    assert!(!status.success());
}
