use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use lakediff::actions::ConflictPolicy;
use lakediff::cli::{Cli, Commands};
use lakediff::config::Config;
use clap::Parser;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config.workers, 10);
    assert_eq!(config.csv_batch_size, 100);
    assert_eq!(config.copy.conflict, ConflictPolicy::Rename);
}

#[test]
fn test_load_from_path_reads_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
csv_batch_size = 7
skip_hidden = true
ignore_patterns = ["*.part"]

[gpu]
threshold = 2048
"#,
    )
    .unwrap();

    let config = Config::load_from_path(Some(&path));
    assert_eq!(config.csv_batch_size, 7);
    assert!(config.skip_hidden);
    assert_eq!(config.ignore_patterns, vec!["*.part"]);
    assert_eq!(config.gpu.threshold, 2048);
}

#[test]
fn test_partial_toml_keeps_other_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[copy]\nconflict = \"skip\"\n").unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap();
    assert_eq!(config.copy.conflict, ConflictPolicy::Skip);
    assert_eq!(config.workers, 10);
    assert!(!config.gpu.enabled);
}

#[test]
fn test_cli_flags_override_config() {
    let mut config = Config {
        workers: 3,
        ..Config::default()
    };
    config.gpu.threshold = 1;

    let cli = Cli::try_parse_from([
        "lakediff",
        "analyze",
        "/lake",
        "/lib",
        "--workers",
        "12",
        "--all-files",
        "--use-gpu",
        "--gpu-threshold",
        "1MiB",
        "--ignore",
        "tmp/",
    ])
    .unwrap();
    let Commands::Analyze(args) = cli.command else {
        panic!("Expected Analyze command");
    };
    config.apply_analyze(&args);

    assert_eq!(config.workers, 12);
    assert!(config.file_types.is_empty());
    assert!(config.gpu.enabled);
    assert_eq!(config.gpu.threshold, 1_048_576);
    assert_eq!(config.ignore_patterns, vec!["tmp/"]);
    assert!(config.gpu_settings().is_some());
}

#[test]
fn test_absent_cli_flags_keep_config() {
    let mut config = Config::default();
    config.copy.conflict = ConflictPolicy::Overwrite;

    let cli = Cli::try_parse_from(["lakediff", "copy", "r.csv", "/t"]).unwrap();
    let Commands::Copy(args) = cli.command else {
        panic!("Expected Copy command");
    };
    config.apply_copy(&args);
    assert_eq!(config.copy.conflict, ConflictPolicy::Overwrite);
}
