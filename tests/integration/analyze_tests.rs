use lakediff::comparison::{Analyzer, AnalyzerConfig, DedupMethod};
use lakediff::scanner::{Walker, WalkerConfig, DEFAULT_EXTENSIONS};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// 3000 bytes that share their first kilobyte and differ at the end.
fn long_content(tail: u8) -> Vec<u8> {
    let mut content = vec![b'x'; 3000];
    content[2999] = tail;
    content
}

fn scan(root: &Path) -> Vec<lakediff::records::FileRecord> {
    let config = WalkerConfig::default().with_extensions(DEFAULT_EXTENSIONS);
    Walker::new(root, config).walk().unwrap()
}

fn fixture() -> (TempDir, TempDir) {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();

    // Already in the library under another name.
    write(lake.path(), "dump/a.epub", b"shared content");
    write(lib.path(), "Author/A.epub", b"shared content");

    // Size seen in the library, but a different first kilobyte.
    write(lake.path(), "dump/b.pdf", b"bbbbbbbbbbbbbb");

    // Same size and prefix as a library file, different tail.
    write(lake.path(), "dump/c.mobi", &long_content(b'1'));
    write(lib.path(), "Other/C.mobi", &long_content(b'2'));

    // Size never seen in the library.
    write(lake.path(), "new/d.epub", b"a brand new book");

    // Not an ebook.
    write(lake.path(), "new/notes.txt", b"ignored");

    (lake, lib)
}

#[test]
fn test_each_stage_contributes() {
    let (lake, lib) = fixture();
    let report = Analyzer::new(AnalyzerConfig::default().with_workers(2)).analyze(
        scan(lake.path()),
        scan(lib.path()),
        &HashSet::new(),
    );

    let mut names: Vec<_> = report.unique.iter().map(|r| r.filename.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["b.pdf", "c.mobi", "d.epub"]);

    let summary = &report.summary;
    assert_eq!(summary.datalake_files, 4);
    assert_eq!(summary.library_files, 2);
    assert_eq!(summary.stage1_unique, 1);
    assert_eq!(summary.stage2_unique, 1);
    assert_eq!(summary.stage3_unique, 1);
    assert_eq!(summary.found_in_library, 1);
    assert_eq!(summary.final_unique, 3);
    assert!(!summary.gpu_active);
}

#[test]
fn test_unique_records_in_stage_order() {
    let (lake, lib) = fixture();
    let report = Analyzer::new(AnalyzerConfig::default()).analyze(
        scan(lake.path()),
        scan(lib.path()),
        &HashSet::new(),
    );
    let order: Vec<_> = report.unique.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(order, vec!["d.epub", "b.pdf", "c.mobi"]);
}

#[test]
fn test_empty_library_everything_unique_by_size() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    write(lake.path(), "a.epub", b"one");
    write(lake.path(), "b.epub", b"three");

    let report = Analyzer::new(AnalyzerConfig::default()).analyze(
        scan(lake.path()),
        scan(lib.path()),
        &HashSet::new(),
    );
    assert_eq!(report.summary.stage1_unique, 2);
    assert_eq!(report.summary.hashing.total_hashed(), 0);
    assert_eq!(report.unique.len(), 2);
}

#[test]
fn test_empty_datalake() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    write(lib.path(), "a.epub", b"one");

    let report = Analyzer::new(AnalyzerConfig::default()).analyze(
        scan(lake.path()),
        scan(lib.path()),
        &HashSet::new(),
    );
    assert!(report.unique.is_empty());
    assert!(report.duplicates.is_empty());
}

#[test]
fn test_datalake_copies_collapse_to_first_seen() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    write(lake.path(), "a/book.epub", b"same bytes");
    write(lake.path(), "b/book.epub", b"same bytes");
    write(lake.path(), "c/book.epub", b"same bytes");

    let report = Analyzer::new(AnalyzerConfig::default()).analyze(
        scan(lake.path()),
        scan(lib.path()),
        &HashSet::new(),
    );

    assert_eq!(report.unique.len(), 1);
    assert!(report.unique[0].relative_path.starts_with("a"));
    assert_eq!(report.duplicates.len(), 2);
    for pair in &report.duplicates {
        assert_eq!(pair.original.path, report.unique[0].path);
        // Unique at Stage 1, so only the size was known.
        assert_eq!(pair.method, DedupMethod::SizeOnly);
    }
}

#[test]
fn test_datalake_copies_found_in_library_are_all_excluded() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    write(lake.path(), "x/one.pdf", b"library book");
    write(lake.path(), "y/two.pdf", b"library book");
    write(lib.path(), "book.pdf", b"library book");

    let report = Analyzer::new(AnalyzerConfig::default()).analyze(
        scan(lake.path()),
        scan(lib.path()),
        &HashSet::new(),
    );
    assert!(report.unique.is_empty());
    assert_eq!(report.summary.found_in_library, 2);
}

#[test]
fn test_empty_files_match_empty_library_files() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    write(lake.path(), "empty.epub", b"");
    write(lib.path(), "also_empty.epub", b"");

    let report = Analyzer::new(AnalyzerConfig::default()).analyze(
        scan(lake.path()),
        scan(lib.path()),
        &HashSet::new(),
    );
    assert!(report.unique.is_empty());
}

#[test]
fn test_unreadable_datalake_file_stays_unique() {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    write(lake.path(), "gone.epub", b"same size!");
    write(lib.path(), "kept.epub", b"same size!");

    let records = scan(lake.path());
    fs::remove_file(lake.path().join("gone.epub")).unwrap();

    let report = Analyzer::new(AnalyzerConfig::default()).analyze(
        records,
        scan(lib.path()),
        &HashSet::new(),
    );
    assert_eq!(report.unique.len(), 1);
    assert_eq!(report.summary.stage2_unique, 1);
    assert_eq!(report.summary.hashing.prefix_failures, 1);
}

#[test]
fn test_repeated_analysis_is_idempotent() {
    let (lake, lib) = fixture();
    write(lake.path(), "copies/c-again.mobi", &long_content(b'1'));
    write(lake.path(), "copies/d-again.epub", b"a brand new book");

    let run = || {
        let report = Analyzer::new(AnalyzerConfig::default().with_workers(3)).analyze(
            scan(lake.path()),
            scan(lib.path()),
            &HashSet::new(),
        );
        let unique: Vec<_> = report.unique.iter().map(|r| r.path.clone()).collect();
        let pairs: Vec<_> = report
            .duplicates
            .iter()
            .map(|p| (p.duplicate.path.clone(), p.original.path.clone(), p.method))
            .collect();
        (unique, pairs)
    };

    let (first_unique, first_pairs) = run();
    let (second_unique, second_pairs) = run();
    assert_eq!(first_unique, second_unique);
    assert_eq!(first_pairs, second_pairs);
    assert_eq!(first_pairs.len(), 2);
}
