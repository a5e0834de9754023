use std::fs;
use std::path::Path;

use clap::Parser;
use hifirate::cache::{CacheStore, CACHE_FILE_NAME};
use hifirate::cli::Cli;
use hifirate::error::ExitCode;
use hifirate::run_app;
use tempfile::tempdir;

use super::fixtures::{write_corrupt, write_library};

fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec!["hifirate", "-q"];
    argv.extend_from_slice(args);
    run_app(Cli::try_parse_from(argv).unwrap())
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_scan_writes_cache_and_json_report() {
    let dir = tempdir().unwrap();
    let library = dir.path().join("library");
    write_library(&library, 3);
    let cache = dir.path().join(CACHE_FILE_NAME);
    let report = dir.path().join("out").join("report.json");

    let code = run(&[
        "scan",
        path_str(&library),
        "--cache",
        path_str(&cache),
        "--report",
        path_str(&report),
        "--format",
        "json",
        "--no-progress",
    ])
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert_eq!(CacheStore::open(&cache).unwrap().len(), 3);

    let parsed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(parsed["summary"]["files"], 3);
    let rows = parsed["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    let ratings: Vec<u64> = rows.iter().map(|r| r["rating"].as_u64().unwrap()).collect();
    assert!(ratings.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_scan_with_failures_is_partial_success() {
    let dir = tempdir().unwrap();
    let library = dir.path().join("library");
    write_library(&library, 2);
    write_corrupt(&library.join("broken.aiff"));
    let cache = dir.path().join(CACHE_FILE_NAME);
    let report = dir.path().join("report.csv");

    let code = run(&[
        "scan",
        path_str(&library),
        "--cache",
        path_str(&cache),
        "--report",
        path_str(&report),
        "--no-progress",
    ])
    .unwrap();

    assert_eq!(code, ExitCode::PartialSuccess);
    let csv = fs::read_to_string(&report).unwrap();
    assert_eq!(csv.lines().count(), 4);
    let broken = csv.lines().find(|l| l.starts_with("broken.aiff")).unwrap();
    assert!(broken.contains("ERROR"));
}

#[test]
fn test_report_failure_keeps_cache_and_can_be_retried() {
    let dir = tempdir().unwrap();
    let library = dir.path().join("library");
    write_library(&library, 2);
    let cache = dir.path().join(CACHE_FILE_NAME);
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"x").unwrap();

    let code = run(&[
        "scan",
        path_str(&library),
        "--cache",
        path_str(&cache),
        "--report",
        path_str(&blocker.join("report.csv")),
        "--no-progress",
    ])
    .unwrap();

    assert_eq!(code, ExitCode::ReportFailed);
    assert_eq!(CacheStore::open(&cache).unwrap().len(), 2);

    let report = dir.path().join("report.html");
    let code = run(&[
        "report",
        "--cache",
        path_str(&cache),
        "--report",
        path_str(&report),
        "--format",
        "html",
    ])
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    let html = fs::read_to_string(&report).unwrap();
    assert!(html.contains("track_000.wav"));
    assert!(html.contains("track_001.wav"));
}

#[test]
fn test_second_scan_skips_everything() {
    let dir = tempdir().unwrap();
    let library = dir.path().join("library");
    write_library(&library, 2);
    let cache = dir.path().join(CACHE_FILE_NAME);
    let report = dir.path().join("report.csv");
    let args = [
        "scan",
        path_str(&library),
        "--cache",
        path_str(&cache),
        "--report",
        path_str(&report),
        "--no-progress",
    ];

    assert_eq!(run(&args).unwrap(), ExitCode::Success);
    let first_cache = fs::read(&cache).unwrap();
    let first_report = fs::read_to_string(&report).unwrap();

    assert_eq!(run(&args).unwrap(), ExitCode::Success);
    assert_eq!(fs::read(&cache).unwrap(), first_cache);
    assert_eq!(fs::read_to_string(&report).unwrap(), first_report);
}

#[test]
fn test_missing_root_is_an_error() {
    let dir = tempdir().unwrap();
    let result = run(&[
        "scan",
        path_str(&dir.path().join("nope")),
        "--no-cache",
        "--no-progress",
    ]);
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("Root path not found"));
}

#[test]
fn test_invalid_config_is_an_error() {
    let dir = tempdir().unwrap();
    write_library(dir.path(), 1);
    let result = run(&[
        "scan",
        path_str(dir.path()),
        "--no-cache",
        "--fft-size",
        "1000",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_inspect_does_not_touch_cache() {
    let dir = tempdir().unwrap();
    let files = write_library(dir.path(), 1);
    let log = dir.path().join("errors.log");

    let code = run(&["--log-file", path_str(&log), "inspect", path_str(&files[0])]).unwrap();
    assert_eq!(code, ExitCode::Success);

    let missing = dir.path().join("missing.wav");
    let code = run(&["--log-file", path_str(&log), "inspect", path_str(&missing)]);
    assert!(code.is_err());
}
