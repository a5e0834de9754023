use std::fs;
use std::path::PathBuf;

use clap::Parser;
use hifirate::analysis::FailurePolicy;
use hifirate::cli::{Cli, Commands};
use hifirate::config::{Config, ConfigError};
use hifirate::output::ReportFormat;
use hifirate::scanner::AudioExtension;
use tempfile::tempdir;

fn scan_overrides(args: &[&str]) -> hifirate::config::ConfigOverrides {
    let mut argv = vec!["hifirate", "scan", "/music"];
    argv.extend_from_slice(args);
    match Cli::try_parse_from(argv).unwrap().command {
        Commands::Scan(scan) => scan.overrides(),
        _ => panic!("Expected Scan command"),
    }
}

#[test]
fn test_cli_flags_override_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hifirate.toml");
    fs::write(
        &path,
        r#"
workers = 2
extensions = ["flac"]
report_format = "json"
file_timeout_secs = 30

[spectral]
threshold_db = -70.0
min_presence_fraction = 0.1

[rating]
failure_policy = "exclude"
bit_depth = { reference = 32.0, weight = 5.0 }
"#,
    )
    .unwrap();

    let overrides = scan_overrides(&[
        "--workers",
        "5",
        "--ext",
        "wav",
        "--ext",
        "mp3",
        "--threshold-db",
        "-45",
        "--report",
        "quality.json",
    ]);
    let config = Config::load(Some(&path), &overrides).unwrap();

    assert_eq!(config.workers, 5);
    assert_eq!(
        config.extensions,
        vec![AudioExtension::Wav, AudioExtension::Mp3]
    );
    assert_eq!(config.report_format, ReportFormat::Json);
    assert_eq!(config.report_path(), PathBuf::from("quality.json"));
    assert_eq!(config.file_timeout_secs, 30);
    assert_eq!(config.spectral.threshold_db, -45.0);
    assert_eq!(config.spectral.min_presence_fraction, 0.1);
    assert_eq!(config.spectral.fft_size, 4096);
    assert_eq!(config.rating.failure_policy, FailurePolicy::Exclude);
    assert_eq!(config.rating.bit_depth.reference, 32.0);
    assert_eq!(config.rating.frequency.weight, 40.0);

    let analyzer = config.analyzer_config();
    assert_eq!(analyzer.spectral.threshold_db, -45.0);
    assert_eq!(analyzer.file_timeout, Some(std::time::Duration::from_secs(30)));
}

#[test]
fn test_zero_weight_sum_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hifirate.toml");
    fs::write(
        &path,
        r#"
[rating]
frequency = { reference = 20000.0, weight = 0.0 }
bitrate = { reference = 320000.0, weight = 0.0 }
sample_rate = { reference = 48000.0, weight = 0.0 }
bit_depth = { reference = 24.0, weight = 0.0 }
"#,
    )
    .unwrap();

    let err = Config::load(Some(&path), &Default::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_presence_out_of_range_rejected() {
    let overrides = scan_overrides(&["--min-presence", "1.5"]);
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.toml");
    fs::write(&path, "").unwrap();

    let err = Config::load(Some(&path), &overrides).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_malformed_file_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "workers = \"many\"\n").unwrap();

    let err = Config::load(Some(&path), &Default::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
