//! Command-line interface definitions.
//!
//! # Example
//!
//! ```bash
//! # Analyze a library, writing audio_analysis.csv
//! hifirate scan ~/Music
//!
//! # Only FLAC and WAV, HTML report, 8 workers
//! hifirate scan ~/Music --ext flac --ext wav --format html --workers 8
//!
//! # Rebuild the report from the cache without analyzing anything
//! hifirate report --format json --report quality.json
//!
//! # Analyze a single file and print its record
//! hifirate inspect ~/Music/track.flac
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::analysis::FailurePolicy;
use crate::config::{ConfigOverrides, RatingOverrides, SpectralOverrides};
use crate::output::ReportFormat;
use crate::scanner::AudioExtension;

/// Incremental audio quality rater.
///
/// Measures the highest frequency with sustained energy in each audio file,
/// combines it with bitrate, sample rate and bit depth into a 0-100 rating,
/// and caches results by content hash so unchanged files are never decoded
/// twice.
#[derive(Debug, Parser)]
#[command(name = "hifirate")]
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

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Plain progress output for screen readers (no animation, one line per file)
    #[arg(long, global = true)]
    pub accessible: bool,

    /// Append warnings and errors to this file (default: errors.log beside the cache)
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze every audio file under a directory and write a report
    Scan(ScanArgs),
    /// Regenerate the report from the cache without analyzing
    Report(ReportArgs),
    /// Analyze one file and print its record as JSON
    Inspect(InspectArgs),
}

/// Detector and rating parameters shared by `scan` and `inspect`.
#[derive(Debug, Clone, Default, Args)]
pub struct DetectorArgs {
    /// Per-file decode time limit in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Level relative to the track peak above which a bin counts as present
    #[arg(long, value_name = "DB", allow_negative_numbers = true)]
    pub threshold_db: Option<f64>,

    /// Share of frames a bin must be present in, in (0, 1]
    #[arg(long, value_name = "F")]
    pub min_presence: Option<f64>,

    /// FFT window length (power of two, at least 256)
    #[arg(long, value_name = "N")]
    pub fft_size: Option<usize>,

    /// How failed measurements count in the rating
    #[arg(long, value_enum, value_name = "POLICY")]
    pub failure_policy: Option<FailurePolicy>,

    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl DetectorArgs {
    fn apply(&self, overrides: &mut ConfigOverrides) {
        overrides.file_timeout_secs = self.timeout;
        overrides.spectral = SpectralOverrides {
            threshold_db: self.threshold_db,
            min_presence_fraction: self.min_presence,
            fft_size: self.fft_size,
        };
        overrides.rating = RatingOverrides {
            failure_policy: self.failure_policy,
        };
    }
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Library root to analyze
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Extensions to include (repeatable; default: all supported)
    #[arg(long = "ext", value_enum, value_name = "EXT", ignore_case = true)]
    pub extensions: Vec<AudioExtension>,

    /// Number of worker threads (default: available cores)
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Minimum file size to consider (e.g., 1KB, 1MB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Glob patterns to ignore (can be specified multiple times)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links during the walk
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Path to the analysis cache
    ///
    /// If not specified, a default platform-specific path is used.
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Keep results in memory only; nothing is read or saved
    #[arg(long, conflicts_with = "cache")]
    pub no_cache: bool,

    /// Drop every cached record before scanning
    #[arg(long, conflicts_with = "no_cache")]
    pub clear_cache: bool,

    /// Report file (default: audio_analysis.<format>)
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,

    #[command(flatten)]
    pub detector: DetectorArgs,
}

impl ScanArgs {
    /// Command-line values as the top configuration layer.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            workers: self.workers.map(|w| w as usize),
            extensions: (!self.extensions.is_empty()).then(|| self.extensions.clone()),
            min_size: self.min_size,
            skip_hidden: self.skip_hidden.then_some(true),
            follow_symlinks: self.follow_symlinks.then_some(true),
            ignore_patterns: (!self.ignore_patterns.is_empty())
                .then(|| self.ignore_patterns.clone()),
            cache_path: self.cache.clone(),
            report_path: self.report.clone(),
            report_format: self.format,
            ..Default::default()
        };
        self.detector.apply(&mut overrides);
        overrides
    }
}

/// Arguments for the report subcommand.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Path to the analysis cache
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Report file (default: audio_analysis.<format>)
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ReportArgs {
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            cache_path: self.cache.clone(),
            report_path: self.report.clone(),
            report_format: self.format,
            ..Default::default()
        }
    }
}

/// Arguments for the inspect subcommand.
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Audio file to analyze
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    #[command(flatten)]
    pub detector: DetectorArgs,
}

impl InspectArgs {
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::default();
        self.detector.apply(&mut overrides);
        overrides
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use hifirate::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("1MiB").unwrap(), 1_048_576);
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    if num < 0.0 {
        return Err("Size cannot be negative".to_string());
    }

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
