//! Report writers for analysis results.
//!
//! Every format renders the same rows, one per cached record:
//!
//! | column            | source                                   |
//! |-------------------|------------------------------------------|
//! | `file_name`       | file name of the attributed path         |
//! | `file_size_bytes` | size when analyzed                       |
//! | `duration_s`      | duration, rounded to two decimals        |
//! | `max_freq_hz`     | spectral cutoff                          |
//! | `bitrate`         | declared bitrate, bits per second        |
//! | `samplerate`      | sample rate                              |
//! | `bitdepth`        | bits per sample                          |
//! | `rating`          | 0..=100                                  |
//!
//! Failed values are written as `ERROR` and unreported values as `N/A`.
//! Rows are ordered by rating, best first, then by file name.
//!
//! - [`csv`]: spreadsheet import
//! - [`json`]: automation, with a small summary block
//! - [`html`]: self-contained styled table with rating bands

pub mod csv;
pub mod html;
pub mod json;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{AnalysisRecord, Metric};

pub use self::csv::{CsvOutputError, CsvReport};
pub use self::html::{HtmlOutputError, HtmlReport};
pub use self::json::{JsonOutputError, JsonReport};

/// Supported report formats.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Comma-separated values
    #[default]
    Csv,
    /// JSON document
    Json,
    /// Self-contained HTML page
    Html,
}

impl ReportFormat {
    /// Conventional file extension for the format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Html => "html",
        }
    }
}

/// Quality band used to color ratings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    /// Below 50
    Low,
    /// 50 to 79
    Medium,
    /// 80 to 89
    Good,
    /// 90 and above
    Excellent,
}

impl Band {
    #[must_use]
    pub fn of(rating: u8) -> Self {
        match rating {
            0..=49 => Self::Low,
            50..=79 => Self::Medium,
            80..=89 => Self::Good,
            _ => Self::Excellent,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }
}

/// One report line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub file_name: String,
    pub file_size_bytes: u64,
    pub duration_s: Metric<f64>,
    pub max_freq_hz: Metric<f64>,
    pub bitrate: Metric<u32>,
    pub samplerate: Metric<u32>,
    pub bitdepth: Metric<u8>,
    pub rating: u8,
}

impl ReportRow {
    #[must_use]
    pub fn from_record(record: &AnalysisRecord) -> Self {
        Self {
            file_name: record.file_name(),
            file_size_bytes: record.size_bytes,
            duration_s: record.duration_seconds.map(round2),
            max_freq_hz: record.max_reliable_frequency_hz,
            bitrate: record.bitrate_bps,
            samplerate: record.sample_rate_hz,
            bitdepth: record.bit_depth,
            rating: record.rating,
        }
    }

    #[must_use]
    pub fn band(&self) -> Band {
        Band::of(self.rating)
    }
}

/// Build presentation-ordered rows from cached records.
pub fn rows_from_records<'a, I>(records: I) -> Vec<ReportRow>
where
    I: IntoIterator<Item = &'a AnalysisRecord>,
{
    let mut rows: Vec<ReportRow> = records.into_iter().map(ReportRow::from_record).collect();
    rows.sort_by(|a, b| {
        b.rating
            .cmp(&a.rating)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    rows
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Errors that can occur while writing a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report file could not be created or written
    #[error("Failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] CsvOutputError),

    #[error(transparent)]
    Json(#[from] JsonOutputError),

    #[error(transparent)]
    Html(#[from] HtmlOutputError),
}

/// Render `rows` in `format` to any writer.
///
/// # Errors
///
/// Returns [`ReportError`] if serialization or writing fails.
pub fn render_report<W: Write>(
    rows: &[ReportRow],
    format: ReportFormat,
    writer: &mut W,
) -> Result<(), ReportError> {
    match format {
        ReportFormat::Csv => CsvReport::new(rows).write_to(writer)?,
        ReportFormat::Json => JsonReport::new(rows).write_to(writer)?,
        ReportFormat::Html => HtmlReport::new(rows).write_to(writer)?,
    }
    Ok(())
}

/// Write a report for `records` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be written.
pub fn write_report<'a, I>(path: &Path, format: ReportFormat, records: I) -> Result<usize, ReportError>
where
    I: IntoIterator<Item = &'a AnalysisRecord>,
{
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let rows = rows_from_records(records);
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    render_report(&rows, format, &mut writer)?;
    writer.flush().map_err(io_err)?;

    log::info!(
        "Wrote {} report with {} rows to {}",
        format.extension(),
        rows.len(),
        path.display()
    );
    Ok(rows.len())
}
