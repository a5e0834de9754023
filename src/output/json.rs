//! JSON report writer.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "generated_at": "2026-01-01T12:00:00Z",
//!   "version": "0.1.0",
//!   "summary": {
//!     "files": 3,
//!     "average_rating": 65.3,
//!     "files_with_errors": 1,
//!     "bands": { "low": 1, "medium": 1, "good": 0, "excellent": 1 }
//!   },
//!   "rows": [
//!     {
//!       "file_name": "track.flac",
//!       "file_size_bytes": 31457280,
//!       "duration_s": 182.46,
//!       "max_freq_hz": 21996.0,
//!       "bitrate": 1411000,
//!       "samplerate": 44100,
//!       "bitdepth": 16,
//!       "rating": 95
//!     }
//!   ]
//! }
//! ```

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Band, ReportRow};

/// Per-band row counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BandCounts {
    pub low: usize,
    pub medium: usize,
    pub good: usize,
    pub excellent: usize,
}

/// Aggregate figures over all rows.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Number of rows
    pub files: usize,
    /// Mean rating, one decimal; `None` for an empty report
    pub average_rating: Option<f64>,
    /// Rows with at least one `ERROR` cell
    pub files_with_errors: usize,
    pub bands: BandCounts,
}

impl JsonSummary {
    #[must_use]
    pub fn from_rows(rows: &[ReportRow]) -> Self {
        let mut bands = BandCounts::default();
        for row in rows {
            match row.band() {
                Band::Low => bands.low += 1,
                Band::Medium => bands.medium += 1,
                Band::Good => bands.good += 1,
                Band::Excellent => bands.excellent += 1,
            }
        }

        let average_rating = (!rows.is_empty()).then(|| {
            let sum: f64 = rows.iter().map(|r| f64::from(r.rating)).sum();
            (sum / rows.len() as f64 * 10.0).round() / 10.0
        });

        let files_with_errors = rows
            .iter()
            .filter(|r| {
                r.duration_s.is_failed()
                    || r.max_freq_hz.is_failed()
                    || r.bitrate.is_failed()
                    || r.samplerate.is_failed()
                    || r.bitdepth.is_failed()
            })
            .count();

        Self {
            files: rows.len(),
            average_rating,
            files_with_errors,
            bands,
        }
    }
}

/// Complete JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: DateTime<Utc>,
    /// Version of the tool that wrote the report
    pub version: &'static str,
    pub summary: JsonSummary,
    pub rows: &'a [ReportRow],
}

impl<'a> JsonReport<'a> {
    /// Build a report over `rows`, stamped with the current time.
    ///
    /// # Example
    ///
    /// ```
    /// use hifirate::output::json::JsonReport;
    ///
    /// let report = JsonReport::new(&[]);
    /// assert_eq!(report.summary.files, 0);
    /// assert!(report.summary.average_rating.is_none());
    /// ```
    #[must_use]
    pub fn new(rows: &'a [ReportRow]) -> Self {
        Self {
            generated_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
            summary: JsonSummary::from_rows(rows),
            rows,
        }
    }

    /// Serialize to a pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty-printed JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), JsonOutputError> {
        let json = self.to_json_pretty()?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
