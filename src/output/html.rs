//! HTML report writer.
//!
//! Renders a self-contained page through the `askama` template in
//! `templates/report.html`. All CSS is embedded, ratings are colored by
//! [`Band`], and `ERROR` / `N/A` cells get their own classes so they stand
//! out from measured values. File names are escaped by the template engine.

use std::io::Write;

use askama::Template;
use bytesize::ByteSize;
use chrono::Local;

use super::json::JsonSummary;
use super::{Band, ReportRow};
use crate::cache::Metric;

/// Complete HTML output structure for the Askama template.
#[derive(Template)]
#[template(path = "report.html")]
pub struct HtmlReport {
    /// Formatted generation timestamp
    pub timestamp: String,
    pub version: String,
    pub summary: JsonSummary,
    /// Mean rating, preformatted
    pub average_rating: String,
    pub rows: Vec<HtmlRow>,
}

/// A table cell with an optional marker class.
pub struct HtmlCell {
    pub text: String,
    /// Unformatted value (or marker), shown as the cell tooltip
    pub raw: String,
    /// `cell-error`, `cell-na` or empty
    pub class: &'static str,
}

impl HtmlCell {
    fn from_metric<T: Copy + std::fmt::Display>(
        metric: Metric<T>,
        fmt: impl FnOnce(T) -> String,
    ) -> Self {
        let raw = metric.to_string();
        match metric {
            Metric::Value(v) => Self {
                text: fmt(v),
                raw,
                class: "",
            },
            Metric::Failed => Self {
                text: raw.clone(),
                raw,
                class: "cell-error",
            },
            Metric::Unknown => Self {
                text: raw.clone(),
                raw,
                class: "cell-na",
            },
        }
    }
}

/// A report row formatted for HTML presentation.
pub struct HtmlRow {
    pub file_name: String,
    /// Human-readable size
    pub size: String,
    pub size_bytes: u64,
    pub duration: HtmlCell,
    pub max_freq: HtmlCell,
    pub bitrate: HtmlCell,
    pub samplerate: HtmlCell,
    pub bitdepth: HtmlCell,
    pub rating: u8,
    /// CSS class for the rating band
    pub band: &'static str,
}

impl HtmlRow {
    fn from_row(row: &ReportRow) -> Self {
        Self {
            file_name: row.file_name.clone(),
            size: ByteSize::b(row.file_size_bytes).to_string(),
            size_bytes: row.file_size_bytes,
            duration: HtmlCell::from_metric(row.duration_s, format_duration),
            max_freq: HtmlCell::from_metric(row.max_freq_hz, |hz| format!("{hz:.0} Hz")),
            bitrate: HtmlCell::from_metric(row.bitrate, |bps| format!("{} kbps", bps / 1000)),
            samplerate: HtmlCell::from_metric(row.samplerate, |hz| format!("{hz} Hz")),
            bitdepth: HtmlCell::from_metric(row.bitdepth, |bits| format!("{bits}-bit")),
            rating: row.rating,
            band: band_class(row.band()),
        }
    }
}

fn band_class(band: Band) -> &'static str {
    match band {
        Band::Low => "band-low",
        Band::Medium => "band-medium",
        Band::Good => "band-good",
        Band::Excellent => "band-excellent",
    }
}

/// Format seconds as `m:ss`, or `h:mm:ss` past an hour.
fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

impl HtmlReport {
    #[must_use]
    pub fn new(rows: &[ReportRow]) -> Self {
        let summary = JsonSummary::from_rows(rows);
        let average_rating = summary
            .average_rating
            .map_or_else(|| "-".to_string(), |avg| format!("{avg:.1}"));

        Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            summary,
            average_rating,
            rows: rows.iter().map(HtmlRow::from_row).collect(),
        }
    }

    /// Generate the HTML string using the embedded template.
    ///
    /// # Errors
    ///
    /// Returns an error if template rendering fails.
    pub fn to_html(&self) -> Result<String, askama::Error> {
        self.render()
    }

    /// Write HTML report to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), HtmlOutputError> {
        let html = self.to_html()?;
        writer.write_all(html.as_bytes())?;
        Ok(())
    }
}

/// Errors that can occur during HTML output generation.
#[derive(thiserror::Error, Debug)]
pub enum HtmlOutputError {
    /// Template rendering error
    #[error("HTML template error: {0}")]
    Template(#[from] askama::Error),

    /// I/O error during writing
    #[error("I/O error during HTML generation: {0}")]
    Io(#[from] std::io::Error),
}
