//! CSV report writer.
//!
//! One line per record with a header row. Metric columns hold either the
//! number or one of the `ERROR` / `N/A` markers.
//!
//! # Example
//!
//! ```
//! use hifirate::output::csv::CsvReport;
//!
//! let csv = CsvReport::new(&[]).to_string().unwrap();
//! assert!(csv.is_empty());
//! ```

use std::io;

use thiserror::Error;

use super::ReportRow;

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// CSV report formatter.
pub struct CsvReport<'a> {
    rows: &'a [ReportRow],
}

impl<'a> CsvReport<'a> {
    #[must_use]
    pub fn new(rows: &'a [ReportRow]) -> Self {
        Self { rows }
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in self.rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
