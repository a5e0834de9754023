//! Counters for a finished batch run.

use std::time::Duration;

use serde::Serialize;

/// What happened to each candidate in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Candidates found by enumeration
    pub total: usize,
    /// Files decoded and rated this run
    pub analyzed: usize,
    /// Files whose cached record was fresh
    pub skipped: usize,
    /// Files that could not be hashed
    pub unresolved: usize,
    /// Analyzed files whose record carries a failure marker
    pub partial_failures: usize,
    /// Files abandoned because of a shutdown request
    pub cancelled: usize,
    /// Directory entries the walker could not read
    pub scan_errors: usize,
    /// Whether the run was interrupted
    pub interrupted: bool,
    /// Wall-clock time of the run
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl BatchSummary {
    /// Files that reached a final state (analyzed, skipped or unresolved).
    #[must_use]
    pub fn processed(&self) -> usize {
        self.analyzed + self.skipped + self.unresolved
    }

    /// Whether any file ended without a clean record.
    #[must_use]
    pub fn has_issues(&self) -> bool {
        self.unresolved > 0 || self.partial_failures > 0 || self.scan_errors > 0
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
