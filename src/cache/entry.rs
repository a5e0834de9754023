//! Cache entry definitions.
//!
//! An [`AnalysisRecord`] is stored per distinct content hash. Each measured
//! quantity is a [`Metric`], which keeps "the detection step failed" and
//! "the container simply does not carry this value" apart.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::scanner::FileIdentity;

/// Persisted marker for [`Metric::Failed`].
pub const FAILED_MARKER: &str = "ERROR";
/// Persisted marker for [`Metric::Unknown`].
pub const UNKNOWN_MARKER: &str = "N/A";

/// A measured value, a failed measurement, or a value the file does not carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric<T> {
    /// The value was measured or read.
    Value(T),
    /// The step producing this value failed for this input.
    Failed,
    /// The container does not report this value.
    Unknown,
}

impl<T: Copy> Metric<T> {
    /// `Some(value)` when present.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Failed | Self::Unknown => None,
        }
    }

    /// Wrap an optional value, mapping `None` to [`Metric::Unknown`].
    #[must_use]
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Unknown, Self::Value)
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Apply `f` to a present value.
    #[must_use]
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Metric<U> {
        match self {
            Self::Value(v) => Metric::Value(f(v)),
            Self::Failed => Metric::Failed,
            Self::Unknown => Metric::Unknown,
        }
    }

    /// Return `self` when present, otherwise `other`.
    #[must_use]
    pub fn or(self, other: Metric<T>) -> Metric<T> {
        match self {
            Self::Value(_) => self,
            Self::Failed | Self::Unknown => other,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Metric<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => v.fmt(f),
            Self::Failed => f.write_str(FAILED_MARKER),
            Self::Unknown => f.write_str(UNKNOWN_MARKER),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MetricRepr<T> {
    Value(T),
    Marker(String),
}

impl<T: Serialize> Serialize for Metric<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Failed => serializer.serialize_str(FAILED_MARKER),
            Self::Unknown => serializer.serialize_str(UNKNOWN_MARKER),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Metric<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match MetricRepr::<T>::deserialize(deserializer)? {
            MetricRepr::Value(v) => Ok(Self::Value(v)),
            MetricRepr::Marker(m) if m == FAILED_MARKER => Ok(Self::Failed),
            MetricRepr::Marker(m) if m == UNKNOWN_MARKER => Ok(Self::Unknown),
            MetricRepr::Marker(m) => Err(de::Error::custom(format!(
                "unexpected metric marker '{m}', expected a number, \"{FAILED_MARKER}\" or \"{UNKNOWN_MARKER}\""
            ))),
        }
    }
}

/// Analysis result for one distinct file content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Most recently attributed path for this content
    pub path: PathBuf,
    /// File size in bytes when analyzed
    pub size_bytes: u64,
    /// Modification time when analyzed, nanoseconds since the Unix epoch
    pub modified_at: u64,
    /// Playback duration
    pub duration_seconds: Metric<f64>,
    /// Highest frequency carrying sustained energy
    pub max_reliable_frequency_hz: Metric<f64>,
    /// Declared bitrate in bits per second
    pub bitrate_bps: Metric<u32>,
    /// Declared sample rate
    pub sample_rate_hz: Metric<u32>,
    /// Declared bits per sample
    pub bit_depth: Metric<u8>,
    /// Weighted quality rating, 0..=100
    pub rating: u8,
    /// The container could not be parsed at all; metadata fields are
    /// [`Metric::Unknown`] but the record must be retried.
    #[serde(default)]
    pub metadata_failed: bool,
    /// When the analysis ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl AnalysisRecord {
    /// A record for content whose analysis aborted outright.
    ///
    /// Every measured step is marked failed so the next run retries it.
    #[must_use]
    pub fn failed(identity: &FileIdentity) -> Self {
        Self {
            path: identity.path.clone(),
            size_bytes: identity.size_bytes,
            modified_at: identity.modified_at,
            duration_seconds: Metric::Failed,
            max_reliable_frequency_hz: Metric::Failed,
            bitrate_bps: Metric::Unknown,
            sample_rate_hz: Metric::Failed,
            bit_depth: Metric::Unknown,
            rating: 0,
            metadata_failed: true,
            analyzed_at: Some(Utc::now()),
        }
    }

    /// Whether a failed step left an error marker that must be retried.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.duration_seconds.is_failed()
            || self.max_reliable_frequency_hz.is_failed()
            || self.bitrate_bps.is_failed()
            || self.sample_rate_hz.is_failed()
            || self.metadata_failed
    }

    /// Whether this record must be recomputed for the observed identity.
    ///
    /// A record is stale when the size or modification time differ from the
    /// file on disk, or when any step previously failed.
    #[must_use]
    pub fn is_stale_for(&self, identity: &FileIdentity) -> bool {
        self.size_bytes != identity.size_bytes
            || self.modified_at != identity.modified_at
            || self.has_failures()
    }

    /// File name component of the attributed path.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(
                || self.path.to_string_lossy(),
                |name| name.to_string_lossy(),
            )
            .into_owned()
    }

    /// Attributed path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
