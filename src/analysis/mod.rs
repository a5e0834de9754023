//! Per-file audio analysis.
//!
//! Turns a resolved [`FileIdentity`] into a complete [`AnalysisRecord`]:
//!
//! - [`decoder`]: symphonia decode to mono samples, with cancellation and a
//!   per-file deadline
//! - [`spectral`]: STFT-based cutoff frequency detection
//! - [`metadata`]: declared bitrate, sample rate, bit depth and duration via lofty
//! - [`rating`]: weighted 0..=100 rating
//!
//! A failing step never aborts the file. It leaves a [`Metric::Failed`]
//! marker in the affected field so the next run retries it, and the rating
//! is computed from whatever is available.

pub mod decoder;
pub mod metadata;
pub mod rating;
pub mod spectral;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::cache::{AnalysisRecord, Metric};
use crate::scanner::FileIdentity;

pub use decoder::{decode_mono, DecodeError, DecodeLimits, DecodedAudio};
pub use metadata::{extract_metadata, AudioMetadata, MetadataError};
pub use rating::{Criterion, FailurePolicy, RatingConfig, RatingInputs};
pub use spectral::{
    max_reliable_frequency, max_reliable_frequency_within, SpectralConfig, SpectralReport,
};

/// Invalid detector or rating parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AnalysisConfigError(String);

impl AnalysisConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Analysis stopped because cancellation was requested. No record is
/// produced, so the file keeps whatever state the cache already had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("analysis cancelled")]
pub struct Cancelled;

/// Produces a record for one resolved file.
///
/// Implementations are shared by every worker thread.
pub trait FileAnalyzer: Send + Sync {
    /// Analyze the file behind `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] only when the run is being interrupted; every
    /// other failure is recorded inside the returned record.
    fn analyze(&self, identity: &FileIdentity) -> Result<AnalysisRecord, Cancelled>;
}

/// Detector, rating and resource parameters for [`AudioAnalyzer`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzerConfig {
    pub spectral: SpectralConfig,
    pub rating: RatingConfig,
    /// Per-file decode time limit
    pub file_timeout: Option<Duration>,
}

impl AnalyzerConfig {
    /// # Errors
    ///
    /// Returns the first invalid parameter found.
    pub fn validate(&self) -> Result<(), AnalysisConfigError> {
        self.spectral.validate()?;
        self.rating.validate()?;
        if self.file_timeout.is_some_and(|t| t.is_zero()) {
            return Err(AnalysisConfigError::new("file timeout must be positive"));
        }
        Ok(())
    }
}

/// The production analyzer: decode, detect, read metadata, rate.
#[derive(Debug, Clone, Default)]
pub struct AudioAnalyzer {
    config: AnalyzerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl AudioAnalyzer {
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            shutdown_flag: None,
        }
    }

    /// Abort in-flight decoding when `flag` is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    #[must_use]
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    fn limits(&self) -> DecodeLimits {
        let mut limits = DecodeLimits::none();
        if let Some(flag) = &self.shutdown_flag {
            limits = limits.with_cancel_flag(Arc::clone(flag));
        }
        if let Some(timeout) = self.config.file_timeout {
            limits = limits.with_timeout(timeout);
        }
        limits
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Outcome of the decode + detect step.
struct Detection {
    max_frequency_hz: Metric<f64>,
    sample_rate_hz: Metric<u32>,
    duration_seconds: Metric<f64>,
}

impl FileAnalyzer for AudioAnalyzer {
    fn analyze(&self, identity: &FileIdentity) -> Result<AnalysisRecord, Cancelled> {
        let path = identity.path.as_path();

        // One deadline covers decoding and both transform passes.
        let limits = self.limits();
        let detection = match decode_mono(path, &limits) {
            Ok(audio) => {
                let max_frequency_hz = match max_reliable_frequency_within(
                    &audio.samples,
                    audio.sample_rate,
                    &self.config.spectral,
                    &limits,
                ) {
                    Ok(report) => Metric::Value(report.max_reliable_frequency_hz),
                    Err(DecodeError::Cancelled) => return Err(Cancelled),
                    Err(e) => {
                        log::warn!("Spectral analysis failed for {}: {}", path.display(), e);
                        Metric::Failed
                    }
                };
                Detection {
                    max_frequency_hz,
                    sample_rate_hz: Metric::Value(audio.sample_rate),
                    duration_seconds: Metric::Value(audio.duration_seconds()),
                }
            }
            Err(DecodeError::Cancelled) => return Err(Cancelled),
            Err(e) => {
                log::warn!("Decode error for {}: {}", path.display(), e);
                Detection {
                    max_frequency_hz: Metric::Failed,
                    sample_rate_hz: Metric::Failed,
                    duration_seconds: Metric::Failed,
                }
            }
        };

        if self.is_cancelled() {
            return Err(Cancelled);
        }

        let (metadata, metadata_failed) = match extract_metadata(path) {
            Ok(metadata) => (metadata, false),
            Err(e) => {
                log::warn!("Metadata error for {}: {}", path.display(), e);
                (AudioMetadata::unknown(), true)
            }
        };

        let rating = self.config.rating.rate(&RatingInputs {
            max_frequency_hz: detection.max_frequency_hz,
            bitrate_bps: metadata.bitrate_bps,
            sample_rate_hz: detection.sample_rate_hz,
            bit_depth: metadata.bit_depth,
        });

        let record = AnalysisRecord {
            path: identity.path.clone(),
            size_bytes: identity.size_bytes,
            modified_at: identity.modified_at,
            duration_seconds: metadata.duration_seconds.or(detection.duration_seconds),
            max_reliable_frequency_hz: detection.max_frequency_hz,
            bitrate_bps: metadata.bitrate_bps,
            sample_rate_hz: metadata.sample_rate_hz.or(detection.sample_rate_hz),
            bit_depth: metadata.bit_depth,
            rating,
            metadata_failed,
            analyzed_at: Some(Utc::now()),
        };

        log::debug!(
            "Analyzed {}: {} Hz, rating {}",
            path.display(),
            record.max_reliable_frequency_hz,
            record.rating
        );
        Ok(record)
    }
}
