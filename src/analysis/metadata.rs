//! Container metadata extraction.
//!
//! Reads the technical properties a container declares (bitrate, sample rate,
//! bit depth, duration) with lofty. Nothing is decoded here; a field the
//! container does not carry is reported as [`Metric::Unknown`].

use std::path::{Path, PathBuf};

use lofty::file::AudioFile;
use lofty::probe::Probe;
use thiserror::Error;

use crate::cache::Metric;

/// The container could not be parsed at all.
#[derive(Debug, Error)]
#[error("Failed to read audio properties of {path}: {source}")]
pub struct MetadataError {
    pub path: PathBuf,
    #[source]
    pub source: lofty::error::LoftyError,
}

/// Declared technical properties of one file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioMetadata {
    /// Bits per second
    pub bitrate_bps: Metric<u32>,
    pub sample_rate_hz: Metric<u32>,
    pub bit_depth: Metric<u8>,
    /// Container-declared playback duration
    pub duration_seconds: Metric<f64>,
}

impl AudioMetadata {
    /// Every field [`Metric::Unknown`].
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            bitrate_bps: Metric::Unknown,
            sample_rate_hz: Metric::Unknown,
            bit_depth: Metric::Unknown,
            duration_seconds: Metric::Unknown,
        }
    }
}

/// Read the declared properties of `path`.
///
/// Bitrate prefers the audio stream bitrate and falls back to the overall
/// file bitrate; lofty reports both in kbps. Zero values are treated as not
/// reported.
///
/// # Errors
///
/// Returns [`MetadataError`] if lofty cannot open or parse the container.
pub fn extract_metadata(path: &Path) -> Result<AudioMetadata, MetadataError> {
    let wrap = |source| MetadataError {
        path: path.to_path_buf(),
        source,
    };

    let tagged = Probe::open(path)
        .map_err(wrap)?
        .guess_file_type()
        .map_err(|e| wrap(e.into()))?
        .read()
        .map_err(wrap)?;
    let props = tagged.properties();

    let bitrate_kbps = props
        .audio_bitrate()
        .filter(|&b| b > 0)
        .or_else(|| props.overall_bitrate().filter(|&b| b > 0));
    let duration = props.duration().as_secs_f64();

    Ok(AudioMetadata {
        bitrate_bps: Metric::from_option(bitrate_kbps.map(|kbps| kbps.saturating_mul(1000))),
        sample_rate_hz: Metric::from_option(props.sample_rate().filter(|&sr| sr > 0)),
        bit_depth: Metric::from_option(props.bit_depth().filter(|&d| d > 0)),
        duration_seconds: Metric::from_option((duration > 0.0).then_some(duration)),
    })
}
