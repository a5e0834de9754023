//! Audio decoding to a mono sample stream.
//!
//! Uses symphonia's probe to pick a demuxer and codec for the first playable
//! track, decodes every packet and averages the channels of each frame into a
//! single `f32` sample at the native rate.
//!
//! Decoding honors a [`DecodeLimits`] value: a shared cancellation flag and a
//! per-file deadline, both checked between packets.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Upper bound on the sample buffer reserved from a container's frame count.
const MAX_PREALLOCATED_SAMPLES: usize = 1 << 26;

/// Errors produced while decoding a file.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The file could not be opened
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No demuxer recognized the container
    #[error("Unrecognized container format: {0}")]
    Probe(#[source] SymphoniaError),

    /// The container holds no decodable audio track
    #[error("No decodable audio track found")]
    NoTrack,

    /// A decoder could not be created for the track's codec
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(#[source] SymphoniaError),

    /// Reading or decoding a packet failed irrecoverably
    #[error("Failed to read audio packet: {0}")]
    Packet(#[source] SymphoniaError),

    /// The stream decoded to zero samples
    #[error("Decoded stream contains no samples")]
    Empty,

    /// Neither the track nor the decoded buffers report a sample rate
    #[error("Track has no sample rate")]
    NoSampleRate,

    /// The shared cancellation flag was raised
    #[error("Decoding cancelled")]
    Cancelled,

    /// Decoding exceeded the per-file time limit
    #[error("Decoding exceeded the {0:?} time limit")]
    TimedOut(Duration),
}

/// Mono PCM at the native sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Channel-averaged samples
    pub samples: Vec<f32>,
    /// Native sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the source stream
    pub channels: usize,
}

impl DecodedAudio {
    /// Length of the decoded stream in seconds.
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Cancellation and deadline checks applied between packets and between
/// batches of STFT frames.
#[derive(Debug, Clone, Default)]
pub struct DecodeLimits {
    cancel: Option<Arc<AtomicBool>>,
    deadline: Option<(Instant, Duration)>,
}

impl DecodeLimits {
    /// No cancellation flag and no deadline.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Fail with [`DecodeError::TimedOut`] once `limit` has elapsed from now.
    #[must_use]
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.deadline = Some((Instant::now() + limit, limit));
        self
    }

    /// Whether the shared cancellation flag is raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// `Err` once the flag is raised or the deadline has passed.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Cancelled`] or [`DecodeError::TimedOut`].
    pub fn check(&self) -> Result<(), DecodeError> {
        if self.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }
        match self.deadline {
            Some((deadline, limit)) if Instant::now() >= deadline => {
                Err(DecodeError::TimedOut(limit))
            }
            _ => Ok(()),
        }
    }
}

/// Decode `path` into channel-averaged mono samples.
///
/// Corrupt packets the codec reports as recoverable are skipped; any other
/// failure aborts decoding.
///
/// # Errors
///
/// Returns [`DecodeError`] if the file cannot be opened, probed or decoded,
/// if it contains no samples, or if `limits` cancels the work.
pub fn decode_mono(path: &Path, limits: &DecodeLimits) -> Result<DecodedAudio, DecodeError> {
    limits.check()?;

    let file = File::open(path).map_err(|source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(DecodeError::Probe)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let capacity = track
        .codec_params
        .n_frames
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
        .min(MAX_PREALLOCATED_SAMPLES);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(DecodeError::UnsupportedCodec)?;

    let mut samples: Vec<f32> = Vec::with_capacity(capacity);
    let mut channels = 0usize;

    loop {
        limits.check()?;

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Packet(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::trace!("Skipping corrupt packet in {}: {}", path.display(), msg);
                continue;
            }
            Err(e) => return Err(DecodeError::Packet(e)),
        };

        let spec = *decoded.spec();
        let chans = spec.channels.count();
        if decoded.frames() == 0 || chans == 0 {
            continue;
        }
        channels = chans;
        sample_rate = sample_rate.or(Some(spec.rate));

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);

        let scale = 1.0 / chans as f32;
        samples.extend(
            buf.samples()
                .chunks_exact(chans)
                .map(|frame| frame.iter().sum::<f32>() * scale),
        );
    }

    let sample_rate = sample_rate
        .filter(|&sr| sr > 0)
        .ok_or(DecodeError::NoSampleRate)?;
    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    log::trace!(
        "Decoded {} mono samples at {} Hz from {} ({} channels)",
        samples.len(),
        sample_rate,
        path.display(),
        channels
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}
