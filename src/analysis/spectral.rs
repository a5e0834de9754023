//! Spectral cutoff detection.
//!
//! Lossy encoders discard content above a codec-specific frequency, and that
//! ceiling survives transcoding back to a lossless container. This module
//! finds the highest frequency that carries energy for a meaningful share of
//! the track:
//!
//! 1. Short-time Fourier transform of the mono signal with a Hann window,
//!    centered frames (the signal is zero-padded by half a window on both
//!    sides) and a hop of a quarter window.
//! 2. Every bin magnitude is converted to dB relative to the loudest bin of
//!    the whole track, with an amplitude floor of [`AMPLITUDE_FLOOR`].
//! 3. A bin is *present* in a frame when its level is above the threshold.
//!    The highest bin present in at least `min_presence_fraction` of the
//!    frames is the cutoff.
//!
//! The transform runs twice over the signal (once for the global peak, once
//! to count presence) so memory stays proportional to the window size rather
//! than to `bins x frames`. [`max_reliable_frequency_within`] checks a
//! [`DecodeLimits`] every [`FRAMES_PER_CHECK`] frames so a per-file deadline
//! also bounds the transform.

use std::sync::Arc;

use apodize::hanning_iter;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::decoder::{DecodeError, DecodeLimits};
use super::AnalysisConfigError;

/// Amplitude floor applied before the dB conversion. A track whose peak does
/// not exceed it is treated as silent.
pub const AMPLITUDE_FLOOR: f32 = 1e-5;

/// Smallest accepted FFT size.
pub const MIN_FFT_SIZE: usize = 256;
/// Largest accepted FFT size.
pub const MAX_FFT_SIZE: usize = 1 << 16;

/// Frames transformed between two limit checks.
pub const FRAMES_PER_CHECK: usize = 64;

/// Detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Level relative to the track peak above which a bin counts as present
    pub threshold_db: f64,
    /// Share of frames in which a bin must be present, in `(0, 1]`
    pub min_presence_fraction: f64,
    /// Window length in samples, a power of two
    pub fft_size: usize,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            threshold_db: -60.0,
            min_presence_fraction: 0.05,
            fft_size: 4096,
        }
    }
}

impl SpectralConfig {
    /// Distance between consecutive frames.
    #[must_use]
    pub fn hop(&self) -> usize {
        (self.fft_size / 4).max(1)
    }

    /// # Errors
    ///
    /// Returns [`AnalysisConfigError`] for a non power-of-two or out of range
    /// FFT size, a presence fraction outside `(0, 1]` or a non-finite threshold.
    pub fn validate(&self) -> Result<(), AnalysisConfigError> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(AnalysisConfigError::new(format!(
                "spectral.fft_size must be a power of two between {MIN_FFT_SIZE} and {MAX_FFT_SIZE}, got {}",
                self.fft_size
            )));
        }
        if !(self.min_presence_fraction > 0.0 && self.min_presence_fraction <= 1.0) {
            return Err(AnalysisConfigError::new(format!(
                "spectral.min_presence_fraction must be in (0, 1], got {}",
                self.min_presence_fraction
            )));
        }
        if !self.threshold_db.is_finite() {
            return Err(AnalysisConfigError::new(
                "spectral.threshold_db must be a finite number",
            ));
        }
        Ok(())
    }
}

/// Result of one detector run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralReport {
    /// Highest reliably present frequency, 0 for silence
    pub max_reliable_frequency_hz: f64,
    /// Number of STFT frames analyzed
    pub frames: usize,
    /// Largest bin magnitude over the whole track
    pub peak_magnitude: f32,
}

/// Reusable STFT state for one signal.
struct Stft<'a> {
    samples: &'a [f32],
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    fft_size: usize,
    hop: usize,
}

impl<'a> Stft<'a> {
    fn new(samples: &'a [f32], config: &SpectralConfig) -> Self {
        let fft_size = config.fft_size;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        // Periodic Hann: the symmetric window of length N + 1 without its last point.
        let window: Vec<f32> = hanning_iter(fft_size + 1)
            .take(fft_size)
            .map(|w| w as f32)
            .collect();

        Self {
            samples,
            fft,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            fft_size,
            hop: config.hop(),
        }
    }

    fn frame_count(&self) -> usize {
        1 + self.samples.len() / self.hop
    }

    fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Run the transform over every frame, passing the non-negative
    /// frequency half of each spectrum to `visit`.
    fn for_each_frame<F: FnMut(&[Complex<f32>])>(
        &mut self,
        limits: &DecodeLimits,
        mut visit: F,
    ) -> Result<(), DecodeError> {
        let pad = self.fft_size / 2;
        let bins = self.bins();
        let samples = self.samples;

        for frame in 0..self.frame_count() {
            if frame % FRAMES_PER_CHECK == 0 {
                limits.check()?;
            }
            let center = frame * self.hop;
            for (i, (slot, w)) in self.buffer.iter_mut().zip(&self.window).enumerate() {
                // Sample index relative to the unpadded signal.
                let sample = (center + i)
                    .checked_sub(pad)
                    .and_then(|idx| samples.get(idx))
                    .copied()
                    .unwrap_or(0.0);
                *slot = Complex::new(sample * w, 0.0);
            }
            self.fft
                .process_with_scratch(&mut self.buffer, &mut self.scratch);
            visit(&self.buffer[..bins]);
        }
        Ok(())
    }
}

/// Detect the highest reliably present frequency of a mono signal.
#[must_use]
pub fn max_reliable_frequency(
    samples: &[f32],
    sample_rate: u32,
    config: &SpectralConfig,
) -> SpectralReport {
    // Without a flag or a deadline the limits never trip.
    max_reliable_frequency_within(samples, sample_rate, config, &DecodeLimits::none())
        .unwrap_or(SpectralReport {
            max_reliable_frequency_hz: 0.0,
            frames: 0,
            peak_magnitude: 0.0,
        })
}

/// [`max_reliable_frequency`] bounded by `limits`.
///
/// # Errors
///
/// Returns [`DecodeError::Cancelled`] or [`DecodeError::TimedOut`] when
/// `limits` trip before both passes complete.
pub fn max_reliable_frequency_within(
    samples: &[f32],
    sample_rate: u32,
    config: &SpectralConfig,
    limits: &DecodeLimits,
) -> Result<SpectralReport, DecodeError> {
    if samples.is_empty() || sample_rate == 0 {
        return Ok(SpectralReport {
            max_reliable_frequency_hz: 0.0,
            frames: 0,
            peak_magnitude: 0.0,
        });
    }

    let mut stft = Stft::new(samples, config);
    let frames = stft.frame_count();

    let mut peak = 0.0f32;
    stft.for_each_frame(limits, |spectrum| {
        for bin in spectrum {
            peak = peak.max(bin.norm());
        }
    })?;

    if peak <= AMPLITUDE_FLOOR {
        log::trace!("Signal peak {peak:e} at or below floor, treating as silent");
        return Ok(SpectralReport {
            max_reliable_frequency_hz: 0.0,
            frames,
            peak_magnitude: peak,
        });
    }

    // 20*log10(max(m, floor) / peak) > threshold, rearranged to avoid a log per bin.
    let linear_threshold = peak * 10f32.powf(config.threshold_db as f32 / 20.0);
    let mut counts = vec![0usize; stft.bins()];
    stft.for_each_frame(limits, |spectrum| {
        for (count, bin) in counts.iter_mut().zip(spectrum) {
            if bin.norm().max(AMPLITUDE_FLOOR) > linear_threshold {
                *count += 1;
            }
        }
    })?;

    let presence = presence_fractions(&counts, frames);
    let hz = highest_reliable_bin(&presence, config.min_presence_fraction)
        .map_or(0.0, |bin| bin_frequency(bin, sample_rate, config.fft_size));

    log::trace!(
        "Spectral cutoff {:.1} Hz over {} frames (peak {:.3})",
        hz,
        frames,
        peak
    );

    Ok(SpectralReport {
        max_reliable_frequency_hz: hz,
        frames,
        peak_magnitude: peak,
    })
}

/// Share of frames in which each bin was present.
#[must_use]
pub fn presence_fractions(counts: &[usize], frames: usize) -> Vec<f64> {
    if frames == 0 {
        return vec![0.0; counts.len()];
    }
    counts
        .iter()
        .map(|&c| c as f64 / frames as f64)
        .collect()
}

/// Index of the highest bin whose presence reaches `min_fraction` (inclusive).
#[must_use]
pub fn highest_reliable_bin(presence: &[f64], min_fraction: f64) -> Option<usize> {
    presence.iter().rposition(|&p| p >= min_fraction)
}

/// Center frequency of bin `k`.
#[must_use]
pub fn bin_frequency(bin: usize, sample_rate: u32, fft_size: usize) -> f64 {
    bin as f64 * f64::from(sample_rate) / fft_size as f64
}
