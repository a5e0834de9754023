//! Weighted 0..=100 quality rating.
//!
//! Each metric is normalized against a reference value, capped at 1, and
//! weighted. Metrics the container does not report are left out of both the
//! score and the denominator; failed metrics follow one [`FailurePolicy`].

use serde::{Deserialize, Serialize};

use super::AnalysisConfigError;
use crate::cache::Metric;

/// How a [`Metric::Failed`] input contributes to the rating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Score 0 for the metric while keeping its weight in the denominator.
    #[default]
    Zero,
    /// Drop the metric from score and denominator, like an unknown value.
    Exclude,
}

/// Reference value and weight for one rated metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Value at or above which the metric scores full marks
    pub reference: f64,
    /// Relative importance of the metric
    pub weight: f64,
}

impl Criterion {
    #[must_use]
    pub const fn new(reference: f64, weight: f64) -> Self {
        Self { reference, weight }
    }

    fn normalized(&self, value: f64) -> f64 {
        if !value.is_finite() || self.reference <= 0.0 {
            return 0.0;
        }
        (value / self.reference).clamp(0.0, 1.0)
    }
}

/// Rating references, weights and the failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub frequency: Criterion,
    pub bitrate: Criterion,
    pub sample_rate: Criterion,
    pub bit_depth: Criterion,
    pub failure_policy: FailurePolicy,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            frequency: Criterion::new(20_000.0, 40.0),
            bitrate: Criterion::new(320_000.0, 30.0),
            sample_rate: Criterion::new(48_000.0, 20.0),
            bit_depth: Criterion::new(24.0, 10.0),
            failure_policy: FailurePolicy::Zero,
        }
    }
}

/// The four rated metrics for one file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingInputs {
    /// From the spectral detector
    pub max_frequency_hz: Metric<f64>,
    /// From container metadata
    pub bitrate_bps: Metric<u32>,
    /// From the spectral detector (decoded stream)
    pub sample_rate_hz: Metric<u32>,
    /// From container metadata
    pub bit_depth: Metric<u8>,
}

impl RatingConfig {
    /// Check references and weights.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisConfigError`] if a reference is not positive, a
    /// weight is negative or non-finite, or all weights are zero.
    pub fn validate(&self) -> Result<(), AnalysisConfigError> {
        let criteria = [
            ("frequency", &self.frequency),
            ("bitrate", &self.bitrate),
            ("sample_rate", &self.sample_rate),
            ("bit_depth", &self.bit_depth),
        ];

        for (name, c) in criteria {
            if !(c.reference.is_finite() && c.reference > 0.0) {
                return Err(AnalysisConfigError::new(format!(
                    "rating.{name}.reference must be a positive number, got {}",
                    c.reference
                )));
            }
            if !(c.weight.is_finite() && c.weight >= 0.0) {
                return Err(AnalysisConfigError::new(format!(
                    "rating.{name}.weight must be zero or positive, got {}",
                    c.weight
                )));
            }
        }

        if criteria.iter().map(|(_, c)| c.weight).sum::<f64>() <= 0.0 {
            return Err(AnalysisConfigError::new(
                "at least one rating weight must be positive",
            ));
        }
        Ok(())
    }

    /// Compute the rating for one file.
    ///
    /// Always returns a value in `0..=100`; with no active weights the
    /// rating is 0.
    #[must_use]
    pub fn rate(&self, inputs: &RatingInputs) -> u8 {
        let terms = [
            (inputs.max_frequency_hz, &self.frequency),
            (inputs.bitrate_bps.map(f64::from), &self.bitrate),
            (inputs.sample_rate_hz.map(f64::from), &self.sample_rate),
            (inputs.bit_depth.map(f64::from), &self.bit_depth),
        ];

        let mut score = 0.0;
        let mut active_weight = 0.0;
        for (metric, criterion) in terms {
            match metric {
                Metric::Value(v) => {
                    score += criterion.normalized(v) * criterion.weight;
                    active_weight += criterion.weight;
                }
                Metric::Failed => match self.failure_policy {
                    FailurePolicy::Zero => active_weight += criterion.weight,
                    FailurePolicy::Exclude => {}
                },
                Metric::Unknown => {}
            }
        }

        if active_weight <= 0.0 || !active_weight.is_finite() {
            return 0;
        }
        let pct = (score / active_weight * 100.0).round();
        if pct.is_finite() {
            pct.clamp(0.0, 100.0) as u8
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(freq: f64, bitrate: u32, sr: u32, depth: u8) -> RatingInputs {
        RatingInputs {
            max_frequency_hz: Metric::Value(freq),
            bitrate_bps: Metric::Value(bitrate),
            sample_rate_hz: Metric::Value(sr),
            bit_depth: Metric::Value(depth),
        }
    }

    #[test]
    fn test_all_at_reference_is_100() {
        let config = RatingConfig::default();
        assert_eq!(config.rate(&full(20_000.0, 320_000, 48_000, 24)), 100);
        assert_eq!(config.rate(&full(22_050.0, 1_411_000, 96_000, 32)), 100);
    }

    #[test]
    fn test_all_zero_is_0() {
        assert_eq!(RatingConfig::default().rate(&full(0.0, 0, 0, 0)), 0);
    }

    #[test]
    fn test_typical_cd_rip() {
        // 16/24*10 = 6.67, 44100/48000*20 = 18.375, cutoff 21996 and 1411 kbps cap.
        let r = RatingConfig::default().rate(&full(21_996.0, 1_411_000, 44_100, 16));
        assert_eq!(r, 95);
    }

    #[test]
    fn test_lossy_mp3() {
        // 16k cutoff: 32, 128 kbps: 12, 44.1k: 18.375, no bit depth.
        let inputs = RatingInputs {
            bit_depth: Metric::Unknown,
            ..full(16_000.0, 128_000, 44_100, 0)
        };
        // 62.375 / 90
        assert_eq!(RatingConfig::default().rate(&inputs), 69);
    }

    #[test]
    fn test_unknown_is_excluded() {
        let inputs = RatingInputs {
            max_frequency_hz: Metric::Value(20_000.0),
            bitrate_bps: Metric::Unknown,
            sample_rate_hz: Metric::Value(48_000),
            bit_depth: Metric::Unknown,
        };
        assert_eq!(RatingConfig::default().rate(&inputs), 100);
    }

    #[test]
    fn test_failure_policy() {
        let inputs = RatingInputs {
            max_frequency_hz: Metric::Failed,
            ..full(0.0, 320_000, 48_000, 24)
        };
        let zero = RatingConfig::default();
        assert_eq!(zero.rate(&inputs), 60);

        let exclude = RatingConfig {
            failure_policy: FailurePolicy::Exclude,
            ..RatingConfig::default()
        };
        assert_eq!(exclude.rate(&inputs), 100);
    }

    #[test]
    fn test_nothing_known_is_0() {
        let inputs = RatingInputs {
            max_frequency_hz: Metric::Unknown,
            bitrate_bps: Metric::Unknown,
            sample_rate_hz: Metric::Unknown,
            bit_depth: Metric::Unknown,
        };
        assert_eq!(RatingConfig::default().rate(&inputs), 0);
    }

    #[test]
    fn test_non_finite_frequency_scores_zero() {
        let config = RatingConfig::default();
        assert_eq!(config.rate(&full(f64::NAN, 320_000, 48_000, 24)), 60);
        assert_eq!(config.rate(&full(f64::INFINITY, 320_000, 48_000, 24)), 60);
        assert_eq!(config.rate(&full(-5.0, 320_000, 48_000, 24)), 60);
    }

    #[test]
    fn test_validate() {
        assert!(RatingConfig::default().validate().is_ok());

        let mut bad = RatingConfig::default();
        bad.bitrate.reference = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = RatingConfig::default();
        bad.bit_depth.weight = -1.0;
        assert!(bad.validate().is_err());

        let zeros = RatingConfig {
            frequency: Criterion::new(1.0, 0.0),
            bitrate: Criterion::new(1.0, 0.0),
            sample_rate: Criterion::new(1.0, 0.0),
            bit_depth: Criterion::new(1.0, 0.0),
            failure_policy: FailurePolicy::Zero,
        };
        assert!(zeros.validate().is_err());
    }

    #[test]
    fn test_policy_serde_names() {
        assert_eq!(
            serde_json::to_string(&FailurePolicy::Exclude).unwrap(),
            "\"exclude\""
        );
    }
}
