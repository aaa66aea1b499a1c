//! Pass/fail limits for diagnostic samples.
//!
//! Bias and autocorrelation of an ideal source shrink with the square root
//! of the sample length, so the limits are set in standard errors and
//! resolved per sample. A short sample is judged loosely, a long one
//! tightly, and neither is tuned to one particular diagnostic size.

use super::statistics::{StatisticalTests, UNIFORM_BYTE_VARIANCE};
use serde::{Deserialize, Serialize};

/// How far a diagnostic sample may stray from an ideal source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Allowed bit bias, in standard errors of an ideal `n`-byte sample.
    pub bias_sigmas: f64,
    /// Allowed lag-1 autocorrelation, in standard errors (`1/sqrt(n)`).
    pub autocorrelation_sigmas: f64,
    /// Minimum byte variance as a fraction of a uniform byte's.
    pub min_variance_ratio: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            bias_sigmas: 5.0,
            autocorrelation_sigmas: 5.0,
            min_variance_ratio: 0.5,
        }
    }
}

/// Concrete limits for one sample length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleLimits {
    /// Largest tolerated `|bit_bias|`.
    pub max_bit_bias: f64,
    /// Largest tolerated `|autocorrelation|`.
    pub max_autocorrelation: f64,
    /// Smallest tolerated byte variance.
    pub min_variance: f64,
}

impl QualityThresholds {
    /// Resolves the limits for a sample of `len` bytes.
    pub fn limits_for(&self, len: usize) -> SampleLimits {
        let n = len.max(1) as f64;
        SampleLimits {
            // Each of the 8n bits is a fair coin: sd of the mean is 0.5/sqrt(8n).
            max_bit_bias: self.bias_sigmas * 0.5 / (8.0 * n).sqrt(),
            max_autocorrelation: self.autocorrelation_sigmas / n.sqrt(),
            min_variance: self.min_variance_ratio * UNIFORM_BYTE_VARIANCE,
        }
    }

    /// Checks a sample's statistics against the limits for its length.
    pub fn check(&self, stats: &StatisticalTests) -> Result<(), ThresholdViolation> {
        let limits = self.limits_for(stats.sample_size);

        if stats.bit_bias.abs() > limits.max_bit_bias {
            return Err(ThresholdViolation::BitBias {
                observed: stats.bit_bias,
                limit: limits.max_bit_bias,
            });
        }
        if stats.variance < limits.min_variance {
            return Err(ThresholdViolation::LowVariance {
                observed: stats.variance,
                limit: limits.min_variance,
            });
        }
        if stats.autocorrelation.abs() > limits.max_autocorrelation {
            return Err(ThresholdViolation::HighAutocorrelation {
                observed: stats.autocorrelation,
                limit: limits.max_autocorrelation,
            });
        }
        Ok(())
    }
}

/// The first limit a sample broke, with the observed value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ThresholdViolation {
    /// Too many or too few set bits.
    #[error("bit bias {observed:+.4} outside ±{limit:.4}")]
    BitBias {
        /// Measured bias.
        observed: f64,
        /// Limit for this sample length.
        limit: f64,
    },

    /// Byte values bunched together.
    #[error("variance {observed:.1} below {limit:.1}")]
    LowVariance {
        /// Measured variance.
        observed: f64,
        /// Required minimum.
        limit: f64,
    },

    /// Neighbouring bytes predict each other.
    #[error("autocorrelation {observed:+.4} outside ±{limit:.4}")]
    HighAutocorrelation {
        /// Measured lag-1 autocorrelation.
        observed: f64,
        /// Limit for this sample length.
        limit: f64,
    },
}
