//! Sanity statistics for diagnostic sample blocks.
//!
//! Used by the aggregator's diagnostic run to flag sources that look
//! broken. These are sanity checks, not cryptographic proofs of entropy.

mod statistics;
mod threshold;

pub use statistics::{StatisticalTests, UNIFORM_BYTE_VARIANCE};
pub use threshold::{QualityThresholds, SampleLimits, ThresholdViolation};
