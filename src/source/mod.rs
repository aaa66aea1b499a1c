//! Byte sources feeding the aggregator.
//!
//! Every generator the aggregator can combine implements [`ByteSource`]:
//! it hands out one byte at a time and reports a diagnostic name. The
//! software sources here share one buffering strategy ([`BlockSource`]);
//! the hardware source lives in [`crate::hardware`].

mod buffered;
mod pooled;
mod stretched;

pub use buffered::{BlockSource, DEFAULT_BUFFER_SIZE};
pub use pooled::PooledCsprngSource;
pub use stretched::{HashAlgorithm, StretchedPoolSource, MIN_SEED_LEN};

use crate::hardware::HardwareError;
use thiserror::Error;

/// Errors produced while constructing or drawing from a byte source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Stretcher seed below the minimum length.
    #[error("seed too short: got {got} bytes, need at least {min}")]
    SeedTooShort {
        /// Seed length supplied.
        got: usize,
        /// Minimum accepted length.
        min: usize,
    },
    /// The underlying generator refused to produce bytes.
    #[error("generator failure: {0}")]
    Generator(String),
    /// Hardware stream failure.
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    /// Any of the above, tagged with the source that raised it.
    #[error("source '{source_name}' failed: {reason}")]
    Failed {
        /// Diagnostic name of the failing source.
        source_name: String,
        /// What went wrong.
        #[source]
        reason: Box<SourceError>,
    },
}

impl SourceError {
    /// Attaches the failing source's name.
    pub(crate) fn in_source(self, name: &str) -> Self {
        match self {
            already @ SourceError::Failed { .. } => already,
            other => SourceError::Failed {
                source_name: name.to_string(),
                reason: Box::new(other),
            },
        }
    }
}

/// Anything that can emit one byte on demand.
///
/// Implementations may block (the hardware source refills under a
/// deadline) but must never block indefinitely.
pub trait ByteSource {
    /// Returns the next byte of this source's stream.
    fn next_byte(&mut self) -> Result<u8, SourceError>;

    /// Diagnostic name of the source.
    fn name(&self) -> &str;

    /// Releases any device or process held by the source.
    fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_context_is_not_nested_twice() {
        let err = SourceError::Generator("boom".into())
            .in_source("os")
            .in_source("outer");

        match err {
            SourceError::Failed { source_name, reason } => {
                assert_eq!(source_name, "os");
                assert!(matches!(*reason, SourceError::Generator(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_hardware_error_converts() {
        let err: SourceError = HardwareError::NotOpen.into();
        assert!(matches!(err, SourceError::Hardware(HardwareError::NotOpen)));
    }
}
