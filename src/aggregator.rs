//! XOR aggregation of independent byte sources.
//!
//! Every output byte is the XOR of one byte from each registered source,
//! so the aggregate is at least as unpredictable as its strongest source.
//! Sources are queried in registration order.

use crate::analysis::{QualityThresholds, StatisticalTests, ThresholdViolation};
use crate::source::{ByteSource, SourceError};
use serde::{Deserialize, Serialize};

/// Default diagnostic sample size per source.
pub const DEFAULT_DIAGNOSTIC_SIZE: usize = 1024;

/// Bytes per hex row in a rendered sample.
const HEX_ROW: usize = 64;

/// Aggregator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Bytes drawn per source by [`Aggregator::run_diagnostic`].
    pub diagnostic_size: usize,
    /// Limits a diagnostic sample must meet to look sane.
    pub thresholds: QualityThresholds,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            diagnostic_size: DEFAULT_DIAGNOSTIC_SIZE,
            thresholds: QualityThresholds::default(),
        }
    }
}

/// Sample block drawn from one source for inspection.
#[derive(Debug, Clone)]
pub struct DiagnosticSample {
    /// Name of the sampled source.
    pub source: String,
    /// The raw sample bytes.
    pub bytes: Vec<u8>,
    /// Sanity statistics of `bytes`.
    pub stats: StatisticalTests,
    /// First threshold the sample violated, if any.
    pub violation: Option<ThresholdViolation>,
}

impl DiagnosticSample {
    /// True if no threshold was violated.
    pub fn looks_sane(&self) -> bool {
        self.violation.is_none()
    }
}

impl std::fmt::Display for DiagnosticSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} ({} bytes): bias={:+.4} variance={:.1} autocorr={:+.4} [{}]",
            self.source,
            self.stats.sample_size,
            self.stats.bit_bias,
            self.stats.variance,
            self.stats.autocorrelation,
            match &self.violation {
                None => "ok".to_string(),
                Some(v) => v.to_string(),
            }
        )?;
        for row in self.bytes.chunks(HEX_ROW) {
            let line: String = row.iter().map(|b| format!("{:02x}", b)).collect();
            writeln!(f, "  {}", line)?;
        }
        Ok(())
    }
}

/// Combines registered byte sources into one stream.
pub struct Aggregator {
    sources: Vec<Box<dyn ByteSource>>,
    config: AggregatorConfig,
    bytes_out: u64,
}

impl Aggregator {
    /// Creates an aggregator with no sources.
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            sources: Vec::new(),
            config,
            bytes_out: 0,
        }
    }

    /// Registers a source. There is no removal.
    pub fn add_source(&mut self, source: Box<dyn ByteSource>) {
        tracing::info!(
            source = source.name(),
            position = self.sources.len(),
            "Registered byte source"
        );
        self.sources.push(source);
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True until the first source is registered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Names of registered sources, in registration order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Total bytes produced by [`fill`](Self::fill).
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Fills `buf` with the XOR of every source, position by position.
    ///
    /// With no sources registered every byte is zero. A failing source
    /// aborts the fill; `buf` contents are then unspecified.
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<(), SourceError> {
        if self.sources.is_empty() {
            tracing::warn!(len = buf.len(), "No byte sources registered; output is all zeros");
        }

        for out in buf.iter_mut() {
            let mut acc = 0u8;
            for source in self.sources.iter_mut() {
                acc ^= source
                    .next_byte()
                    .map_err(|e| e.in_source(source.name()))?;
            }
            *out = acc;
        }

        self.bytes_out += buf.len() as u64;
        tracing::debug!(len = buf.len(), sources = self.sources.len(), "Filled output buffer");
        Ok(())
    }

    /// Draws a sample block from each source for inspection.
    ///
    /// Samples go through `next_byte`, so they consume stream state: bytes
    /// shown here are never part of later output.
    pub fn run_diagnostic(&mut self) -> Result<Vec<DiagnosticSample>, SourceError> {
        let size = self.config.diagnostic_size;
        let mut samples = Vec::with_capacity(self.sources.len());

        for source in self.sources.iter_mut() {
            let bytes = (0..size)
                .map(|_| source.next_byte())
                .collect::<Result<Vec<u8>, _>>()
                .map_err(|e| e.in_source(source.name()))?;

            let stats = StatisticalTests::analyze(&bytes);
            let violation = self.config.thresholds.check(&stats).err();
            if let Some(ref v) = violation {
                tracing::warn!(
                    source = source.name(),
                    violation = %v,
                    "Diagnostic sample looks wrong"
                );
            }

            samples.push(DiagnosticSample {
                source: source.name().to_string(),
                bytes,
                stats,
                violation,
            });
        }

        Ok(samples)
    }

    /// Closes every source. All are attempted; the first error is returned.
    pub fn close(&mut self) -> Result<(), SourceError> {
        let mut first_error = None;
        for source in self.sources.iter_mut() {
            if let Err(e) = source.close() {
                tracing::warn!(source = source.name(), error = %e, "Failed to close source");
                first_error.get_or_insert(e.in_source(source.name()));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("sources", &self.source_names())
            .field("bytes_out", &self.bytes_out)
            .finish()
    }
}
