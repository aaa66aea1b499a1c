//! File configuration.
//!
//! Every section is optional; missing sections and fields fall back to the
//! built-in defaults.

use crate::aggregator::AggregatorConfig;
use crate::collector::{CollectorConfig, FoldDigest};
use crate::hardware::HardwareConfig;
use crate::source::{HashAlgorithm, DEFAULT_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The file is not valid TOML for this layout.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
    /// Values parse but contradict each other.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the buffered software sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Block size drawn per refill (BUFFERSIZE).
    pub buffer_size: usize,
    /// Hash used to key the stretcher from the collected pool.
    pub stretch_hash: HashAlgorithm,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            stretch_hash: HashAlgorithm::default(),
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[collector]`: interactive entropy collection.
    #[serde(default)]
    pub collector: CollectorConfig,
    /// `[sources]`: buffered software sources.
    #[serde(default)]
    pub sources: SourceConfig,
    /// `[hardware]`: optional hardware RNG.
    #[serde(default)]
    pub hardware: HardwareConfig,
    /// `[aggregate]`: diagnostics.
    #[serde(default)]
    pub aggregate: AggregatorConfig,
}

impl FileConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        let config: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints the individual sections cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let digest = FoldDigest::from_name(&self.collector.digest)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let seed_size = self.collector.seed_size;
        if seed_size == 0 || seed_size % digest.output_len() != 0 {
            return Err(ConfigError::Invalid(format!(
                "collector.seed_size {} must be a positive multiple of {}",
                seed_size,
                digest.output_len()
            )));
        }
        if seed_size < crate::source::MIN_SEED_LEN {
            return Err(ConfigError::Invalid(format!(
                "collector.seed_size {} is below the stretcher minimum {}",
                seed_size,
                crate::source::MIN_SEED_LEN
            )));
        }
        if self.collector.samples == 0 {
            return Err(ConfigError::Invalid("collector.samples must be at least 1".into()));
        }
        if self.sources.buffer_size == 0 {
            return Err(ConfigError::Invalid("sources.buffer_size must be at least 1".into()));
        }
        self.hardware
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}
