//! Seedmix: entropy aggregation for key seed generation.
//!
//! Combines several independent randomness sources into one byte stream
//! from which 32-byte key seeds are drawn.
//!
//! # Architecture
//!
//! ```text
//! OS CSPRNG ───────────────────────────────┐
//! human input → collector → stretcher ─────┼─ XOR → aggregator → fill()
//! hardware RNG → worker (fold, deadline) ──┘
//! ```
//!
//! # Design Principles
//!
//! - **XOR of independent sources**: output is no weaker than the best source
//! - **Never hang**: hardware I/O runs on a worker under hard deadlines
//! - **Degrade, don't die**: a source that fails to start is left out
//! - **Nothing persisted**: seeds and pools are wiped when dropped
//!
//! # Example
//!
//! ```no_run
//! use seedmix::{
//!     aggregator::Aggregator,
//!     collector::{completion_channel, CollectorConfig, EntropyPool, InteractiveEntropyCollector},
//!     hardware::{DevicePath, HardwareConfig, SupervisedHardwareStream},
//!     source::{HashAlgorithm, PooledCsprngSource, StretchedPoolSource, DEFAULT_BUFFER_SIZE},
//! };
//!
//! let mut os = PooledCsprngSource::new();
//! let pool = EntropyPool::from_bytes(os.draw(512).unwrap());
//!
//! let mut aggregator = Aggregator::default();
//! aggregator.add_source(Box::new(os));
//!
//! // Fold keystrokes into the pool until the quota is met.
//! let (sink, done) = completion_channel();
//! let mut collector =
//!     InteractiveEntropyCollector::new(pool, &CollectorConfig::keyboard(), sink).unwrap();
//! while !collector.is_complete() {
//!     let mut line = String::new();
//!     std::io::stdin().read_line(&mut line).unwrap();
//!     collector.feed_text(&line);
//! }
//! let pool = done.try_recv().unwrap();
//! aggregator.add_source(Box::new(
//!     StretchedPoolSource::from_pool(pool, HashAlgorithm::Blake3, DEFAULT_BUFFER_SIZE).unwrap(),
//! ));
//!
//! // The hardware source is optional: register it only once it has
//! // opened, kept up the minimum rate and filled its stack.
//! let mut hw =
//!     SupervisedHardwareStream::new(DevicePath::new("/dev/hwrng"), &HardwareConfig::default())
//!         .unwrap();
//! if hw.start().is_ok() {
//!     aggregator.add_source(Box::new(hw));
//! }
//!
//! let mut seed = [0u8; 32];
//! aggregator.fill(&mut seed).unwrap();
//! aggregator.close().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod aggregator;
pub mod analysis;
pub mod collector;
pub mod config;
pub mod hardware;
pub mod source;

// Re-export commonly used types at crate root
pub use aggregator::{Aggregator, AggregatorConfig, DiagnosticSample};
pub use collector::{CollectorConfig, EntropyPool, InputEvent, InteractiveEntropyCollector};
pub use config::FileConfig;
pub use hardware::{HardwareConfig, HardwareError, SupervisedHardwareStream};
pub use source::{ByteSource, PooledCsprngSource, SourceError, StretchedPoolSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
