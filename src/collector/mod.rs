//! Interactive entropy collection.
//!
//! Human input (pointer motion or keystrokes) is weak entropy per sample
//! but strong in aggregate. The collector folds timing/position samples
//! into a fixed-size pool through a digest and, once the sample quota is
//! reached, hands the pool over exactly once for stretching.

mod fold;
mod interactive;
mod pool;

pub use fold::{FoldDigest, FoldState, DIGEST_LEN};
pub use interactive::{
    completion_channel, CollectorConfig, CollectorState, CompletionReceiver, CompletionSink,
    Feed, InputEvent, InteractiveEntropyCollector, Progress,
};
pub use pool::{EntropyPool, DEFAULT_SEED_SIZE};

use thiserror::Error;

/// Collector construction errors. All of them are fatal for collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// No fold digest by that name.
    #[error("fold digest '{0}' is not available")]
    DigestUnavailable(String),
    /// The pool cannot be tiled by digest-sized windows.
    #[error("pool size {len} is not a positive multiple of the digest length {digest_len}")]
    InvalidPoolSize {
        /// Pool length in bytes.
        len: usize,
        /// Fold digest output length.
        digest_len: usize,
    },
    /// Zero samples requested.
    #[error("sample quota must be at least 1")]
    InvalidQuota,
}
