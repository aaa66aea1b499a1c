//! Supervised hardware random-number streams.
//!
//! A hardware RNG is read through a blocking byte stream (a device node or
//! an external process). Every blocking step runs on a worker thread under
//! a wall-clock deadline, reads are XOR-folded to thin out per-read bias,
//! and the folded bytes are buffered in a locked, bounded stack. Live
//! sources must also sustain a minimum throughput before they are used.

mod opener;
mod rate;
mod stack;
mod stream;
mod supervisor;

pub use opener::{ByteStream, DevicePath, ExternalCommand, StreamOpener};
pub use rate::RateSample;
pub use stack::{FoldStack, DEFAULT_STACK_SIZE};
pub use stream::{HardwareConfig, StreamState, SupervisedHardwareStream};
pub use supervisor::Operation;

use std::time::Duration;
use thiserror::Error;

/// Errors from opening, refilling or closing a hardware stream.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// The locator exists but may not be opened.
    #[error("permission denied opening {0}")]
    PermissionDenied(String),
    /// The locator does not exist or could not be started.
    #[error("hardware source unavailable: {0}")]
    Unavailable(String),
    /// End of data before a full read.
    #[error("stream ended mid-read ({got} of {want} bytes); source too slow or inconsistent")]
    StreamExhausted {
        /// Bytes read before the end.
        got: usize,
        /// Bytes the read asked for.
        want: usize,
    },
    /// Read failure reported by the stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The caller stopped waiting; the job was cancelled.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that ran out of time.
        operation: Operation,
        /// Deadline that passed.
        after: Duration,
    },
    /// Measured throughput below the configured minimum.
    #[error("source too slow: {bits_per_sec} bps, need at least {min} bps")]
    TooSlow {
        /// Measured rate.
        bits_per_sec: u64,
        /// Configured minimum.
        min: u64,
    },
    /// Read or rate check requested on a closed stream.
    #[error("hardware stream is not open")]
    NotOpen,
    /// The job saw its cancel token; only the worker observes this.
    #[error("operation cancelled after its deadline")]
    Cancelled,
    /// Nothing to pop even though the refill reported success.
    #[error("fold stack empty after a successful refill")]
    Underflow,
    /// The worker thread is gone, so no job can run.
    #[error("hardware worker thread has exited")]
    WorkerGone,
    /// Folding, buffering or rate settings are inconsistent.
    #[error("invalid hardware configuration: {0}")]
    InvalidConfig(String),
    /// The worker thread could not be created.
    #[error("failed to spawn hardware worker: {0}")]
    Spawn(#[source] std::io::Error),
}
