//! Sample-driven collector state machine.

use super::{CollectorError, EntropyPool, FoldDigest, FoldState, DEFAULT_SEED_SIZE};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Configuration for interactive collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Samples required before the pool is complete.
    pub samples: u32,
    /// Minimum time between accepted samples, in milliseconds.
    pub min_interval_ms: u64,
    /// Name of the fold digest.
    pub digest: String,
    /// Pool size in bytes.
    pub seed_size: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            samples: 512,
            min_interval_ms: 20,
            digest: "md5".to_string(),
            seed_size: DEFAULT_SEED_SIZE,
        }
    }
}

impl CollectorConfig {
    /// Settings for keystroke collection: every key counts.
    pub fn keyboard() -> Self {
        Self {
            samples: 100,
            min_interval_ms: 0,
            ..Default::default()
        }
    }

    /// Minimum spacing between accepted samples.
    #[inline]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// One event from the human input channel.
#[derive(Debug, Clone, Copy)]
pub enum InputEvent {
    /// Pointer moved to `(x, y)`.
    Pointer { x: u32, y: u32, at: Instant },
    /// A key producing `byte` was pressed.
    Key { byte: u8, at: Instant },
}

impl InputEvent {
    fn at(&self) -> Instant {
        match *self {
            InputEvent::Pointer { at, .. } | InputEvent::Key { at, .. } => at,
        }
    }
}

/// Collection progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Samples folded so far.
    pub samples: u32,
    /// Samples required to complete.
    pub quota: u32,
}

impl Progress {
    /// Percentage of the quota collected, 0..=100.
    pub fn percent(&self) -> u8 {
        if self.quota == 0 {
            return 100;
        }
        ((u64::from(self.samples) * 100) / u64::from(self.quota)).min(100) as u8
    }
}

/// Outcome of feeding one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Arrived before the minimum interval elapsed; not folded.
    Ignored,
    /// Folded into the pool.
    Accepted(Progress),
    /// Folded, and the quota is now met. The pool has been handed off.
    Completed(Progress),
    /// Collection had already finished.
    AlreadyComplete,
}

/// Collector lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Accepting samples; the collector owns the pool.
    Collecting,
    /// Quota met; the pool went to the completion sink.
    Complete,
}

/// Receives the finished pool, exactly once.
pub trait CompletionSink: Send {
    /// Takes ownership of the finished pool.
    fn on_complete(self: Box<Self>, pool: EntropyPool);
}

impl<F> CompletionSink for F
where
    F: FnOnce(EntropyPool) + Send,
{
    fn on_complete(self: Box<Self>, pool: EntropyPool) {
        (*self)(pool)
    }
}

/// Receiving half of [`completion_channel`].
#[derive(Debug)]
pub struct CompletionReceiver {
    rx: mpsc::Receiver<EntropyPool>,
}

impl CompletionReceiver {
    /// Returns the pool if collection has completed.
    pub fn try_recv(&self) -> Option<EntropyPool> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout` for the pool.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<EntropyPool> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// One-shot handoff: a sink for the collector and the matching receiver.
pub fn completion_channel() -> (impl CompletionSink, CompletionReceiver) {
    let (tx, rx) = mpsc::sync_channel(1);
    let sink = move |pool: EntropyPool| {
        if tx.send(pool).is_err() {
            tracing::warn!("Completion receiver dropped before the pool was delivered");
        }
    };
    (sink, CompletionReceiver { rx })
}

/// Folds human input samples into an entropy pool.
pub struct InteractiveEntropyCollector {
    pool: Option<EntropyPool>,
    fold: FoldState,
    sink: Option<Box<dyn CompletionSink>>,
    quota: u32,
    samples: u32,
    min_interval: Duration,
    started: Instant,
    last_accepted: Option<Instant>,
}

impl InteractiveEntropyCollector {
    /// Starts collection over `pool`.
    ///
    /// Fails if the configured digest is unavailable, the pool length is not
    /// a positive multiple of the digest length, or the quota is zero.
    pub fn new(
        pool: EntropyPool,
        config: &CollectorConfig,
        sink: impl CompletionSink + 'static,
    ) -> Result<Self, CollectorError> {
        let digest = FoldDigest::from_name(&config.digest)?;
        let digest_len = digest.output_len();
        if pool.is_empty() || pool.len() % digest_len != 0 {
            return Err(CollectorError::InvalidPoolSize {
                len: pool.len(),
                digest_len,
            });
        }
        if config.samples == 0 {
            return Err(CollectorError::InvalidQuota);
        }

        tracing::info!(
            quota = config.samples,
            pool_size = pool.len(),
            "Interactive entropy collection started"
        );

        Ok(Self {
            pool: Some(pool),
            fold: FoldState::new(digest),
            sink: Some(Box::new(sink)),
            quota: config.samples,
            samples: 0,
            min_interval: config.min_interval(),
            started: Instant::now(),
            last_accepted: None,
        })
    }

    /// Instant collection started; timestamps are measured from here.
    #[inline]
    pub fn started_at(&self) -> Instant {
        self.started
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CollectorState {
        if self.pool.is_some() {
            CollectorState::Collecting
        } else {
            CollectorState::Complete
        }
    }

    /// True once the pool has been handed off.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state() == CollectorState::Complete
    }

    /// Samples collected against the quota.
    pub fn progress(&self) -> Progress {
        Progress {
            samples: self.samples,
            quota: self.quota,
        }
    }

    /// Feeds one input event.
    pub fn feed(&mut self, event: InputEvent) -> Feed {
        let Some(pool) = self.pool.as_mut() else {
            return Feed::AlreadyComplete;
        };

        let at = event.at();
        let since_last = at.saturating_duration_since(self.last_accepted.unwrap_or(self.started));
        if since_last < self.min_interval {
            return Feed::Ignored;
        }

        let scalar = match event {
            InputEvent::Pointer { x, y, .. } => {
                let position = (u64::from(x) << 32) | u64::from(y);
                (since_last.as_nanos() as u64).wrapping_mul(position)
            }
            InputEvent::Key { byte, .. } => {
                let timestamp = at.saturating_duration_since(self.started).as_nanos() as u64;
                timestamp.wrapping_mul(u64::from(byte) + 1)
            }
        };

        self.fold.fold(pool, scalar);
        self.samples += 1;
        self.last_accepted = Some(at);

        let progress = self.progress();
        tracing::debug!(
            samples = progress.samples,
            quota = progress.quota,
            percent = progress.percent(),
            "Collected entropy sample"
        );

        if self.samples >= self.quota {
            self.complete();
            Feed::Completed(progress)
        } else {
            Feed::Accepted(progress)
        }
    }

    /// Feeds each byte of `text` as a keystroke stamped now.
    ///
    /// Returns the outcome of the last byte, or `Ignored` for empty text.
    pub fn feed_text(&mut self, text: &str) -> Feed {
        let mut last = Feed::Ignored;
        for byte in text.bytes() {
            last = self.feed(InputEvent::Key {
                byte,
                at: Instant::now(),
            });
            if matches!(last, Feed::Completed(_) | Feed::AlreadyComplete) {
                break;
            }
        }
        last
    }

    fn complete(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };
        tracing::info!(samples = self.samples, "Interactive entropy collection complete");
        if let Some(sink) = self.sink.take() {
            sink.on_complete(pool);
        }
    }
}

impl std::fmt::Debug for InteractiveEntropyCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveEntropyCollector")
            .field("state", &self.state())
            .field("samples", &self.samples)
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn config(samples: u32, min_interval_ms: u64) -> CollectorConfig {
        CollectorConfig {
            samples,
            min_interval_ms,
            ..Default::default()
        }
    }

    fn pointer(x: u32, y: u32, at: Instant) -> InputEvent {
        InputEvent::Pointer { x, y, at }
    }

    fn discard(_: EntropyPool) {}

    #[test]
    fn test_unknown_digest_is_fatal() {
        let cfg = CollectorConfig {
            digest: "crc32".into(),
            ..Default::default()
        };
        let result = InteractiveEntropyCollector::new(EntropyPool::zeroed(256), &cfg, discard);
        assert!(matches!(result, Err(CollectorError::DigestUnavailable(_))));
    }

    #[test]
    fn test_pool_must_be_digest_multiple() {
        let result =
            InteractiveEntropyCollector::new(EntropyPool::zeroed(100), &config(4, 0), discard);
        assert!(matches!(
            result,
            Err(CollectorError::InvalidPoolSize { len: 100, digest_len: 16 })
        ));
    }

    #[test]
    fn test_zero_quota_rejected() {
        let result =
            InteractiveEntropyCollector::new(EntropyPool::zeroed(64), &config(0, 0), discard);
        assert!(matches!(result, Err(CollectorError::InvalidQuota)));
    }

    #[test]
    fn test_min_interval_filters_samples() {
        let mut collector =
            InteractiveEntropyCollector::new(EntropyPool::zeroed(64), &config(10, 20), discard)
                .unwrap();
        let t0 = collector.started_at();

        let first = collector.feed(pointer(10, 20, t0 + Duration::from_millis(25)));
        assert!(matches!(first, Feed::Accepted(Progress { samples: 1, .. })));

        // 5ms after the accepted sample: too soon.
        let early = collector.feed(pointer(11, 21, t0 + Duration::from_millis(30)));
        assert_eq!(early, Feed::Ignored);

        let later = collector.feed(pointer(12, 22, t0 + Duration::from_millis(50)));
        assert!(matches!(later, Feed::Accepted(Progress { samples: 2, .. })));
    }

    #[test]
    fn test_completion_hands_off_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let mut collector = InteractiveEntropyCollector::new(
            EntropyPool::zeroed(32),
            &config(3, 0),
            move |pool: EntropyPool| seen.lock().unwrap().push(pool.as_bytes().to_vec()),
        )
        .unwrap();
        let t0 = collector.started_at();

        for i in 1..=2u32 {
            let feed = collector.feed(pointer(i, i, t0 + Duration::from_millis(u64::from(i))));
            assert!(matches!(feed, Feed::Accepted(_)));
        }
        let done = collector.feed(pointer(3, 3, t0 + Duration::from_millis(3)));
        assert_eq!(done, Feed::Completed(Progress { samples: 3, quota: 3 }));
        assert!(collector.is_complete());

        let after = collector.feed(pointer(4, 4, t0 + Duration::from_millis(4)));
        assert_eq!(after, Feed::AlreadyComplete);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 32);
        assert!(calls[0].iter().any(|&b| b != 0));
    }

    #[test]
    fn test_samples_wrap_around_pool() {
        // 4 samples x 16 bytes over a 32-byte pool: each half folded twice.
        let (sink, receiver) = completion_channel();
        let mut collector =
            InteractiveEntropyCollector::new(EntropyPool::zeroed(32), &config(4, 0), sink)
                .unwrap();
        let t0 = collector.started_at();

        for i in 1..=4u64 {
            collector.feed(InputEvent::Key {
                byte: b'a',
                at: t0 + Duration::from_millis(i),
            });
        }

        let pool = receiver.try_recv().expect("pool delivered");
        assert!(pool.as_bytes()[..16].iter().any(|&b| b != 0));
        assert!(pool.as_bytes()[16..].iter().any(|&b| b != 0));
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_feed_text_counts_bytes() {
        let mut collector = InteractiveEntropyCollector::new(
            EntropyPool::zeroed(64),
            &CollectorConfig {
                samples: 5,
                ..CollectorConfig::keyboard()
            },
            discard,
        )
        .unwrap();

        assert!(matches!(
            collector.feed_text("abc"),
            Feed::Accepted(Progress { samples: 3, quota: 5 })
        ));
        assert!(matches!(collector.feed_text("defgh"), Feed::Completed(_)));
        assert_eq!(collector.progress().samples, 5);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(Progress { samples: 0, quota: 4 }.percent(), 0);
        assert_eq!(Progress { samples: 1, quota: 4 }.percent(), 25);
        assert_eq!(Progress { samples: 4, quota: 4 }.percent(), 100);
    }
}
