//! Hardware RNG stream supervised under wall-clock deadlines.

use super::opener::{DevicePath, ExternalCommand, StreamOpener};
use super::rate::{RateParams, RateSample};
use super::stack::{FoldStack, DEFAULT_STACK_SIZE};
use super::supervisor::{lock_stack, FoldParams, Operation, Outcome, Supervisor};
use super::HardwareError;
use crate::source::{ByteSource, SourceError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Configuration for a supervised hardware source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Character device to read, e.g. `/dev/hwrng`.
    pub device: Option<PathBuf>,
    /// External command whose stdout is the stream (used if no device).
    pub command: Vec<String>,
    /// Reads XORed into each folded block (NUMFOLDS).
    pub num_folds: usize,
    /// Bytes per blocking read (STREAMREADSIZE).
    pub read_size: usize,
    /// Fold stack capacity (STACKSIZE). Must be a multiple of `read_size`.
    pub stack_size: usize,
    /// Minimum sustained throughput of a live source, in bits per second.
    /// Zero disables the rate check.
    pub min_rate_bps: u64,
    /// Time spent draining the device backlog before sampling.
    pub rate_clear_ms: u64,
    /// Throughput sampling window.
    pub rate_measure_ms: u64,
    /// Deadline for opening the stream.
    pub open_timeout_ms: u64,
    /// Deadline for the whole rate check; must exceed clear plus measure.
    pub rate_timeout_ms: u64,
    /// Deadline for filling the stack.
    pub refill_timeout_ms: u64,
    /// Deadline for closing the stream.
    pub close_timeout_ms: u64,
    /// How often the waiting caller checks on the worker.
    pub poll_interval_ms: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            device: None,
            command: Vec::new(),
            num_folds: 4,
            read_size: 1024,
            stack_size: DEFAULT_STACK_SIZE,
            min_rate_bps: 3_500,
            rate_clear_ms: 3_000,
            rate_measure_ms: 5_000,
            open_timeout_ms: 2_500,
            rate_timeout_ms: 12_000,
            refill_timeout_ms: 60_000,
            close_timeout_ms: 8_000,
            poll_interval_ms: 250,
        }
    }
}

impl HardwareConfig {
    /// Validates the folding and buffering parameters.
    pub fn validate(&self) -> Result<(), HardwareError> {
        if self.num_folds == 0 {
            return Err(HardwareError::InvalidConfig("num_folds must be at least 1".into()));
        }
        if self.read_size == 0 {
            return Err(HardwareError::InvalidConfig("read_size must be at least 1".into()));
        }
        if self.stack_size == 0 || self.stack_size % self.read_size != 0 {
            return Err(HardwareError::InvalidConfig(format!(
                "stack_size {} must be a positive multiple of read_size {}",
                self.stack_size, self.read_size
            )));
        }
        if self.min_rate_bps > 0 {
            if self.rate_measure_ms == 0 {
                return Err(HardwareError::InvalidConfig(
                    "rate_measure_ms must be at least 1 when min_rate_bps is set".into(),
                ));
            }
            if self.rate_timeout_ms <= self.rate_clear_ms + self.rate_measure_ms {
                return Err(HardwareError::InvalidConfig(format!(
                    "rate_timeout_ms {} must exceed rate_clear_ms + rate_measure_ms ({})",
                    self.rate_timeout_ms,
                    self.rate_clear_ms + self.rate_measure_ms
                )));
            }
        }
        Ok(())
    }

    /// Builds the configured stream locator, if any.
    pub fn opener(&self) -> Option<Box<dyn StreamOpener>> {
        if let Some(path) = &self.device {
            return Some(Box::new(DevicePath::new(path.clone())));
        }
        ExternalCommand::from_argv(&self.command)
            .map(|cmd| Box::new(cmd) as Box<dyn StreamOpener>)
    }

    fn fold_params(&self) -> FoldParams {
        FoldParams {
            num_folds: self.num_folds,
            read_size: self.read_size,
        }
    }

    fn rate_params(&self) -> RateParams {
        RateParams {
            clear: Duration::from_millis(self.rate_clear_ms),
            measure: Duration::from_millis(self.rate_measure_ms),
            min_bps: self.min_rate_bps,
        }
    }
}

/// Lifecycle of a supervised stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No stream held; the initial and final state.
    Closed,
    /// Open job in flight.
    Opening,
    /// Stream held and idle.
    Open,
    /// Rate check or refill in flight.
    Reading,
    /// Close job in flight.
    Closing,
}

/// Hardware byte source whose blocking I/O can never hang the caller.
///
/// Open, refill and close run on a dedicated worker thread; the caller
/// waits for each under its own deadline. Folded bytes are buffered in a
/// locked [`FoldStack`] and handed out one at a time.
pub struct SupervisedHardwareStream {
    name: String,
    state: StreamState,
    stack: Arc<Mutex<FoldStack>>,
    supervisor: Supervisor,
    /// Rate check applies: enabled and not a recorded file.
    check_rate: bool,
    open_timeout: Duration,
    rate_timeout: Duration,
    refill_timeout: Duration,
    close_timeout: Duration,
}

impl SupervisedHardwareStream {
    /// Creates a closed stream over `opener` and starts its worker.
    pub fn new(
        opener: impl StreamOpener,
        config: &HardwareConfig,
    ) -> Result<Self, HardwareError> {
        Self::from_boxed(Box::new(opener), config)
    }

    /// Creates a stream from the locator in `config`.
    pub fn from_config(config: &HardwareConfig) -> Result<Self, HardwareError> {
        let opener = config.opener().ok_or_else(|| {
            HardwareError::InvalidConfig("no hardware device or command configured".into())
        })?;
        Self::from_boxed(opener, config)
    }

    fn from_boxed(
        opener: Box<dyn StreamOpener>,
        config: &HardwareConfig,
    ) -> Result<Self, HardwareError> {
        config.validate()?;

        let name = format!("hwrng:{}", opener.locator());
        let check_rate = config.min_rate_bps > 0 && !opener.is_replay();
        let stack = Arc::new(Mutex::new(FoldStack::new(config.stack_size)));
        let supervisor = Supervisor::spawn(
            &name,
            opener,
            Arc::clone(&stack),
            config.fold_params(),
            config.rate_params(),
            Duration::from_millis(config.poll_interval_ms),
        )?;

        Ok(Self {
            name,
            state: StreamState::Closed,
            stack,
            supervisor,
            check_rate,
            open_timeout: Duration::from_millis(config.open_timeout_ms),
            rate_timeout: Duration::from_millis(config.rate_timeout_ms),
            refill_timeout: Duration::from_millis(config.refill_timeout_ms),
            close_timeout: Duration::from_millis(config.close_timeout_ms),
        })
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Folded bytes currently buffered.
    pub fn buffered(&self) -> usize {
        lock_stack(&self.stack).len()
    }

    /// Brings the source up for use: open, check throughput, fill the stack.
    ///
    /// Only a source that passes all three has produced data, so only
    /// then should it be registered. On failure the stream is closed again.
    pub fn start(&mut self) -> Result<(), HardwareError> {
        let result = self.bring_up();
        if let Err(ref e) = result {
            tracing::warn!(source = %self.name, error = %e, "Hardware source not started");
            if let Err(close_err) = self.close() {
                tracing::debug!(
                    source = %self.name,
                    error = %close_err,
                    "Close after failed start"
                );
            }
        }
        result
    }

    fn bring_up(&mut self) -> Result<(), HardwareError> {
        self.open()?;
        if let Some(rate) = self.measure_rate()? {
            tracing::info!(source = %self.name, %rate, "Hardware source throughput accepted");
        }
        self.refill()
    }

    /// Opens the underlying stream within the open deadline.
    ///
    /// On timeout the stream stays closed; if the device opens later anyway
    /// the worker closes it again.
    pub fn open(&mut self) -> Result<(), HardwareError> {
        if self.state == StreamState::Open {
            return Ok(());
        }

        self.state = StreamState::Opening;
        match self.supervisor.run(Operation::Open, self.open_timeout) {
            Ok(_) => {
                self.state = StreamState::Open;
                tracing::info!(source = %self.name, "Hardware source opened");
                Ok(())
            }
            Err(e) => {
                self.state = StreamState::Closed;
                tracing::warn!(source = %self.name, error = %e, "Hardware source failed to open");
                Err(e)
            }
        }
    }

    /// Drains the device backlog, then samples its throughput.
    ///
    /// Returns `Ok(None)` without reading when the check is disabled or the
    /// stream replays a regular file, and `TooSlow` when the source cannot
    /// sustain the configured minimum rate.
    pub fn measure_rate(&mut self) -> Result<Option<RateSample>, HardwareError> {
        if self.state != StreamState::Open {
            return Err(HardwareError::NotOpen);
        }
        if !self.check_rate {
            return Ok(None);
        }

        self.state = StreamState::Reading;
        let result = self.supervisor.run(Operation::MeasureRate, self.rate_timeout);
        self.state = StreamState::Open;

        match result {
            Ok(Outcome::Rate(sample)) => Ok(Some(sample)),
            Ok(Outcome::Done) => Ok(None),
            Err(e) => {
                tracing::warn!(source = %self.name, error = %e, "Hardware rate check failed");
                Err(e)
            }
        }
    }

    /// Fills the fold stack within the refill deadline. No-op when full.
    ///
    /// Blocks pushed before a timeout stay buffered.
    pub fn refill(&mut self) -> Result<(), HardwareError> {
        if self.state != StreamState::Open {
            return Err(HardwareError::NotOpen);
        }

        self.state = StreamState::Reading;
        let result = self.supervisor.run(Operation::Refill, self.refill_timeout);
        self.state = StreamState::Open;

        if let Err(ref e) = result {
            tracing::warn!(source = %self.name, error = %e, "Hardware refill failed");
        }
        result.map(|_| ())
    }

    /// Closes the underlying stream within the close deadline.
    ///
    /// The stream counts as closed afterwards even if the deadline passed.
    pub fn close(&mut self) -> Result<(), HardwareError> {
        if self.state == StreamState::Closed {
            return Ok(());
        }

        self.state = StreamState::Closing;
        let result = self
            .supervisor
            .run(Operation::Close, self.close_timeout)
            .map(|_| ());
        self.state = StreamState::Closed;

        match &result {
            Ok(()) => tracing::info!(source = %self.name, "Hardware source closed"),
            Err(e) => tracing::warn!(source = %self.name, error = %e, "Hardware close failed"),
        }
        result
    }

    fn pop(&self) -> Option<u8> {
        lock_stack(&self.stack).pop()
    }
}

impl ByteSource for SupervisedHardwareStream {
    fn next_byte(&mut self) -> Result<u8, SourceError> {
        if let Some(byte) = self.pop() {
            return Ok(byte);
        }
        // A refill cut short by its deadline may still have pushed blocks.
        let refilled = self.refill();
        match (self.pop(), refilled) {
            (Some(byte), _) => Ok(byte),
            (None, Err(e)) => Err(e.into()),
            (None, Ok(())) => Err(HardwareError::Underflow.into()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<(), SourceError> {
        SupervisedHardwareStream::close(self).map_err(SourceError::from)
    }
}

impl std::fmt::Debug for SupervisedHardwareStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedHardwareStream")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("buffered", &self.buffered())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::ByteStream;
    use std::io::{self, Cursor, Read};
    use std::sync::mpsc;
    use std::time::Instant;

    /// Serves a fixed byte sequence.
    struct Fixed(Vec<u8>);

    impl StreamOpener for Fixed {
        fn open(&mut self) -> io::Result<ByteStream> {
            Ok(Box::new(Cursor::new(self.0.clone())))
        }

        fn locator(&self) -> String {
            "fixed".into()
        }
    }

    /// Blocks in `open` until the test drops its sender.
    struct Hang(mpsc::Receiver<()>);

    impl StreamOpener for Hang {
        fn open(&mut self) -> io::Result<ByteStream> {
            let _ = self.0.recv();
            Err(io::Error::new(io::ErrorKind::TimedOut, "released"))
        }

        fn locator(&self) -> String {
            "hang".into()
        }
    }

    /// Fails with a fixed error kind.
    struct Refuse(io::ErrorKind);

    impl StreamOpener for Refuse {
        fn open(&mut self) -> io::Result<ByteStream> {
            Err(io::Error::new(self.0, "refused"))
        }

        fn locator(&self) -> String {
            "refuse".into()
        }
    }

    /// Endless fast stream.
    struct Endless;

    impl StreamOpener for Endless {
        fn open(&mut self) -> io::Result<ByteStream> {
            Ok(Box::new(io::repeat(0x3C)))
        }

        fn locator(&self) -> String {
            "endless".into()
        }
    }

    /// Blocks every read until its sender is dropped, then reports end of data.
    struct Blocked(mpsc::Receiver<()>);

    impl Read for Blocked {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    /// Serves `bytes`, then stalls.
    struct Stall {
        bytes: Vec<u8>,
        release: Option<mpsc::Receiver<()>>,
    }

    impl StreamOpener for Stall {
        fn open(&mut self) -> io::Result<ByteStream> {
            let release = self
                .release
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "already opened"))?;
            Ok(Box::new(Cursor::new(self.bytes.clone()).chain(Blocked(release))))
        }

        fn locator(&self) -> String {
            "stall".into()
        }
    }

    fn small_config() -> HardwareConfig {
        HardwareConfig {
            num_folds: 2,
            read_size: 4,
            stack_size: 4,
            open_timeout_ms: 2_000,
            refill_timeout_ms: 2_000,
            close_timeout_ms: 2_000,
            poll_interval_ms: 10,
            min_rate_bps: 0,
            ..Default::default()
        }
    }

    fn rate_config() -> HardwareConfig {
        HardwareConfig {
            min_rate_bps: 3_500,
            rate_clear_ms: 10,
            rate_measure_ms: 40,
            rate_timeout_ms: 2_000,
            ..small_config()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HardwareConfig {
            read_size: 3,
            stack_size: 4,
            ..small_config()
        };
        let result = SupervisedHardwareStream::new(Fixed(Vec::new()), &config);
        assert!(matches!(result, Err(HardwareError::InvalidConfig(_))));
    }

    #[test]
    fn test_lifecycle_and_folded_bytes() {
        let bytes = vec![0x01, 0x02, 0x03, 0x04, 0x10, 0x20, 0x30, 0x40];
        let mut stream = SupervisedHardwareStream::new(Fixed(bytes), &small_config()).unwrap();
        assert_eq!(stream.state(), StreamState::Closed);

        stream.open().unwrap();
        assert_eq!(stream.state(), StreamState::Open);

        let drawn: Vec<u8> = (0..4).map(|_| stream.next_byte().unwrap()).collect();
        assert_eq!(drawn, vec![0x44, 0x33, 0x22, 0x11]);

        // Stream is drained; the next refill hits end of data.
        let err = stream.next_byte().unwrap_err();
        assert!(matches!(
            err,
            SourceError::Hardware(HardwareError::StreamExhausted { .. })
        ));

        stream.close().unwrap();
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_refill_when_full_is_noop() {
        let bytes = vec![0xAA; 8];
        let mut stream = SupervisedHardwareStream::new(Fixed(bytes), &small_config()).unwrap();
        stream.open().unwrap();

        stream.refill().unwrap();
        assert_eq!(stream.buffered(), 4);

        // The stream is exhausted, so any read would fail.
        stream.refill().unwrap();
        assert_eq!(stream.buffered(), 4);
    }

    #[test]
    fn test_refill_requires_open() {
        let mut stream = SupervisedHardwareStream::new(Fixed(vec![0; 8]), &small_config()).unwrap();
        assert!(matches!(stream.refill(), Err(HardwareError::NotOpen)));
        assert!(matches!(
            stream.next_byte(),
            Err(SourceError::Hardware(HardwareError::NotOpen))
        ));
    }

    #[test]
    fn test_open_errors_distinguished() {
        let mut denied =
            SupervisedHardwareStream::new(Refuse(io::ErrorKind::PermissionDenied), &small_config())
                .unwrap();
        assert!(matches!(denied.open(), Err(HardwareError::PermissionDenied(_))));

        let mut missing =
            SupervisedHardwareStream::new(Refuse(io::ErrorKind::NotFound), &small_config())
                .unwrap();
        assert!(matches!(missing.open(), Err(HardwareError::Unavailable(_))));
        assert_eq!(missing.state(), StreamState::Closed);
    }

    #[test]
    fn test_open_deadline_against_silent_stream() {
        let (release, wait) = mpsc::channel();
        let config = HardwareConfig {
            open_timeout_ms: 1,
            ..small_config()
        };
        let mut stream = SupervisedHardwareStream::new(Hang(wait), &config).unwrap();

        let started = Instant::now();
        let result = stream.open();
        let elapsed = started.elapsed();

        assert!(matches!(
            result,
            Err(HardwareError::Timeout {
                operation: Operation::Open,
                ..
            })
        ));
        assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
        assert_eq!(stream.state(), StreamState::Closed);

        drop(release);
    }

    #[test]
    fn test_partial_refill_still_serves_bytes() {
        let (release, wait) = mpsc::channel();
        let opener = Stall {
            bytes: (0..16).collect(),
            release: Some(wait),
        };
        let config = HardwareConfig {
            num_folds: 1,
            read_size: 4,
            stack_size: 64,
            refill_timeout_ms: 200,
            ..small_config()
        };
        let mut stream = SupervisedHardwareStream::new(opener, &config).unwrap();
        stream.open().unwrap();

        // Four blocks land, then the fifth read stalls past the deadline.
        assert_eq!(stream.next_byte().unwrap(), 15);
        assert_eq!(stream.buffered(), 15);
        assert_eq!(stream.next_byte().unwrap(), 14);
        assert_eq!(stream.state(), StreamState::Open);

        drop(release);
    }

    #[test]
    fn test_rate_check_accepts_fast_source() {
        let mut stream = SupervisedHardwareStream::new(Endless, &rate_config()).unwrap();
        stream.open().unwrap();

        let sample = stream.measure_rate().unwrap().expect("live source is measured");
        assert!(sample.bits_per_sec() >= 3_500);
        assert_eq!(stream.state(), StreamState::Open);
    }

    #[test]
    fn test_rate_check_rejects_finished_stream() {
        let mut stream =
            SupervisedHardwareStream::new(Fixed(vec![0x42; 64]), &rate_config()).unwrap();
        assert!(matches!(stream.measure_rate(), Err(HardwareError::NotOpen)));

        stream.open().unwrap();
        assert!(matches!(
            stream.measure_rate(),
            Err(HardwareError::TooSlow { min: 3_500, .. })
        ));
        assert_eq!(stream.state(), StreamState::Open);
    }

    #[test]
    fn test_recorded_file_skips_rate_check() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &[0x01, 0x02, 0x03, 0x04, 0x10, 0x20, 0x30, 0x40])
            .unwrap();

        let mut stream =
            SupervisedHardwareStream::new(DevicePath::new(file.path()), &rate_config()).unwrap();
        stream.start().unwrap();
        assert_eq!(stream.buffered(), 4);
        assert_eq!(stream.next_byte().unwrap(), 0x44);
    }

    #[test]
    fn test_start_closes_silent_source() {
        let mut stream = SupervisedHardwareStream::new(Fixed(Vec::new()), &small_config()).unwrap();

        assert!(matches!(
            stream.start(),
            Err(HardwareError::StreamExhausted { got: 0, .. })
        ));
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(stream.buffered(), 0);
    }

    #[test]
    fn test_rate_timeout_must_cover_windows() {
        let config = HardwareConfig {
            rate_timeout_ms: 50,
            ..rate_config()
        };
        assert!(matches!(config.validate(), Err(HardwareError::InvalidConfig(_))));

        let disabled = HardwareConfig {
            min_rate_bps: 0,
            ..config
        };
        assert!(disabled.validate().is_ok());
    }
}
