//! Worker thread and deadline supervision for hardware I/O.
//!
//! All blocking I/O for one stream runs on a single dedicated worker that
//! processes jobs strictly in order. The caller waits for each job by
//! polling its reply channel in short slices until a deadline passes.
//!
//! A blocking read cannot be interrupted portably, so a timed-out job is
//! stopped through its [`CancelToken`]: the worker skips cancelled jobs that
//! are still queued, discards a stream opened after cancellation and checks
//! the token under the stack lock before every push. Once the caller has
//! been told "timed out", the job never changes anything it can observe.

use super::opener::{ByteStream, StreamOpener};
use super::rate::{self, RateParams, RateSample};
use super::stack::FoldStack;
use super::HardwareError;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use zeroize::Zeroizing;

/// I/O operations executed on the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Open the stream.
    Open,
    /// Drain and sample throughput.
    MeasureRate,
    /// Fill the fold stack.
    Refill,
    /// Drop the stream.
    Close,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::MeasureRate => write!(f, "rate measurement"),
            Self::Refill => write!(f, "refill"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// Shared cancellation flag for one submitted job.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Folding parameters used by refill jobs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FoldParams {
    /// Reads XORed into each folded block (NUMFOLDS).
    pub num_folds: usize,
    /// Bytes per read (STREAMREADSIZE).
    pub read_size: usize,
}

/// What a finished job hands back to the waiting caller.
#[derive(Debug)]
pub(crate) enum Outcome {
    Done,
    Rate(RateSample),
}

struct Request {
    operation: Operation,
    cancel: CancelToken,
    reply: mpsc::Sender<Result<Outcome, HardwareError>>,
}

/// Locks the stack, tolerating poison: its contents are plain bytes and a
/// panic mid-push cannot leave them inconsistent with the cursor.
pub(crate) fn lock_stack(stack: &Mutex<FoldStack>) -> MutexGuard<'_, FoldStack> {
    stack.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Caller-side handle to the worker thread.
pub(crate) struct Supervisor {
    name: String,
    jobs: mpsc::Sender<Request>,
    poll_interval: Duration,
}

impl Supervisor {
    /// Spawns the worker. The thread is never joined: dropping the
    /// supervisor closes the job queue and the worker exits after its
    /// current job, however long that takes.
    pub(crate) fn spawn(
        name: &str,
        opener: Box<dyn StreamOpener>,
        stack: Arc<Mutex<FoldStack>>,
        params: FoldParams,
        rate: RateParams,
        poll_interval: Duration,
    ) -> Result<Self, HardwareError> {
        let (jobs, queue) = mpsc::channel::<Request>();
        let worker = Worker {
            name: name.to_string(),
            opener,
            stack,
            params,
            rate,
        };

        thread::Builder::new()
            .name(format!("hwrng-{name}"))
            .spawn(move || worker.run(queue))
            .map_err(HardwareError::Spawn)?;

        Ok(Self {
            name: name.to_string(),
            jobs,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        })
    }

    /// Submits `operation` and waits for it at most `deadline`.
    pub(crate) fn run(
        &self,
        operation: Operation,
        deadline: Duration,
    ) -> Result<Outcome, HardwareError> {
        let cancel = CancelToken::default();
        let (reply, replies) = mpsc::channel();
        self.jobs
            .send(Request {
                operation,
                cancel: cancel.clone(),
                reply,
            })
            .map_err(|_| HardwareError::WorkerGone)?;

        let started = Instant::now();
        loop {
            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                cancel.cancel();
                tracing::warn!(
                    source = %self.name,
                    %operation,
                    deadline_ms = deadline.as_millis() as u64,
                    "Hardware operation timed out; cancelled"
                );
                return Err(HardwareError::Timeout {
                    operation,
                    after: deadline,
                });
            }

            match replies.recv_timeout(remaining.min(self.poll_interval)) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::info!(
                        source = %self.name,
                        %operation,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Waiting for hardware source..."
                    );
                }
                Err(RecvTimeoutError::Disconnected) => return Err(HardwareError::WorkerGone),
            }
        }
    }
}

/// Everything the worker thread owns.
struct Worker {
    name: String,
    opener: Box<dyn StreamOpener>,
    stack: Arc<Mutex<FoldStack>>,
    params: FoldParams,
    rate: RateParams,
}

impl Worker {
    fn run(mut self, queue: mpsc::Receiver<Request>) {
        let mut stream: Option<ByteStream> = None;

        for request in queue {
            if request.cancel.is_cancelled() {
                tracing::debug!(
                    source = %self.name,
                    operation = %request.operation,
                    "Skipping cancelled job"
                );
                continue;
            }

            let cancel = &request.cancel;
            let result = match request.operation {
                Operation::Open => open(&mut *self.opener, cancel).map(|s| {
                    stream = Some(s);
                    Outcome::Done
                }),
                Operation::MeasureRate => match stream.as_mut() {
                    Some(s) => rate::measure_rate(s, self.rate, cancel).map(Outcome::Rate),
                    None => Err(HardwareError::NotOpen),
                },
                Operation::Refill => match stream.as_mut() {
                    Some(s) => refill(s, &self.stack, self.params, cancel).map(|pushed| {
                        tracing::debug!(source = %self.name, pushed, "Refilled fold stack");
                        Outcome::Done
                    }),
                    None => Err(HardwareError::NotOpen),
                },
                Operation::Close => {
                    // Dropping the stream closes the device or reaps the child.
                    drop(stream.take());
                    Ok(Outcome::Done)
                }
            };

            // The caller may have given up already; nobody to tell.
            let _ = request.reply.send(result);
        }

        tracing::debug!(source = %self.name, "Hardware worker exiting");
    }
}

fn open(opener: &mut dyn StreamOpener, cancel: &CancelToken) -> Result<ByteStream, HardwareError> {
    let locator = opener.locator();
    let stream = opener.open().map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => HardwareError::PermissionDenied(locator.clone()),
        _ => HardwareError::Unavailable(format!("{locator}: {e}")),
    })?;

    if cancel.is_cancelled() {
        // Opened after the caller gave up: close it again right here.
        drop(stream);
        return Err(HardwareError::Cancelled);
    }
    Ok(stream)
}

/// Fills the stack with folded blocks until it is full.
///
/// Each block is the XOR of `num_folds` exact reads of `read_size` bytes.
/// If the consumer left the stack off a block boundary, the last block is
/// truncated to fit. Returns the number of bytes pushed.
pub(crate) fn refill(
    stream: &mut dyn Read,
    stack: &Mutex<FoldStack>,
    params: FoldParams,
    cancel: &CancelToken,
) -> Result<usize, HardwareError> {
    let mut block = Zeroizing::new(vec![0u8; params.read_size]);
    let mut folded = Zeroizing::new(vec![0u8; params.read_size]);
    let mut pushed = 0;

    while !lock_stack(stack).is_full() {
        folded.fill(0);
        for _ in 0..params.num_folds {
            read_full(stream, &mut block)?;
            for (acc, b) in folded.iter_mut().zip(block.iter()) {
                *acc ^= b;
            }
            if cancel.is_cancelled() {
                return Err(HardwareError::Cancelled);
            }
        }

        let mut guard = lock_stack(stack);
        if cancel.is_cancelled() {
            return Err(HardwareError::Cancelled);
        }
        pushed += guard.push_block(&folded);
        tracing::trace!(stack_len = guard.len(), "Pushed folded block");
    }

    Ok(pushed)
}

/// Reads exactly `buf.len()` bytes; end of data is a stream inconsistency.
fn read_full(stream: &mut dyn Read, buf: &mut [u8]) -> Result<(), HardwareError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(HardwareError::StreamExhausted {
                    got: filled,
                    want: buf.len(),
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(HardwareError::Io(e)),
        }
    }
    Ok(())
}
