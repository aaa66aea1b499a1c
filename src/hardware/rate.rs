//! Throughput check for live hardware streams.
//!
//! A generator that trickles bytes would stall every refill until its
//! deadline. Before a live source is admitted its buffered backlog is
//! drained, then sustained throughput is sampled over a fixed window and
//! compared to a minimum.

use super::supervisor::CancelToken;
use super::HardwareError;
use std::fmt;
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

/// Scratch buffer size for draining and sampling.
const SAMPLE_CHUNK: usize = 1024;

/// Windows and floor for one rate measurement.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateParams {
    /// Time spent discarding whatever the device had buffered.
    pub clear: Duration,
    /// Sampling window.
    pub measure: Duration,
    /// Minimum acceptable rate in bits per second.
    pub min_bps: u64,
}

/// Bytes observed over a sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSample {
    /// Bytes read inside the window.
    pub bytes: u64,
    /// Window length; never shorter than the configured window.
    pub elapsed: Duration,
}

impl RateSample {
    /// Observed throughput in bits per second.
    pub fn bits_per_sec(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (self.bytes as f64 * 8.0 / secs) as u64
    }
}

impl fmt::Display for RateSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.bits_per_sec();
        match bps {
            0..=999 => write!(f, "{bps} bps"),
            1_000..=999_999 => write!(f, "{:.1} Kbps", bps as f64 / 1e3),
            _ => write!(f, "{:.1} Mbps", bps as f64 / 1e6),
        }
    }
}

/// Drains the stream for `clear`, then counts bytes read during `measure`.
///
/// End of data stops the current phase early; the rate is still computed
/// over the full window, so a finished stream measures as slow. Fails with
/// `TooSlow` below `min_bps`.
pub(crate) fn measure_rate(
    stream: &mut dyn Read,
    params: RateParams,
    cancel: &CancelToken,
) -> Result<RateSample, HardwareError> {
    let mut buf = [0u8; SAMPLE_CHUNK];

    let clear_until = Instant::now() + params.clear;
    while Instant::now() < clear_until {
        if read_chunk(stream, &mut buf, cancel)? == 0 {
            break;
        }
    }
    tracing::debug!(clear_ms = params.clear.as_millis() as u64, "Drained hardware backlog");

    let started = Instant::now();
    let mut bytes = 0u64;
    while started.elapsed() < params.measure {
        match read_chunk(stream, &mut buf, cancel)? {
            0 => break,
            n => bytes += n as u64,
        }
    }

    let sample = RateSample {
        bytes,
        elapsed: started.elapsed().max(params.measure),
    };
    let bps = sample.bits_per_sec();
    if bps < params.min_bps {
        return Err(HardwareError::TooSlow {
            bits_per_sec: bps,
            min: params.min_bps,
        });
    }
    Ok(sample)
}

fn read_chunk(
    stream: &mut dyn Read,
    buf: &mut [u8],
    cancel: &CancelToken,
) -> Result<usize, HardwareError> {
    loop {
        let read = stream.read(buf);
        if cancel.is_cancelled() {
            return Err(HardwareError::Cancelled);
        }
        match read {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(HardwareError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::thread;

    /// Hands out `chunk` bytes per read after sleeping `delay`.
    struct Throttled {
        delay: Duration,
        chunk: usize,
    }

    impl Read for Throttled {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(self.delay);
            let n = buf.len().min(self.chunk);
            buf[..n].fill(0xA5);
            Ok(n)
        }
    }

    fn params(min_bps: u64) -> RateParams {
        RateParams {
            clear: Duration::from_millis(10),
            measure: Duration::from_millis(40),
            min_bps,
        }
    }

    #[test]
    fn test_fast_stream_accepted() {
        let sample =
            measure_rate(&mut io::repeat(0x5A), params(3_500), &CancelToken::default()).unwrap();
        assert!(sample.bytes > 0);
        assert!(sample.elapsed >= Duration::from_millis(40));
        assert!(sample.bits_per_sec() >= 3_500);
    }

    #[test]
    fn test_trickling_stream_rejected() {
        // At most 2 bytes per 10 ms: 1600 bps.
        let mut slow = Throttled {
            delay: Duration::from_millis(10),
            chunk: 2,
        };
        let err = measure_rate(&mut slow, params(3_500), &CancelToken::default()).unwrap_err();
        assert!(matches!(
            err,
            HardwareError::TooSlow { bits_per_sec, min: 3_500 } if bits_per_sec < 3_500
        ));
    }

    #[test]
    fn test_finished_stream_measures_zero() {
        let mut short = Cursor::new(vec![0u8; 100]);
        let err = measure_rate(&mut short, params(1), &CancelToken::default()).unwrap_err();
        assert!(matches!(err, HardwareError::TooSlow { bits_per_sec: 0, .. }));
    }

    #[test]
    fn test_cancelled_measurement_stops() {
        let cancel = CancelToken::default();
        cancel.cancel();
        let err = measure_rate(&mut io::repeat(0), params(0), &cancel).unwrap_err();
        assert!(matches!(err, HardwareError::Cancelled));
    }

    #[test]
    fn test_rate_display_units() {
        let sample = |bytes| RateSample {
            bytes,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(sample(100).to_string(), "800 bps");
        assert_eq!(sample(1_000).to_string(), "8.0 Kbps");
        assert_eq!(sample(250_000).to_string(), "2.0 Mbps");
    }
}
