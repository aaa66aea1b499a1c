//! Statistical sanity checks for diagnostic samples.
//!
//! These tests catch obviously broken sources (stuck bits, constant
//! output, short cycles). Passing them says nothing about entropy.

/// Variance of a uniformly distributed byte, `(256² - 1) / 12`.
pub const UNIFORM_BYTE_VARIANCE: f64 = (256.0 * 256.0 - 1.0) / 12.0;

/// Statistical test results for one sample block.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticalTests {
    /// Fraction of set bits minus one half, in [-0.5, 0.5].
    pub bit_bias: f64,
    /// Population variance of the byte values.
    pub variance: f64,
    /// Lag-1 autocorrelation of the byte values; 1.0 for constant data.
    pub autocorrelation: f64,
    /// Number of bytes analyzed.
    pub sample_size: usize,
}

impl StatisticalTests {
    /// Runs all statistical tests on `data`.
    pub fn analyze(data: &[u8]) -> Self {
        let n = data.len();
        if n == 0 {
            return Self {
                bit_bias: 0.0,
                variance: 0.0,
                autocorrelation: 0.0,
                sample_size: 0,
            };
        }

        let mut ones = 0u64;
        let mut sum = 0u64;
        for &b in data {
            ones += u64::from(b.count_ones());
            sum += u64::from(b);
        }
        let mean = sum as f64 / n as f64;

        // Centered values feed both the variance and the lag-1 products.
        let mut squares = 0.0;
        let mut lagged = 0.0;
        let mut prev: Option<f64> = None;
        for &b in data {
            let d = f64::from(b) - mean;
            squares += d * d;
            if let Some(p) = prev {
                lagged += p * d;
            }
            prev = Some(d);
        }

        let autocorrelation = match n {
            1 => 0.0,
            _ if squares == 0.0 => 1.0,
            _ => lagged / squares,
        };

        Self {
            bit_bias: ones as f64 / (n * 8) as f64 - 0.5,
            variance: squares / n as f64,
            autocorrelation,
            sample_size: n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternating_extremes() {
        // 0x00/0xFF alternating: mean 127.5, every neighbour on the far side.
        let data: Vec<u8> = (0..512).map(|i| if i % 2 == 0 { 0x00 } else { 0xFF }).collect();
        let stats = StatisticalTests::analyze(&data);

        assert!(stats.bit_bias.abs() < 1e-12);
        assert!((stats.variance - 127.5 * 127.5).abs() < 1e-6);
        assert!(stats.autocorrelation < -0.99);
        assert_eq!(stats.sample_size, 512);
    }

    #[test]
    fn test_full_byte_range_variance() {
        let data: Vec<u8> = (0..=255).collect();
        let stats = StatisticalTests::analyze(&data);
        assert!((stats.variance - UNIFORM_BYTE_VARIANCE).abs() < 1e-6);
    }

    #[test]
    fn test_constant_data() {
        let stats = StatisticalTests::analyze(&[0x80u8; 1000]);

        assert_eq!(stats.variance, 0.0);
        assert_eq!(stats.autocorrelation, 1.0);
    }

    #[test]
    fn test_all_ones_biased() {
        let stats = StatisticalTests::analyze(&[0xFFu8; 64]);
        assert!((stats.bit_bias - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_single_byte_has_no_autocorrelation() {
        let stats = StatisticalTests::analyze(&[0x42]);
        assert_eq!(stats.autocorrelation, 0.0);
        assert_eq!(stats.variance, 0.0);
    }

    #[test]
    fn test_empty_sample() {
        let stats = StatisticalTests::analyze(&[]);
        assert_eq!(stats.bit_bias, 0.0);
        assert_eq!(stats.variance, 0.0);
        assert_eq!(stats.autocorrelation, 0.0);
    }
}
