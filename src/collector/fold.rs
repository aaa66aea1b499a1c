//! One-way folding of sample scalars into the entropy pool.
//!
//! Each fold digests `(counter, scalar)` and XORs the digest into the pool
//! at `(counter * DIGEST_LEN) % pool_len`. The counter then advances, so
//! consecutive samples walk around the pool and eventually touch all of it.

use super::{CollectorError, EntropyPool};
use md5::{Digest, Md5};

/// Length of the fold digest in bytes.
pub const DIGEST_LEN: usize = 16;

/// Digest functions available for folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldDigest {
    /// MD5, 16-byte output.
    Md5,
}

impl FoldDigest {
    /// Looks up a digest by name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, CollectorError> {
        match name.to_ascii_lowercase().as_str() {
            "md5" | "md-5" => Ok(FoldDigest::Md5),
            _ => Err(CollectorError::DigestUnavailable(name.to_string())),
        }
    }

    /// Output length of the digest.
    pub fn output_len(self) -> usize {
        match self {
            FoldDigest::Md5 => DIGEST_LEN,
        }
    }

    fn digest(self, counter: u64, scalar: u64) -> [u8; DIGEST_LEN] {
        match self {
            FoldDigest::Md5 => {
                let mut hasher = Md5::new();
                hasher.update(counter.to_le_bytes());
                hasher.update(scalar.to_le_bytes());
                hasher.finalize().into()
            }
        }
    }
}

/// Rolling fold state: digest function plus shift counter.
#[derive(Debug)]
pub struct FoldState {
    digest: FoldDigest,
    counter: u64,
}

impl FoldState {
    /// Starts folding at counter 0.
    pub fn new(digest: FoldDigest) -> Self {
        Self { digest, counter: 0 }
    }

    /// Number of folds performed.
    #[inline]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Pool index touched by a fold at `counter`.
    pub fn index_for(counter: u64, pool_len: usize) -> usize {
        if pool_len == 0 {
            return 0;
        }
        let digest_len = DIGEST_LEN as u64;
        (counter.wrapping_mul(digest_len) % pool_len as u64) as usize
    }

    /// Folds `scalar` into `pool` and advances the counter.
    pub fn fold(&mut self, pool: &mut EntropyPool, scalar: u64) {
        let index = Self::index_for(self.counter, pool.len());
        let block = self.digest.digest(self.counter, scalar);
        pool.xor_at(index, &block);

        tracing::trace!(counter = self.counter, index, "Folded sample into pool");
        self.counter += 1;
    }
}
