//! Stretching of collected seed material into a byte stream.
//!
//! The seed is condensed into a 256-bit key by a domain-separated hash and
//! used to key a ChaCha20 generator. Generation is deterministic: the same
//! seed and algorithm always yield the same stream.

use super::{BlockSource, ByteSource, SourceError, DEFAULT_BUFFER_SIZE};
use crate::collector::EntropyPool;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Minimum accepted seed length in bytes.
pub const MIN_SEED_LEN: usize = 32;

/// Domain separator for key derivation.
/// Keeps the stretcher key distinct from any other hash of the pool.
const STRETCH_DOMAIN: &[u8] = b"seedmix-stretch-v1";

/// Hash used to condense the seed into the generator key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3 - fast, secure, recommended default.
    #[default]
    Blake3,
    /// SHA-256 - widely deployed, conservative choice.
    Sha256,
}

impl HashAlgorithm {
    fn derive_key(self, seed: &[u8]) -> [u8; 32] {
        match self {
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                hasher.update(STRETCH_DOMAIN);
                hasher.update(&(seed.len() as u64).to_le_bytes());
                hasher.update(seed);
                *hasher.finalize().as_bytes()
            }
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(STRETCH_DOMAIN);
                hasher.update((seed.len() as u64).to_le_bytes());
                hasher.update(seed);
                hasher.finalize().into()
            }
        }
    }
}

/// Deterministic CSPRNG stream keyed from a seed pool.
#[derive(Debug)]
pub struct StretchedPoolSource {
    inner: BlockSource<ChaCha20Rng>,
}

impl StretchedPoolSource {
    /// Creates a stretcher from raw seed bytes using BLAKE3 key derivation.
    pub fn new(seed: &[u8]) -> Result<Self, SourceError> {
        Self::with_options(seed, HashAlgorithm::default(), DEFAULT_BUFFER_SIZE)
    }

    /// Creates a stretcher with an explicit hash and block size.
    ///
    /// Fails with [`SourceError::SeedTooShort`] if `seed` holds fewer than
    /// [`MIN_SEED_LEN`] bytes.
    pub fn with_options(
        seed: &[u8],
        algorithm: HashAlgorithm,
        buffer_size: usize,
    ) -> Result<Self, SourceError> {
        if seed.len() < MIN_SEED_LEN {
            return Err(SourceError::SeedTooShort {
                got: seed.len(),
                min: MIN_SEED_LEN,
            });
        }

        let mut key = algorithm.derive_key(seed);
        let generator = ChaCha20Rng::from_seed(key);
        key.zeroize();

        tracing::debug!(
            seed_len = seed.len(),
            algorithm = ?algorithm,
            "Stretcher keyed from seed pool"
        );

        Ok(Self {
            inner: BlockSource::new("stretched-pool", generator, buffer_size),
        })
    }

    /// Consumes a finished entropy pool. The pool is wiped when dropped here.
    pub fn from_pool(
        pool: EntropyPool,
        algorithm: HashAlgorithm,
        buffer_size: usize,
    ) -> Result<Self, SourceError> {
        Self::with_options(pool.as_bytes(), algorithm, buffer_size)
    }
}

impl ByteSource for StretchedPoolSource {
    fn next_byte(&mut self) -> Result<u8, SourceError> {
        self.inner.next_byte()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
