//! OS CSPRNG source.

use super::{BlockSource, ByteSource, SourceError, DEFAULT_BUFFER_SIZE};
use rand_core::OsRng;

/// Buffered view of the platform CSPRNG.
///
/// This is the trusted baseline of every aggregate: the other sources
/// supplement it, they never replace it.
#[derive(Debug)]
pub struct PooledCsprngSource {
    inner: BlockSource<OsRng>,
}

impl PooledCsprngSource {
    /// Creates a source with the default block size.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a source drawing `buffer_size` bytes per refill.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            inner: BlockSource::new("os-csprng", OsRng, buffer_size),
        }
    }

    /// Draws `len` bytes, e.g. to pre-seed an entropy pool.
    pub fn draw(&mut self, len: usize) -> Result<Vec<u8>, SourceError> {
        (0..len).map(|_| self.inner.next_byte()).collect()
    }
}

impl Default for PooledCsprngSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSource for PooledCsprngSource {
    fn next_byte(&mut self) -> Result<u8, SourceError> {
        self.inner.next_byte()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
