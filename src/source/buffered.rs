//! Block-buffered byte source over any `RngCore` generator.

use super::{ByteSource, SourceError};
use rand_core::RngCore;
use zeroize::Zeroize;

/// Default size of the internal block (BUFFERSIZE).
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Buffers a fixed block drawn from a generator and serves it byte by byte.
///
/// When the block is exhausted the next call refills it synchronously from
/// the generator. Refills never wait on anything external.
pub struct BlockSource<G: RngCore> {
    name: String,
    generator: G,
    block: Vec<u8>,
    cursor: usize,
    refills: u64,
}

impl<G: RngCore> BlockSource<G> {
    /// Wraps `generator` with a block of `buffer_size` bytes.
    ///
    /// A zero `buffer_size` is bumped to one byte.
    pub fn new(name: impl Into<String>, generator: G, buffer_size: usize) -> Self {
        let size = buffer_size.max(1);
        Self {
            name: name.into(),
            generator,
            block: vec![0u8; size],
            // Start exhausted so the first draw fills the block.
            cursor: size,
            refills: 0,
        }
    }

    /// Size of the internal block.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.block.len()
    }

    /// Number of blocks drawn from the generator so far.
    #[inline]
    pub fn refills(&self) -> u64 {
        self.refills
    }

    fn refill(&mut self) -> Result<(), SourceError> {
        self.generator
            .try_fill_bytes(&mut self.block)
            .map_err(|e| SourceError::Generator(e.to_string()))?;
        self.cursor = 0;
        self.refills += 1;

        tracing::trace!(
            source = %self.name,
            block_size = self.block.len(),
            refills = self.refills,
            "Refilled source block"
        );
        Ok(())
    }
}

impl<G: RngCore> ByteSource for BlockSource<G> {
    fn next_byte(&mut self) -> Result<u8, SourceError> {
        if self.cursor >= self.block.len() {
            self.refill()?;
        }
        let byte = self.block[self.cursor];
        self.cursor += 1;
        Ok(byte)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<G: RngCore> Drop for BlockSource<G> {
    fn drop(&mut self) {
        self.block.zeroize();
    }
}

impl<G: RngCore> std::fmt::Debug for BlockSource<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSource")
            .field("name", &self.name)
            .field("buffer_size", &self.block.len())
            .field("refills", &self.refills)
            .finish_non_exhaustive()
    }
}
