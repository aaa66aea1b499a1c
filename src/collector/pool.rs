//! Fixed-size seed pool mixed by the collector.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default pool size in bytes (SEEDSIZE).
pub const DEFAULT_SEED_SIZE: usize = 512;

/// Seed bytes being mixed by interactive collection.
///
/// The pool is wiped when dropped and cannot be cloned, so moving it into a
/// stretcher and letting it go leaves no copy of the seed behind.
///
/// ```compile_fail
/// let pool = seedmix::collector::EntropyPool::zeroed(64);
/// let copy = pool.clone();
/// ```
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EntropyPool {
    bytes: Vec<u8>,
}

impl EntropyPool {
    /// Zero-initialized pool of `size` bytes.
    pub fn zeroed(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size],
        }
    }

    /// Pool pre-seeded with caller-supplied bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Current pool contents.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Pool size in bytes (SEEDSIZE).
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length pool, which no collector accepts.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// XORs `block` into the pool starting at `index`, wrapping at the end.
    pub(crate) fn xor_at(&mut self, index: usize, block: &[u8]) {
        let len = self.bytes.len();
        if len == 0 {
            return;
        }
        for (offset, b) in block.iter().enumerate() {
            self.bytes[(index + offset) % len] ^= b;
        }
    }
}

impl std::fmt::Debug for EntropyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntropyPool")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xor_wraps() {
        let mut pool = EntropyPool::zeroed(4);
        pool.xor_at(3, &[1, 2, 3]);
        assert_eq!(pool.as_bytes(), &[2, 3, 0, 1]);
    }

    #[test]
    fn test_xor_twice_cancels() {
        let mut pool = EntropyPool::from_bytes(vec![9; 8]);
        pool.xor_at(2, &[0xAB; 4]);
        pool.xor_at(2, &[0xAB; 4]);
        assert_eq!(pool.as_bytes(), &[9; 8]);
    }

    #[test]
    fn test_zeroize_releases_seed() {
        let mut pool = EntropyPool::from_bytes(vec![0x5C; 16]);
        pool.zeroize();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_debug_hides_bytes() {
        let pool = EntropyPool::from_bytes(vec![0x42; 4]);
        let rendered = format!("{pool:?}");
        assert!(!rendered.contains("66"));
        assert!(rendered.contains("len"));
    }
}
