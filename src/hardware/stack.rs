//! Bounded LIFO buffer of folded hardware bytes.

use zeroize::Zeroize;

/// Default capacity of the fold stack (STACKSIZE).
pub const DEFAULT_STACK_SIZE: usize = 128 * 1024;

/// Bounded byte stack with a position cursor.
///
/// Invariant: `0 <= position <= capacity`. The stack itself is not
/// synchronized; the owning stream wraps it in a mutex shared between the
/// refill worker (producer) and `next_byte` (consumer).
pub struct FoldStack {
    bytes: Vec<u8>,
    position: usize,
}

impl FoldStack {
    /// Empty stack holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity],
            position: 0,
        }
    }

    /// Maximum bytes held (STACKSIZE).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes currently stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.position
    }

    /// True when `pop` would return `None`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// True when `push` would be refused.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.position == self.bytes.len()
    }

    /// Free slots left.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Pushes one byte; returns `false` if the stack is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.bytes[self.position] = byte;
        self.position += 1;
        true
    }

    /// Pushes as much of `block` as fits and returns how many bytes went in.
    pub fn push_block(&mut self, block: &[u8]) -> usize {
        let take = block.len().min(self.remaining());
        self.bytes[self.position..self.position + take].copy_from_slice(&block[..take]);
        self.position += take;
        take
    }

    /// Pops the most recently pushed byte.
    ///
    /// Popping an empty stack is a caller bug; it yields `None` rather than
    /// stale data.
    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        self.position -= 1;
        let byte = self.bytes[self.position];
        self.bytes[self.position] = 0;
        Some(byte)
    }
}

impl Drop for FoldStack {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FoldStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoldStack")
            .field("position", &self.position)
            .field("capacity", &self.bytes.len())
            .finish()
    }
}
