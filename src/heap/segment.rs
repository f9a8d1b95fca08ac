//! The growable memory segment backing the heap.
//!
//! [`Segment`] plays the role of the memory system underneath the allocator:
//! a single contiguous region that only ever grows, extended through an
//! `sbrk`-style primitive. The allocator addresses it exclusively through
//! byte offsets, so the region can live in an ordinary owned buffer: offsets
//! stay valid across growth even when the buffer reallocates.
//!
//! A capacity limit stands in for the finite mapping a real memory system
//! would provide; exceeding it fails the extension rather than the process.

use super::header::WSIZE;

/// Default capacity limit of a segment (20 MiB).
pub const DEFAULT_LIMIT: usize = 20 * (1 << 20);

/// A request to grow the segment past its capacity limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("segment exhausted: {requested} bytes requested, {available} available")]
pub struct SegmentFull {
    /// Bytes asked for by the failed extension.
    pub requested: usize,
    /// Bytes left below the capacity limit.
    pub available: usize,
}

/// An owned, monotonically growing byte region.
pub struct Segment {
    bytes: Vec<u8>,
    limit: usize,
}

impl Segment {
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
        }
    }

    /// Grow the segment by `incr` bytes of zeroed memory.
    ///
    /// Returns the offset of the old break, i.e. the start of the freshly
    /// added region, like `sbrk` returns the old program break.
    pub fn sbrk(&mut self, incr: usize) -> Result<usize, SegmentFull> {
        let old = self.bytes.len();
        if incr > self.limit - old {
            return Err(SegmentFull {
                requested: incr,
                available: self.limit - old,
            });
        }
        self.bytes.resize(old + incr, 0);
        Ok(old)
    }

    /// Offset of the first byte of the segment.
    pub fn lo(&self) -> usize {
        0
    }

    /// Offset of the last byte of the segment.
    ///
    /// Meaningless while the segment is empty; the heap never asks before
    /// its first extension.
    pub fn hi(&self) -> usize {
        self.bytes.len() - 1
    }

    /// Offset one past the last byte (the current break).
    pub fn end(&self) -> usize {
        self.bytes.len()
    }

    /// Read the word at byte offset `ofs`.
    pub fn read_word(&self, ofs: usize) -> u64 {
        assert_eq!(ofs % WSIZE, 0);
        let bytes = self.bytes[ofs..ofs + WSIZE].try_into().unwrap();
        u64::from_ne_bytes(bytes)
    }

    /// Write the word at byte offset `ofs`.
    pub fn write_word(&mut self, ofs: usize, word: u64) {
        assert_eq!(ofs % WSIZE, 0);
        self.bytes[ofs..ofs + WSIZE].copy_from_slice(&word.to_ne_bytes());
    }

    pub fn bytes(&self, ofs: usize, len: usize) -> &[u8] {
        &self.bytes[ofs..ofs + len]
    }

    pub fn bytes_mut(&mut self, ofs: usize, len: usize) -> &mut [u8] {
        &mut self.bytes[ofs..ofs + len]
    }

    /// Copy `len` bytes from offset `src` to offset `dst` (ranges may
    /// overlap).
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        self.bytes.copy_within(src..src + len, dst);
    }
}
