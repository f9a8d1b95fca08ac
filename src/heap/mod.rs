//! A segregated-list heap allocator with footer elision.
//!
//! The heap is one contiguous region that only grows, bracketed by a
//! one-word prologue and a one-word epilogue, both marked allocated. Real
//! blocks sit in between, each led by a header word packing the block
//! size with three flag bits. Free blocks larger than the 16-byte minimum
//! also carry a mirror footer so their successor can walk backwards;
//! allocated blocks and minimum-size blocks elide the footer and are
//! navigated through the `prev_alloc`/`prev_sseg` bits instead.
//!
//! Free blocks are threaded through eleven power-of-two size classes
//! (doubly linked, LIFO) plus a dedicated singly linked list for 16-byte
//! blocks. Allocation runs a 25-th best-fit over the classes, splits when
//! the remainder can stand alone, and extends the segment in 4 KiB chunks
//! otherwise. Freeing coalesces immediately with both neighbors.
//!
//! There are no raw pointers anywhere: the region lives in an owned
//! [`Segment`] and blocks are identified by byte offsets into it, so the
//! intrusive lists are plain words holding offsets, with `0` meaning
//! "none" (offset 0 is the prologue and never a block).

mod check;
mod free_list;
pub mod global;
mod header;
mod segment;

pub use self::free_list::{NTH_FIT, NUM_CLASSES};
pub use self::segment::{Segment, SegmentFull, DEFAULT_LIMIT};

use self::header::{round_up, Header, DSIZE, MIN_BLOCK, WSIZE};

use core::fmt;

/// Granularity of heap extension.
const CHUNK: usize = 1 << 12;

/// Offset of the first block header, right after the prologue word.
const BASE: usize = WSIZE;

/// Handle to an allocated payload: the byte offset of its first byte
/// within the heap segment. The no-allocation case ("null") is expressed
/// as `Option<Payload>` at the API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload(usize);

impl Payload {
    /// The payload's byte offset. Always a multiple of 16.
    pub fn offset(self) -> usize {
        self.0
    }
}

/// The allocator state: the memory segment plus the free-list heads.
pub struct Heap {
    seg: Segment,
    /// Heads of the segregated size-class lists (blocks larger than 16).
    classes: [Option<usize>; NUM_CLASSES],
    /// Head of the singly linked list of 16-byte blocks.
    small: Option<usize>,
}

impl Heap {
    /// Create a heap backed by a segment of the default capacity.
    pub fn new() -> Result<Self, SegmentFull> {
        Self::with_limit(DEFAULT_LIMIT)
    }

    /// Create a heap whose segment may not grow beyond `limit` bytes.
    pub fn with_limit(limit: usize) -> Result<Self, SegmentFull> {
        let mut heap = Self {
            seg: Segment::new(limit),
            classes: [None; NUM_CLASSES],
            small: None,
        };
        let start = heap.seg.sbrk(2 * WSIZE)?;
        debug_assert_eq!(start, 0);
        // prologue footer and initial epilogue header; the epilogue's
        // predecessor is the (allocated) prologue
        heap.put_header(0, Header::new(0, true));
        heap.put_header(WSIZE, Header::new(0, true).with_prev_alloc(true));
        heap.extend_heap(CHUNK)?;
        Ok(heap)
    }

    /// Allocate `size` bytes and return a handle to the payload.
    ///
    /// Returns `None` for a zero-size request, when the rounded block size
    /// overflows, or when the segment cannot grow any further.
    pub fn alloc(&mut self, size: usize) -> Option<Payload> {
        debug_assert!(self.check_heap());
        if size == 0 {
            return None;
        }
        let asize = round_up(size.checked_add(WSIZE)?, DSIZE)?;
        let block = match self.find_fit(asize) {
            Some(block) => block,
            None => self.extend_heap(asize.max(CHUNK)).ok()?,
        };
        self.place(block, asize);
        debug_assert!(self.check_heap());
        Some(Payload(block + WSIZE))
    }

    /// Release an allocation. `None` is a no-op.
    pub fn free(&mut self, bp: Option<Payload>) {
        let Some(bp) = bp else { return };
        debug_assert!(self.check_heap());
        let block = bp.0 - WSIZE;
        let h = self.header(block);
        debug_assert!(h.is_alloc(), "freeing a block that is not allocated");
        let freed = h.with_alloc(false);
        self.put_header(block, freed);
        self.put_footer(block, freed);
        self.set_prev_alloc(block + freed.size(), false);
        self.coalesce(block);
        debug_assert!(self.check_heap());
    }

    /// Resize an allocation, moving it if necessary.
    ///
    /// `None` behaves like [`alloc`](Self::alloc); `size == 0` behaves like
    /// [`free`](Self::free). On failure the original allocation is left
    /// untouched and `None` is returned.
    pub fn realloc(&mut self, bp: Option<Payload>, size: usize) -> Option<Payload> {
        if size == 0 {
            self.free(bp);
            return None;
        }
        let Some(bp) = bp else {
            return self.alloc(size);
        };
        let new = self.alloc(size)?;
        let copy = self.payload_size(bp).min(size);
        self.seg.copy_within(bp.0, new.0, copy);
        self.free(Some(bp));
        Some(new)
    }

    /// Allocate a zeroed region for `count` elements of `size` bytes.
    ///
    /// Returns `None` when `count * size` overflows or the allocation
    /// fails.
    pub fn calloc(&mut self, count: usize, size: usize) -> Option<Payload> {
        let total = count.checked_mul(size)?;
        let bp = self.alloc(total)?;
        self.seg.bytes_mut(bp.0, total).fill(0);
        Some(bp)
    }

    /// The payload bytes of an allocation.
    pub fn payload(&self, bp: Payload) -> &[u8] {
        self.seg.bytes(bp.0, self.payload_size(bp))
    }

    /// The payload bytes of an allocation, mutably.
    pub fn payload_mut(&mut self, bp: Payload) -> &mut [u8] {
        let size = self.payload_size(bp);
        self.seg.bytes_mut(bp.0, size)
    }

    /// Usable bytes of an allocation: the block size minus the header word.
    pub fn payload_size(&self, bp: Payload) -> usize {
        self.header(bp.0 - WSIZE).size() - WSIZE
    }

    /// Total bytes of the underlying segment, sentinels included.
    pub fn size(&self) -> usize {
        self.seg.end()
    }

    /// Grow the segment and shape the fresh memory into one free block.
    ///
    /// The former epilogue word becomes the new block's header, inheriting
    /// the epilogue's `prev_*` flags; a fresh epilogue describing the new
    /// block is written at the new end. Coalesces in case the block before
    /// the extension was free.
    fn extend_heap(&mut self, size: usize) -> Result<usize, SegmentFull> {
        let old_epilogue = self.epilogue();
        let flags = self.header(old_epilogue);

        let size = round_up(size, DSIZE).unwrap_or(usize::MAX);
        let old_brk = self.seg.sbrk(size)?;
        log::debug!("heap extended by {size} bytes to {}", self.seg.end());

        let block = old_brk - WSIZE;
        debug_assert_eq!(block, old_epilogue);
        let h = Header::new(size, false)
            .with_prev_alloc(flags.prev_alloc())
            .with_prev_sseg(flags.prev_sseg());
        self.put_header(block, h);
        self.put_footer(block, h);

        let epilogue = Header::new(0, true).with_prev_sseg(size == MIN_BLOCK);
        self.put_header(block + size, epilogue);

        Ok(self.coalesce(block))
    }

    /// Carve an allocation of `asize` bytes out of the free `block`.
    ///
    /// Splits when the remainder can stand alone as a block; otherwise the
    /// whole block is consumed and the successor's flags are updated.
    fn place(&mut self, block: usize, asize: usize) {
        let h = self.header(block);
        let csize = h.size();
        self.remove_free(block);

        if csize - asize >= MIN_BLOCK {
            self.put_header(
                block,
                Header::new(asize, true)
                    .with_prev_alloc(h.prev_alloc())
                    .with_prev_sseg(h.prev_sseg()),
            );

            let rest = block + asize;
            let rest_header = Header::new(csize - asize, false)
                .with_prev_alloc(true)
                .with_prev_sseg(asize == MIN_BLOCK);
            self.put_header(rest, rest_header);
            self.put_footer(rest, rest_header);
            if csize - asize == MIN_BLOCK {
                self.set_prev_sseg(rest + (csize - asize), true);
            }
            self.insert_free(rest);
        } else {
            self.put_header(block, h.with_alloc(true));
            let next = block + csize;
            self.set_prev_alloc(next, true);
            if csize == MIN_BLOCK {
                self.set_prev_sseg(next, true);
            }
        }
    }

    /// Merge the free `block` with free neighbors and insert the result
    /// into the appropriate list. Returns the merged block.
    fn coalesce(&mut self, block: usize) -> usize {
        let h = self.header(block);
        let next = block + h.size();
        let next_header = self.header(next);

        let mut start = block;
        let mut size = h.size();
        let mut prev_sseg = h.prev_sseg();
        // size of the last heap block folded into the merged region; the
        // block after the region needs its prev_sseg cleared if that last
        // piece was minimum-sized (the merged block no longer is)
        let mut tail = h.size();
        let mut merged = false;

        if !h.prev_alloc() {
            let prev = self.prev_block(block);
            let prev_header = self.header(prev);
            self.remove_free(prev);
            start = prev;
            size += prev_header.size();
            prev_sseg = prev_header.prev_sseg();
            merged = true;
        }
        if !next_header.is_alloc() {
            self.remove_free(next);
            size += next_header.size();
            tail = next_header.size();
            merged = true;
        }

        if merged {
            // the merged block's predecessor is necessarily allocated (or
            // the prologue), otherwise it would have been merged as well
            let merged_header = Header::new(size, false)
                .with_prev_alloc(true)
                .with_prev_sseg(prev_sseg);
            self.put_header(start, merged_header);
            self.put_footer(start, merged_header);
            if tail == MIN_BLOCK {
                self.set_prev_sseg(start + size, false);
            }
        }
        self.insert_free(start);
        start
    }

    fn header(&self, block: usize) -> Header {
        Header::from_raw(self.seg.read_word(block))
    }

    fn put_header(&mut self, block: usize, h: Header) {
        self.seg.write_word(block, h.raw());
    }

    /// Write the mirror footer of a free block. Minimum-size blocks elide
    /// their footer, so this is a no-op for them.
    fn put_footer(&mut self, block: usize, h: Header) {
        if h.size() <= MIN_BLOCK {
            return;
        }
        self.seg.write_word(block + h.size() - WSIZE, h.raw());
    }

    /// The next block in address order.
    fn next_block(&self, block: usize) -> usize {
        block + self.header(block).size()
    }

    /// The previous block in address order. Only meaningful when the
    /// predecessor is free: either it is minimum-sized (`prev_sseg`) or
    /// its footer sits one word before this block's header.
    fn prev_block(&self, block: usize) -> usize {
        if self.header(block).prev_sseg() {
            block - MIN_BLOCK
        } else {
            block - Header::from_raw(self.seg.read_word(block - WSIZE)).size()
        }
    }

    fn set_prev_alloc(&mut self, block: usize, prev_alloc: bool) {
        let h = self.header(block).with_prev_alloc(prev_alloc);
        self.put_header(block, h);
    }

    fn set_prev_sseg(&mut self, block: usize, prev_sseg: bool) {
        let h = self.header(block).with_prev_sseg(prev_sseg);
        self.put_header(block, h);
    }

    /// Offset of the epilogue header word.
    fn epilogue(&self) -> usize {
        self.seg.end() - WSIZE
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "heap of {} bytes:", self.seg.end())?;
        let mut block = BASE;
        loop {
            let h = self.header(block);
            if h.size() == 0 {
                writeln!(f, "  {block:#8x} epilogue {h:?}")?;
                break;
            }
            writeln!(
                f,
                "  {block:#8x} {} size={}{}{}",
                if h.is_alloc() { "alloc" } else { "free " },
                h.size(),
                if h.prev_alloc() { " prev_alloc" } else { "" },
                if h.prev_sseg() { " prev_sseg" } else { "" },
            )?;
            block = self.next_block(block);
        }
        for (class, head) in self.classes.iter().enumerate() {
            let mut count = 0;
            let mut cur = *head;
            while let Some(block) = cur {
                count += 1;
                cur = self.next_free(block);
            }
            if count > 0 {
                writeln!(f, "  class {class}: {count} free")?;
            }
        }
        let mut small = 0;
        let mut cur = self.small;
        while let Some(block) = cur {
            small += 1;
            cur = self.next_free(block);
        }
        if small > 0 {
            writeln!(f, "  small list: {small} free")?;
        }
        Ok(())
    }
}
