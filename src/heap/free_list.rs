//! Segregated free lists and the bounded best-fit search.
//!
//! Blocks larger than the minimum live in one of [`NUM_CLASSES`] power-of-
//! two size classes, doubly linked through two words at the start of the
//! block body. Minimum-size blocks have room for a single link word only,
//! so they go on a dedicated singly linked list. Insertion is LIFO.
//!
//! The fit search is an N-th best-fit: it scans the requesting class and
//! everything above it, returns an exact-size match immediately, and
//! otherwise keeps the candidate with the smallest excess, giving up the
//! scan after [`NTH_FIT`] acceptable candidates.

use super::header::{MIN_BLOCK, WSIZE};
use super::Heap;

/// Number of segregated size classes; class `i` covers block sizes in
/// `(16 * 2^i, 16 * 2^(i+1)]`, the last class is unbounded above.
pub const NUM_CLASSES: usize = 11;

/// Number of acceptable candidates examined before the fit search settles
/// for the best one seen.
pub const NTH_FIT: usize = 25;

impl Heap {
    /// Size class of a block of `size` bytes. Only defined for blocks
    /// above the minimum size; those go on the small list instead.
    pub(super) fn class_of(size: usize) -> usize {
        debug_assert!(size > MIN_BLOCK);
        ((size - 1).ilog2() as usize - 4).min(NUM_CLASSES - 1)
    }

    /// The block's successor on its free list, read from the first link
    /// word of the body.
    pub(super) fn next_free(&self, block: usize) -> Option<usize> {
        match self.seg.read_word(block + WSIZE) {
            0 => None,
            ofs => Some(ofs as usize),
        }
    }

    /// The block's predecessor on its class list, read from the second
    /// link word. Small-list blocks have no such word.
    pub(super) fn prev_free(&self, block: usize) -> Option<usize> {
        match self.seg.read_word(block + 2 * WSIZE) {
            0 => None,
            ofs => Some(ofs as usize),
        }
    }

    fn set_next_free(&mut self, block: usize, link: Option<usize>) {
        self.seg.write_word(block + WSIZE, link.unwrap_or(0) as u64);
    }

    fn set_prev_free(&mut self, block: usize, link: Option<usize>) {
        self.seg.write_word(block + 2 * WSIZE, link.unwrap_or(0) as u64);
    }

    /// Push a free block onto the front of its list.
    pub(super) fn insert_free(&mut self, block: usize) {
        let size = self.header(block).size();
        if size <= MIN_BLOCK {
            self.set_next_free(block, self.small);
            self.small = Some(block);
            return;
        }

        let class = Self::class_of(size);
        let head = self.classes[class];
        self.set_next_free(block, head);
        self.set_prev_free(block, None);
        if let Some(head) = head {
            self.set_prev_free(head, Some(block));
        }
        self.classes[class] = Some(block);
    }

    /// Unlink a free block from whichever list holds it.
    pub(super) fn remove_free(&mut self, block: usize) {
        let size = self.header(block).size();
        if size <= MIN_BLOCK {
            // singly linked: walk to the predecessor
            let mut prev: Option<usize> = None;
            let mut cur = self.small;
            while let Some(b) = cur {
                if b == block {
                    let next = self.next_free(b);
                    match prev {
                        None => self.small = next,
                        Some(prev) => self.set_next_free(prev, next),
                    }
                    return;
                }
                prev = Some(b);
                cur = self.next_free(b);
            }
            debug_assert!(false, "block {block:#x} not on the small list");
            return;
        }

        let class = Self::class_of(size);
        match (self.prev_free(block), self.next_free(block)) {
            (None, None) => self.classes[class] = None,
            (Some(prev), None) => {
                self.set_next_free(prev, None);
            }
            (None, Some(next)) => {
                self.set_prev_free(next, None);
                self.classes[class] = Some(next);
            }
            (Some(prev), Some(next)) => {
                self.set_next_free(prev, Some(next));
                self.set_prev_free(next, Some(prev));
            }
        }
    }

    /// Find a free block of at least `asize` bytes, or `None`.
    pub(super) fn find_fit(&self, asize: usize) -> Option<usize> {
        if asize == MIN_BLOCK {
            // every small-list block fits a minimum-size request exactly
            if let Some(block) = self.small {
                return Some(block);
            }
        }

        let start = if asize == MIN_BLOCK {
            0
        } else {
            Self::class_of(asize)
        };
        let mut best: Option<(usize, usize)> = None;
        let mut candidates = 0;
        for class in start..NUM_CLASSES {
            let mut cur = self.classes[class];
            while let Some(block) = cur {
                let size = self.header(block).size();
                if size == asize {
                    return Some(block);
                }
                if size > asize {
                    let excess = size - asize;
                    if best.map_or(true, |(_, smallest)| excess < smallest) {
                        best = Some((block, excess));
                    }
                    candidates += 1;
                    if candidates == NTH_FIT {
                        return best.map(|(block, _)| block);
                    }
                }
                cur = self.next_free(block);
            }
        }
        best.map(|(block, _)| block)
    }
}

#[cfg(test)]
mod tests {
    use super::{Heap, NUM_CLASSES};

    #[test]
    fn class_boundaries() {
        assert_eq!(Heap::class_of(32), 0);
        assert_eq!(Heap::class_of(48), 1);
        assert_eq!(Heap::class_of(64), 1);
        assert_eq!(Heap::class_of(80), 2);
        assert_eq!(Heap::class_of(128), 2);
        assert_eq!(Heap::class_of(256), 3);
        assert_eq!(Heap::class_of(512), 4);
        assert_eq!(Heap::class_of(1024), 5);
        assert_eq!(Heap::class_of(2048), 6);
        assert_eq!(Heap::class_of(4096), 7);
        assert_eq!(Heap::class_of(4112), 8);
        assert_eq!(Heap::class_of(8192), 8);
        assert_eq!(Heap::class_of(16384), 9);
        assert_eq!(Heap::class_of(16400), 10);
        assert_eq!(Heap::class_of(1 << 24), NUM_CLASSES - 1);
    }

    #[test]
    fn exact_fit_wins_over_larger_blocks() {
        let mut heap = Heap::new().unwrap();
        let big = heap.alloc(120).unwrap();
        let f1 = heap.alloc(8).unwrap();
        let exact = heap.alloc(56).unwrap();
        let f2 = heap.alloc(8).unwrap();
        heap.free(Some(big));
        heap.free(Some(exact));
        // a 56-byte request has the exact 64-byte hole and the larger
        // 128-byte hole available; the exact one must win
        let bp = heap.alloc(56).unwrap();
        assert_eq!(bp.offset(), exact.offset());
        heap.free(Some(bp));
        heap.free(Some(f1));
        heap.free(Some(f2));
    }

    #[test]
    fn best_fit_prefers_smallest_excess() {
        let mut heap = Heap::new().unwrap();
        // carve three separated holes of 128, 64 and 96 block bytes
        let a = heap.alloc(120).unwrap();
        let f1 = heap.alloc(8).unwrap();
        let b = heap.alloc(56).unwrap();
        let f2 = heap.alloc(8).unwrap();
        let c = heap.alloc(88).unwrap();
        let f3 = heap.alloc(8).unwrap();
        heap.free(Some(a));
        heap.free(Some(b));
        heap.free(Some(c));
        // 72 bytes rounds to 80: the 96-byte hole has the smallest excess
        let bp = heap.alloc(72).unwrap();
        assert_eq!(bp.offset(), c.offset());
        heap.free(Some(bp));
        heap.free(Some(f1));
        heap.free(Some(f2));
        heap.free(Some(f3));
    }
}
