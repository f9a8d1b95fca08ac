//! The heap checker: structural invariant verification for debugging.
//!
//! The checker never repairs anything. Every violation is reported through
//! `log::error!` and turns the result `false`; the public operations assert
//! it in debug builds only.

use super::header::{Header, DSIZE, MIN_BLOCK, WSIZE};
use super::{Heap, BASE};

use log::error;

impl Heap {
    /// Verify the heap's structural invariants.
    ///
    /// Checks every class list and the small list (entries free, in
    /// bounds, well-sized, present in the heap), then walks the block
    /// sequence (bounds, sizes, footer mirrors, no adjacent free blocks,
    /// predecessor flags coherent, every free block on exactly one list).
    pub fn check_heap(&self) -> bool {
        self.check_class_lists() && self.check_small_list() && self.check_block_sequence()
    }

    /// Whether `block` can be dereferenced at all: room for a header and
    /// the first link word, on a word boundary.
    fn in_bounds(&self, block: usize) -> bool {
        block % WSIZE == 0 && block >= BASE && block + 2 * WSIZE <= self.seg.end()
    }

    fn check_class_lists(&self) -> bool {
        for (class, &head) in self.classes.iter().enumerate() {
            let mut cur = head;
            while let Some(block) = cur {
                if !self.in_bounds(block) {
                    error!("class {class}: block {block:#x} out of bounds");
                    return false;
                }
                let h = self.header(block);
                if h.is_alloc() {
                    error!("class {class}: allocated block {block:#x} on the free list");
                    return false;
                }
                if h.size() % DSIZE != 0 || h.size() <= MIN_BLOCK {
                    error!("class {class}: block {block:#x} has invalid size {}", h.size());
                    return false;
                }
                if block + h.size() > self.seg.end() {
                    error!("class {class}: block {block:#x} overruns the segment");
                    return false;
                }
                if Self::class_of(h.size()) != class {
                    error!(
                        "class {class}: block {block:#x} of {} bytes belongs to class {}",
                        h.size(),
                        Self::class_of(h.size())
                    );
                    return false;
                }
                let footer = Header::from_raw(self.seg.read_word(block + h.size() - WSIZE));
                if footer.size() != h.size() || footer.is_alloc() != h.is_alloc() {
                    error!("class {class}: block {block:#x} footer disagrees with header");
                    return false;
                }
                if !self.block_exists(block) {
                    error!("class {class}: block {block:#x} not in the heap");
                    return false;
                }
                if let Some(next) = self.next_free(block) {
                    // room for header plus both link words before reading
                    // the back link
                    if next % WSIZE != 0
                        || next + 3 * WSIZE > self.seg.end()
                        || self.prev_free(next) != Some(block)
                    {
                        error!("class {class}: broken back link between {block:#x} and {next:#x}");
                        return false;
                    }
                }
                cur = self.next_free(block);
            }
        }
        true
    }

    fn check_small_list(&self) -> bool {
        let mut cur = self.small;
        while let Some(block) = cur {
            if !self.in_bounds(block) {
                error!("small list: block {block:#x} out of bounds");
                return false;
            }
            let h = self.header(block);
            if h.is_alloc() {
                error!("small list: allocated block {block:#x}");
                return false;
            }
            if h.size() != MIN_BLOCK {
                error!("small list: block {block:#x} has size {}", h.size());
                return false;
            }
            if !self.block_exists(block) {
                error!("small list: block {block:#x} not in the heap");
                return false;
            }
            cur = self.next_free(block);
        }
        true
    }

    fn check_block_sequence(&self) -> bool {
        let epilogue = self.epilogue();
        let mut free_blocks = 0;
        let mut block = BASE;
        let mut prev: Option<Header> = None;

        loop {
            let h = self.header(block);
            if block == epilogue {
                if h.size() != 0 || !h.is_alloc() {
                    error!("epilogue {block:#x} is not a zero-size allocated word");
                    return false;
                }
                if !self.flags_match(block, h, prev) {
                    return false;
                }
                break;
            }
            if h.size() % DSIZE != 0 || h.size() < MIN_BLOCK {
                error!("block {block:#x} has invalid size {}", h.size());
                return false;
            }
            if block + h.size() > epilogue {
                error!("block {block:#x} of {} bytes overruns the heap", h.size());
                return false;
            }
            if !self.flags_match(block, h, prev) {
                return false;
            }
            if !h.is_alloc() {
                free_blocks += 1;
                if prev.is_some_and(|p| !p.is_alloc()) {
                    error!("adjacent free blocks at {block:#x}");
                    return false;
                }
                if h.size() > MIN_BLOCK {
                    let footer = Header::from_raw(self.seg.read_word(block + h.size() - WSIZE));
                    if footer.size() != h.size() || footer.is_alloc() != h.is_alloc() {
                        error!("free block {block:#x} footer disagrees with header");
                        return false;
                    }
                }
                if !self.on_free_list(block) {
                    error!("free block {block:#x} missing from the free lists");
                    return false;
                }
            }
            prev = Some(h);
            block += h.size();
        }

        // every free block is on a list and list entries are unique heap
        // blocks, so equal counts mean "exactly one list each"
        let listed = self.list_population();
        if listed != free_blocks {
            error!("{free_blocks} free blocks in the heap but {listed} list entries");
            return false;
        }
        true
    }

    /// Compare a block's `prev_*` flags against its actual predecessor.
    /// The first block's predecessor is the allocated, zero-size prologue.
    fn flags_match(&self, block: usize, h: Header, prev: Option<Header>) -> bool {
        let prev_alloc = prev.map_or(true, Header::is_alloc);
        let prev_sseg = prev.is_some_and(|p| p.size() == MIN_BLOCK);
        if h.prev_alloc() != prev_alloc {
            error!(
                "block {block:#x}: prev_alloc flag is {} but predecessor is {}",
                h.prev_alloc(),
                if prev_alloc { "allocated" } else { "free" },
            );
            return false;
        }
        if h.prev_sseg() != prev_sseg {
            error!(
                "block {block:#x}: prev_sseg flag is {} but predecessor {} minimum-sized",
                h.prev_sseg(),
                if prev_sseg { "is" } else { "is not" },
            );
            return false;
        }
        true
    }

    /// Whether `target` is a block header reached by the heap walk.
    fn block_exists(&self, target: usize) -> bool {
        let epilogue = self.epilogue();
        let mut block = BASE;
        while block < epilogue {
            if block == target {
                return true;
            }
            let size = self.header(block).size();
            if size == 0 {
                return false;
            }
            block += size;
        }
        false
    }

    /// Whether `target` is on the small list or any class list.
    fn on_free_list(&self, target: usize) -> bool {
        let mut cur = self.small;
        while let Some(block) = cur {
            if block == target {
                return true;
            }
            cur = self.next_free(block);
        }
        for &head in &self.classes {
            let mut cur = head;
            while let Some(block) = cur {
                if block == target {
                    return true;
                }
                cur = self.next_free(block);
            }
        }
        false
    }

    fn list_population(&self) -> usize {
        let mut count = 0;
        let mut cur = self.small;
        while let Some(block) = cur {
            count += 1;
            cur = self.next_free(block);
        }
        for &head in &self.classes {
            let mut cur = head;
            while let Some(block) = cur {
                count += 1;
                cur = self.next_free(block);
            }
        }
        count
    }
}
