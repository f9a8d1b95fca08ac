//! Memory-hierarchy exercises: a cache simulator and a heap allocator
//!
//! This crate bundles two self-contained pieces of systems code that share
//! one theme, exact control of memory layout and reasoning about cache
//! behavior:
//!
//! - [`cache`]: a set-associative cache model with LRU replacement,
//!   write-allocate/write-back semantics and dirty-byte accounting, driven
//!   by valgrind-style memory traces. The `csim` binary replays a trace
//!   file against a configurable geometry and prints the six summary
//!   counters.
//! - [`heap`]: a dynamic memory allocator offering the classic C quartet
//!   (`alloc`, `free`, `realloc`, `calloc`) on top of a segregated free
//!   list with footer elision and immediate coalescing.
//!
//! # Cache simulation
//!
//! ```
//! use memkit::cache::{trace::Record, Cache, Config};
//!
//! let mut cache = Cache::new(Config::new(4, 1, 4).unwrap());
//! for line in ["L 10,4", "S 18,4", "M 10,4"] {
//!     if let Some(record) = Record::parse(line) {
//!         cache.replay(record);
//!     }
//! }
//! assert_eq!(cache.counters().hits, 3);
//! ```
//!
//! # Heap allocation
//!
//! The allocator never touches raw pointers: its heap is an owned,
//! `sbrk`-grown byte segment and every block reference is a byte offset
//! into it. That makes the intrusive free lists ordinary words in block
//! bodies, keeps the whole allocator in safe code, and leaves the on-heap
//! layout bit-for-bit what a pointer-based implementation would produce:
//!
//! ```text
//!  allocated block        free block, 16 bytes    free block, larger
//! +----------------+     +----------------+      +----------------+
//! | header         |     | header         |      | header         |
//! +----------------+     +----------------+      +----------------+
//! | payload        |     | next link      |      | next link      |
//! | ...            |     +----------------+      | prev link      |
//! +----------------+                             | ...            |
//!                                                | footer         |
//!                                                +----------------+
//! ```
//!
//! Each header word packs the block size with three flag bits describing
//! the block and its predecessor, so footers can be elided on allocated
//! and minimum-size blocks while the heap stays navigable in both
//! directions.
//!
//! ```
//! use memkit::heap::Heap;
//!
//! let mut heap = Heap::new().unwrap();
//! let bp = heap.alloc(100).unwrap();
//! heap.payload_mut(bp)[..5].copy_from_slice(b"hello");
//! let bp = heap.realloc(Some(bp), 1000).unwrap();
//! assert_eq!(&heap.payload(bp)[..5], b"hello");
//! heap.free(Some(bp));
//! ```
//!
//! [`Heap`](heap::Heap) is a plain value; the [`heap::global`] module
//! holds the single process-wide instance behind a `spin::Mutex` for
//! callers that want the C-style entry points without threading a heap
//! through their code.
//!
//! Both subsystems are single-threaded, synchronous state machines. The
//! heap checker ([`Heap::check_heap`](heap::Heap::check_heap)) verifies
//! the allocator's structural invariants and is asserted around every
//! public operation in debug builds.

pub mod cache;
pub mod heap;
