//! The process-wide heap instance.
//!
//! [`Heap`] keeps all allocator state in a value, so everything below the
//! public surface is free of globals. This module is the one place holding
//! a static instance, guarded by a `spin::Mutex` so the C-style entry
//! points can be called from anywhere. The heap is created lazily on first
//! use.

use super::{Heap, Payload};

use spin::Mutex;

static HEAP: Mutex<Option<Heap>> = Mutex::new(None);

/// Run `f` against the process-wide heap, creating it on first use.
///
/// Returns `None` only when the initial segment cannot be created.
pub fn with<R>(f: impl FnOnce(&mut Heap) -> R) -> Option<R> {
    let mut guard = HEAP.lock();
    if guard.is_none() {
        *guard = Heap::new().ok();
    }
    guard.as_mut().map(f)
}

/// Allocate `size` bytes on the process-wide heap.
pub fn alloc(size: usize) -> Option<Payload> {
    with(|heap| heap.alloc(size)).flatten()
}

/// Release an allocation made through this module.
pub fn free(bp: Option<Payload>) {
    let _ = with(|heap| heap.free(bp));
}

/// Resize an allocation made through this module.
pub fn realloc(bp: Option<Payload>, size: usize) -> Option<Payload> {
    with(|heap| heap.realloc(bp, size)).flatten()
}

/// Allocate a zeroed region on the process-wide heap.
pub fn calloc(count: usize, size: usize) -> Option<Payload> {
    with(|heap| heap.calloc(count, size)).flatten()
}
