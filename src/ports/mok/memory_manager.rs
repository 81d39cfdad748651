//! Mok memory manager: forwards to the host allocator and counts every
//! allocate/release pair so tests can assert exact-once freeing.

extern crate alloc;

use core::alloc::Layout;
use core::sync::atomic::{AtomicUsize, Ordering};

static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);
static RELEASES: AtomicUsize = AtomicUsize::new(0);

/// The host test binary brings its own heap; nothing to prepare.
pub fn init_heap() {}

pub fn allocate(layout: Layout) -> *mut u8 {
    ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    unsafe { alloc::alloc::alloc(layout) }
}

pub fn release(ptr: *mut u8, layout: Layout) {
    RELEASES.fetch_add(1, Ordering::Relaxed);
    unsafe { alloc::alloc::dealloc(ptr, layout) }
}

/// Number of kernel allocations since the last counter reset.
pub fn allocation_count() -> usize {
    ALLOCATIONS.load(Ordering::Relaxed)
}

/// Number of kernel releases since the last counter reset.
pub fn release_count() -> usize {
    RELEASES.load(Ordering::Relaxed)
}

/// Zero both counters.
pub fn reset_counters() {
    ALLOCATIONS.store(0, Ordering::Relaxed);
    RELEASES.store(0, Ordering::Relaxed);
}
