//! Heap for the Cortex-M4 port.

extern crate alloc;

use core::alloc::Layout;
use core::mem::MaybeUninit;

#[global_allocator]
static ALLOCATOR: embedded_alloc::Heap = embedded_alloc::Heap::empty();

pub fn init_heap() {
    const HEAP_SIZE: usize = 32 * 1024;
    static mut HEAP: MaybeUninit<[u8; HEAP_SIZE]> = MaybeUninit::uninit();

    unsafe {
        ALLOCATOR.init(core::ptr::addr_of_mut!(HEAP) as usize, HEAP_SIZE);
    }
}

pub fn allocate(layout: Layout) -> *mut u8 {
    unsafe { alloc::alloc::alloc(layout) }
}

pub fn release(ptr: *mut u8, layout: Layout) {
    unsafe { alloc::alloc::dealloc(ptr, layout) }
}
