//! Heap accounting for `heap_delta`.
//!
//! Opt-in: the host installs [`TrackingAllocator`] as its global allocator.
//! Without it [`heap_in_use`] stays at 0 and every delta reads 0.
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: callscope_agent::TrackingAllocator = callscope_agent::TrackingAllocator;
//! ```

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicI64, Ordering};

static IN_USE: AtomicI64 = AtomicI64::new(0);

/// System allocator wrapper that keeps a process-wide byte counter
pub struct TrackingAllocator;

#[allow(clippy::cast_possible_wrap)]
fn bytes(layout: Layout) -> i64 {
    layout.size() as i64
}

// SAFETY: every call is forwarded unchanged to `System`; the counter is
// only bookkeeping and never affects the returned pointers.
#[allow(unsafe_code)]
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            IN_USE.fetch_add(bytes(layout), Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            IN_USE.fetch_add(bytes(layout), Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        IN_USE.fetch_sub(bytes(layout), Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            #[allow(clippy::cast_possible_wrap)]
            IN_USE.fetch_add(new_size as i64 - bytes(layout), Ordering::Relaxed);
        }
        new_ptr
    }
}

/// Bytes currently allocated through [`TrackingAllocator`]
#[must_use]
pub fn heap_in_use() -> i64 {
    IN_USE.load(Ordering::Relaxed)
}
