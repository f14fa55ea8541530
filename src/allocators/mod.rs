//! Kernel heap allocator.
//!
//! A bump allocator with no real free: allocations only move the cursor
//! forward, `dealloc` is a no-op, and [`BumpAllocator::reset`] rewinds the
//! whole arena at once. That is the entire lifetime story of this kernel's
//! allocations (back buffers and layer buffers, made once at boot), so
//! nothing more is needed.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

pub struct BumpAllocator {
    heap_start: AtomicUsize,
    heap_end: AtomicUsize,
    next: AtomicUsize,
}

impl BumpAllocator {
    pub const fn new() -> Self {
        Self {
            heap_start: AtomicUsize::new(0),
            heap_end: AtomicUsize::new(0),
            next: AtomicUsize::new(0),
        }
    }

    /// Point the allocator at its arena. The region must stay exclusively
    /// owned by this allocator from here on.
    pub unsafe fn init(&self, heap_start: usize, heap_size: usize) {
        self.heap_start.store(heap_start, Ordering::Relaxed);
        self.heap_end.store(heap_start + heap_size, Ordering::Relaxed);
        self.next.store(heap_start, Ordering::Relaxed);
    }

    /// Rewind the arena, invalidating every outstanding allocation. Only
    /// sound while nothing allocated from it is still alive.
    pub unsafe fn reset(&self) {
        self.next
            .store(self.heap_start.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    pub fn used(&self) -> usize {
        self.next.load(Ordering::Relaxed) - self.heap_start.load(Ordering::Relaxed)
    }
}

unsafe impl GlobalAlloc for BumpAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size();
        let align = layout.align();
        let heap_end = self.heap_end.load(Ordering::Relaxed);

        loop {
            let current = self.next.load(Ordering::Relaxed);
            let aligned = align_up(current, align);
            let new_next = aligned + size;

            if new_next > heap_end {
                return ptr::null_mut();
            }

            if self
                .next
                .compare_exchange(current, new_next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return aligned as *mut u8;
            }
        }
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
        // Bump allocator doesn't support deallocation
    }
}

fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(64))]
    struct Arena([u8; 1024]);

    #[test]
    fn allocations_are_aligned_and_disjoint() {
        let arena = Arena([0; 1024]);
        let allocator = BumpAllocator::new();
        unsafe { allocator.init(arena.0.as_ptr() as usize, 1024) };

        let a = unsafe { allocator.alloc(Layout::from_size_align(10, 8).unwrap()) };
        let b = unsafe { allocator.alloc(Layout::from_size_align(32, 32).unwrap()) };

        assert!(!a.is_null() && !b.is_null());
        assert_eq!(a as usize % 8, 0);
        assert_eq!(b as usize % 32, 0);
        assert!(b as usize >= a as usize + 10);
    }

    #[test]
    fn exhaustion_yields_null_and_reset_rewinds() {
        let arena = Arena([0; 1024]);
        let allocator = BumpAllocator::new();
        unsafe { allocator.init(arena.0.as_ptr() as usize, 1024) };

        let layout = Layout::from_size_align(512, 8).unwrap();
        assert!(!unsafe { allocator.alloc(layout) }.is_null());
        assert!(!unsafe { allocator.alloc(layout) }.is_null());
        assert!(unsafe { allocator.alloc(layout) }.is_null());

        unsafe { allocator.reset() };
        assert_eq!(allocator.used(), 0);
        assert!(!unsafe { allocator.alloc(layout) }.is_null());
    }
}
