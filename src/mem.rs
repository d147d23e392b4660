//! Heap accounting for the memory lessons.
//!
//! A desktop process has no `xPortGetFreeHeapSize`, so the memory
//! lessons install [`CountingAlloc`] as their global allocator and
//! read live/peak usage from it, then measure requests against a
//! pretend device budget.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

static USED: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);

/// Pass-through allocator that keeps a live-bytes count. Lessons that
/// care declare it:
///
/// ```ignore
/// #[global_allocator]
/// static ALLOC: rtos_patterns::mem::CountingAlloc = rtos_patterns::mem::CountingAlloc;
/// ```
pub struct CountingAlloc;

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            let used = USED.fetch_add(layout.size(), Ordering::Relaxed) + layout.size();
            PEAK.fetch_max(used, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        USED.fetch_sub(layout.size(), Ordering::Relaxed);
    }
}

/// Live heap bytes right now. Zero unless [`CountingAlloc`] is
/// installed.
pub fn heap_used() -> usize {
    USED.load(Ordering::Relaxed)
}

/// High-water mark of live heap bytes.
pub fn heap_peak() -> usize {
    PEAK.load(Ordering::Relaxed)
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("NOT ENOUGH HEAP MEMORY: need {needed} B, {free} B free")]
pub struct OutOfHeap {
    pub needed: usize,
    pub free: usize,
}

/// The pretend device RAM the lessons budget against.
pub struct HeapBudget {
    limit: usize,
}

impl HeapBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes left under the budget.
    pub fn free(&self) -> usize {
        self.limit.saturating_sub(heap_used())
    }

    /// The malloc-guard the lessons teach: refuse a request that would
    /// blow the budget, so the caller can drop the work instead of the
    /// device falling over.
    pub fn check(&self, needed: usize) -> Result<(), OutOfHeap> {
        let free = self.free();
        if needed > free {
            Err(OutOfHeap { needed, free })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[global_allocator]
    static TEST_ALLOC: CountingAlloc = CountingAlloc;

    #[test]
    fn test_peak_sees_large_allocation() {
        let big = vec![0u8; 256 * 1024];
        // While `big` is alive the live count includes it, so the peak
        // must too. Peak never goes back down, which keeps this stable
        // whatever the other tests allocate.
        assert!(heap_peak() >= 256 * 1024);
        drop(big);
        assert!(heap_peak() >= 256 * 1024);
    }

    #[test]
    fn test_used_tracks_live_bytes() {
        let held = vec![0u8; 128 * 1024];
        // The global live count is a sum of live allocations, so while
        // ours is alive it can never read below our size, no matter
        // what the tests on other threads do.
        assert!(heap_used() >= 128 * 1024, "live count missed the allocation");
        drop(held);
    }

    #[test]
    fn test_budget_check() {
        let budget = HeapBudget::new(usize::MAX);
        assert!(budget.check(1024).is_ok());

        let tiny = HeapBudget::new(0);
        let err = tiny.check(16).unwrap_err();
        assert_eq!(err.needed, 16);
        assert_eq!(err.free, 0);
        assert!(err.to_string().contains("NOT ENOUGH HEAP MEMORY"));
    }
}
