use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Global allocator wrapper that tracks live bytes, the high-water mark and
/// the number of allocations since the last [`CountingAlloc::reset`].
pub struct CountingAlloc {
    live: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicUsize,
}

/// Snapshot taken by [`CountingAlloc::measure`].
#[derive(Clone, Copy, Debug)]
pub struct AllocStats {
    pub peak_bytes: usize,
    pub allocations: usize,
}

impl AllocStats {
    pub fn peak_kib(&self) -> f64 {
        self.peak_bytes as f64 / 1024.0
    }
}

impl CountingAlloc {
    pub const fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
        }
    }

    pub fn reset(&self) {
        self.live.store(0, Ordering::SeqCst);
        self.peak.store(0, Ordering::SeqCst);
        self.allocations.store(0, Ordering::SeqCst);
    }

    /// Run `f` from a clean counter and report what it allocated.
    pub fn measure<T>(&self, f: impl FnOnce() -> T) -> (T, AllocStats) {
        self.reset();
        let out = f();
        let stats = AllocStats {
            peak_bytes: self.peak.load(Ordering::SeqCst),
            allocations: self.allocations.load(Ordering::SeqCst),
        };
        (out, stats)
    }

    fn grow(&self, bytes: usize) {
        let live = self.live.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.peak.fetch_max(live, Ordering::SeqCst);
    }

    fn shrink(&self, bytes: usize) {
        // Memory allocated before a reset may be freed after it.
        let _ = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                Some(live.saturating_sub(bytes))
            });
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            self.grow(layout.size());
            self.allocations.fetch_add(1, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        self.shrink(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.grow(layout.size());
            self.allocations.fetch_add(1, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            match new_size.checked_sub(layout.size()) {
                Some(grown) => self.grow(grown),
                None => self.shrink(layout.size() - new_size),
            }
            self.allocations.fetch_add(1, Ordering::SeqCst);
        }
        new_ptr
    }
}
