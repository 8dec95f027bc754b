//! Transient allocator - lock-free monotonic offset reservation
//!
//! Hands out aligned byte ranges of a per-frame backing buffer. Any thread
//! may allocate; a reservation is a single compare-and-swap on the shared
//! offset. There is no individual free: the whole buffer is reset at the frame
//! boundary. When a request does not fit, `allocate` returns `None` and the
//! request is remembered so the owner can grow the buffer before the next
//! frame.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::align_up;

/// A reserved byte range inside the backing buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransientRange {
    /// Byte offset from the start of the buffer
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
}

impl TransientRange {
    /// One past the last byte
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Lock-free monotonic allocator over a fixed capacity
#[derive(Debug)]
pub struct TransientAllocator {
    /// Next free byte
    offset: AtomicUsize,
    /// Total capacity in bytes
    capacity: usize,
    /// Smallest capacity that would have satisfied every request this frame
    required: AtomicUsize,
    /// Failed requests this frame
    overflows: AtomicU32,
}

impl TransientAllocator {
    /// Create an allocator with the given capacity in bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            offset: AtomicUsize::new(0),
            capacity,
            required: AtomicUsize::new(0),
            overflows: AtomicU32::new(0),
        }
    }

    /// Create with a capacity in KB
    pub fn with_capacity_kb(kb: usize) -> Self {
        Self::new(kb * 1024)
    }

    /// Reserve `size` bytes aligned to `align` (a power of two).
    ///
    /// Returns `None` when the buffer cannot hold the request; the caller
    /// drops that geometry for this frame.
    pub fn allocate(&self, size: usize, align: usize) -> Option<TransientRange> {
        debug_assert!(align.is_power_of_two());

        let mut current = self.offset.load(Ordering::Relaxed);
        loop {
            let aligned = align_up(current, align);
            let end = match aligned.checked_add(size) {
                Some(end) => end,
                None => {
                    self.overflows.fetch_add(1, Ordering::Relaxed);
                    self.required.store(usize::MAX, Ordering::Relaxed);
                    return None;
                }
            };

            if end > self.capacity {
                self.overflows.fetch_add(1, Ordering::Relaxed);
                self.required.fetch_max(end, Ordering::Relaxed);
                return None;
            }

            match self.offset.compare_exchange_weak(
                current,
                end,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.required.fetch_max(end, Ordering::Relaxed);
                    return Some(TransientRange { offset: aligned, size });
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Rewind to zero for a new frame
    pub fn reset(&mut self) {
        *self.offset.get_mut() = 0;
        *self.required.get_mut() = 0;
        *self.overflows.get_mut() = 0;
    }

    /// Change the capacity. Only legal between frames, so it also resets.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.reset();
    }

    /// Total capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes reserved so far (including alignment padding)
    #[inline]
    pub fn used(&self) -> usize {
        self.offset.load(Ordering::Acquire)
    }

    /// Bytes still available
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    /// Number of failed allocations since the last reset
    pub fn overflow_count(&self) -> u32 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Capacity that would have fit every request since the last reset
    pub fn required_capacity(&self) -> usize {
        self.required.load(Ordering::Relaxed)
    }

    /// Whether any request failed since the last reset
    pub fn overflowed(&self) -> bool {
        self.overflow_count() > 0
    }
}

impl Default for TransientAllocator {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}
