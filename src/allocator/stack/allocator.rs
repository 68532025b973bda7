//! Main stack allocator implementation

use core::alloc::Layout;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use super::{StackConfig, StackMarker};
use crate::allocator::{
    AllocError, AllocResult, Allocator, AllocatorStats, MemoryUsage, Region, Resettable,
    StatisticsProvider,
};
use crate::utils::{align_up, atomic_max, Backoff};

/// Base alignment of the region; matches the strictest fundamental
/// alignment so requests up to this alignment start with zero padding.
const BASE_ALIGN: usize = 16;

/// Stack allocator with monotonic bump allocation and bulk rewind
///
/// Allocation advances a single top offset; alignment padding is silently
/// absorbed into the consumed range. Individual allocations can never be
/// freed ([`deallocate`](Allocator::deallocate) is a contractual no-op);
/// memory is reclaimed in bulk by rewinding to a [`StackMarker`] or
/// resetting the whole region.
///
/// # Memory Layout
/// ```text
/// [start]--[alloc1]--[pad][alloc2]--[alloc3]--[top]----[free]----[end]
///           <-------- allocated -------->       <--- available --->
/// ```
///
/// Within a single pass the addresses returned by consecutive allocations
/// are strictly increasing.
pub struct StackAllocator {
    /// Owned backing region
    region: Region,

    /// Configuration
    config: StackConfig,

    /// Current top of stack as an absolute address (atomic for thread safety)
    top: AtomicUsize,

    /// Statistics (only tracked if enabled)
    total_allocs: AtomicU32,
    failed_allocs: AtomicU32,
    peak_usage: AtomicUsize,
}

impl StackAllocator {
    /// Creates a new stack allocator with custom configuration
    pub fn with_config(capacity: usize, config: StackConfig) -> AllocResult<Self> {
        if capacity == 0 {
            return Err(AllocError::invalid_layout("stack capacity must be nonzero"));
        }

        let region = Region::new(capacity, BASE_ALIGN, config.alloc_pattern);
        let top = AtomicUsize::new(region.start());

        #[cfg(feature = "logging")]
        tracing::debug!(capacity, "stack allocator created");

        Ok(Self {
            region,
            config,
            top,
            total_allocs: AtomicU32::new(0),
            failed_allocs: AtomicU32::new(0),
            peak_usage: AtomicUsize::new(0),
        })
    }

    /// Creates a new stack allocator with default configuration
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, StackConfig::default())
    }

    /// Creates a production-optimized stack allocator
    pub fn production(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, StackConfig::production())
    }

    /// Creates a debug-optimized stack allocator
    pub fn debug(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, StackConfig::debug())
    }

    /// Returns the total capacity of the allocator
    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Returns the amount of memory currently allocated
    ///
    /// Includes alignment padding absorbed between allocations.
    pub fn used(&self) -> usize {
        let top = self.top.load(Ordering::Acquire);
        top.saturating_sub(self.region.start())
    }

    /// Returns the amount of memory available for allocation
    pub fn available(&self) -> usize {
        self.capacity().saturating_sub(self.used())
    }

    /// Creates a marker at the current stack position
    ///
    /// The marker can later be handed to [`release`](Self::release) to
    /// rewind the stack, reclaiming every allocation made after this point
    /// in one step.
    pub fn mark(&self) -> StackMarker {
        StackMarker {
            position: self.top.load(Ordering::Acquire),
        }
    }

    /// Rewinds the stack to a previously taken marker
    ///
    /// Reclaims all allocations made after the marker was created. The
    /// operation mutates nothing when it is rejected.
    ///
    /// # Errors
    /// Returns [`AllocErrorKind::InvalidMarker`](crate::AllocErrorKind)
    /// if the marker lies ahead of the current top or outside the region.
    ///
    /// # Safety
    /// - The marker must have been taken from this allocator
    /// - All pointers to memory allocated after the marker become invalid
    pub unsafe fn release(&self, marker: StackMarker) -> AllocResult<()> {
        let current_top = self.top.load(Ordering::Acquire);

        if marker.position > current_top {
            return Err(AllocError::invalid_marker("marker is ahead of the current top"));
        }
        if marker.position < self.region.start() || marker.position > self.region.end() {
            return Err(AllocError::invalid_marker("marker from another region"));
        }

        // Scribble over the released range so stale reads are caught early.
        if let Some(pattern) = self.config.dealloc_pattern {
            unsafe {
                ptr::write_bytes(
                    marker.position as *mut u8,
                    pattern,
                    current_top - marker.position,
                );
            }
        }

        self.top.store(marker.position, Ordering::Release);
        Ok(())
    }

    /// Attempts to allocate with a CAS loop over the top pointer
    fn try_allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let mut backoff = if self.config.use_backoff {
            Some(Backoff::new())
        } else {
            None
        };
        let mut attempts = 0;

        loop {
            if attempts >= self.config.max_retries {
                return None;
            }

            let current_top = self.top.load(Ordering::Acquire);
            let aligned_addr = align_up(current_top, align);
            let new_top = aligned_addr.checked_add(size)?;

            if new_top > self.region.end() {
                return None;
            }

            let result = if attempts == 0 {
                self.top
                    .compare_exchange(current_top, new_top, Ordering::AcqRel, Ordering::Acquire)
            } else {
                self.top.compare_exchange_weak(
                    current_top,
                    new_top,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
            };

            match result {
                Ok(_) => {
                    if self.config.track_stats {
                        self.total_allocs.fetch_add(1, Ordering::Relaxed);
                        atomic_max(&self.peak_usage, new_top - self.region.start());
                    }

                    if let Some(pattern) = self.config.alloc_pattern {
                        // SAFETY: [aligned_addr, new_top) was just claimed by
                        // the successful CAS and lies inside the region.
                        unsafe {
                            ptr::write_bytes(aligned_addr as *mut u8, pattern, size);
                        }
                    }

                    // SAFETY: aligned_addr points into the owned region.
                    return Some(unsafe { NonNull::new_unchecked(aligned_addr as *mut u8) });
                }
                Err(_) => {
                    attempts += 1;
                    if let Some(ref mut b) = backoff {
                        b.spin();
                    }
                }
            }
        }
    }
}

unsafe impl Allocator for StackAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            return Err(AllocError::invalid_layout("zero-size allocation"));
        }

        if let Some(ptr) = self.try_allocate(layout.size(), layout.align()) {
            Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
        } else {
            if self.config.track_stats {
                self.failed_allocs.fetch_add(1, Ordering::Relaxed);
            }
            Err(AllocError::out_of_memory(layout))
        }
    }

    /// Contractual no-op: stack allocations carry no per-allocation
    /// bookkeeping and can only be reclaimed in bulk via
    /// [`release`](StackAllocator::release) or [`reset`](Resettable::reset).
    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

impl MemoryUsage for StackAllocator {
    fn used_memory(&self) -> usize {
        self.used()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.available())
    }

    fn total_memory(&self) -> Option<usize> {
        Some(self.capacity())
    }
}

impl Resettable for StackAllocator {
    unsafe fn reset(&self) {
        let current_top = self.top.load(Ordering::Acquire);

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: [start, current_top) lies inside the owned region and
            // the caller guarantees no allocation is live.
            unsafe {
                ptr::write_bytes(
                    self.region.start() as *mut u8,
                    pattern,
                    current_top - self.region.start(),
                );
            }
        }

        self.top.store(self.region.start(), Ordering::Release);

        if self.config.track_stats {
            self.total_allocs.store(0, Ordering::Relaxed);
            self.failed_allocs.store(0, Ordering::Relaxed);
            self.peak_usage.store(0, Ordering::Relaxed);
        }
    }

    fn can_reset(&self) -> bool {
        true
    }
}

impl StatisticsProvider for StackAllocator {
    fn statistics(&self) -> AllocatorStats {
        AllocatorStats {
            allocated_bytes: self.used(),
            peak_allocated_bytes: if self.config.track_stats {
                self.peak_usage.load(Ordering::Relaxed)
            } else {
                self.used()
            },
            allocation_count: self.total_allocs.load(Ordering::Relaxed) as usize,
            // Stack reclamation is bulk-only; no per-allocation frees exist.
            deallocation_count: 0,
            failed_allocations: self.failed_allocs.load(Ordering::Relaxed) as usize,
        }
    }

    fn reset_statistics(&self) {
        if self.config.track_stats {
            self.total_allocs.store(0, Ordering::Relaxed);
            self.failed_allocs.store(0, Ordering::Relaxed);
            self.peak_usage.store(0, Ordering::Relaxed);
        }
    }

    fn statistics_enabled(&self) -> bool {
        self.config.track_stats
    }
}

// SAFETY: All mutation of the top offset goes through atomics; the backing
// region is interior-mutable behind them.
unsafe impl Send for StackAllocator {}
unsafe impl Sync for StackAllocator {}
