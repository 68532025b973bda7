//! Main heap allocator implementation
//!
//! # Safety
//!
//! The region is tiled at all times by non-overlapping blocks: free blocks
//! linked into the address-sorted free list, and allocated blocks whose
//! `AllocHeader` sits immediately before the payload pointer handed to the
//! caller. List surgery happens behind a mutex; usage counters are atomic
//! so capacity queries never take the lock.
//!
//! ## Invariants
//!
//! - Free blocks plus allocated blocks exactly tile the region: the sum of
//!   free sizes and `used_memory` equals the capacity at all times
//! - The free list is address-sorted with symmetric links, and no two
//!   physically adjacent free blocks exist (coalescing is eager)
//! - For every allocated pointer `p`, `p - padding - HEADER_SIZE` is the
//!   block start and the header's `size` is the block's full span
//! - Every block start is aligned to `BLOCK_ALIGN`, so either header view
//!   can be written in place

use core::alloc::Layout;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::config::HeapConfig;
use super::free_list::{
    AllocHeader, FreeBlock, FreeList, BLOCK_ALIGN, HEADER_SIZE, MIN_BLOCK_SIZE,
};
use crate::allocator::{
    AllocError, AllocResult, Allocator, AllocatorStats, MemoryUsage, Region, Resettable,
    StatisticsProvider,
};
use crate::utils::{align_up, atomic_max};

/// General-purpose heap allocator with best-fit allocation
///
/// Variable-size allocation over one fixed region. A best-fit search walks
/// the address-sorted free list for the smallest sufficient block; the
/// block is split when the remainder could stand on its own as a free
/// block, absorbed into the allocation otherwise. Deallocation recovers
/// the block from the in-band header and eagerly coalesces it with
/// address-adjacent free neighbors, so fragmentation never accumulates
/// beyond what the live allocations force.
///
/// # Memory Layout
/// ```text
/// [hdr|payload][size,next,prev ......][hdr|pad|payload][size,next,prev ..]
///  allocated    free                   allocated        free
/// ```
///
/// [`used_memory`](MemoryUsage::used_memory) reports reclamation sizes:
/// headers, alignment padding and absorbed split remainders all count, so
/// the figure exceeds the sum of requested payload sizes by the engine's
/// bookkeeping overhead. This is intentional: it is exactly the number of
/// bytes that return to the free pool on deallocation.
pub struct HeapAllocator {
    /// Owned backing region
    region: Region,

    /// Configuration
    config: HeapConfig,

    /// Address-sorted free list (lock-guarded; list surgery is not CAS-able)
    free_list: Mutex<FreeList>,

    /// Sum of reclamation sizes across all live allocations
    used: AtomicUsize,

    /// Statistics (only tracked if enabled)
    total_allocs: AtomicU32,
    total_deallocs: AtomicU32,
    failed_allocs: AtomicU32,
    peak_usage: AtomicUsize,
}

impl HeapAllocator {
    /// Creates a new heap allocator with custom configuration
    ///
    /// # Errors
    /// Returns an error if `capacity` cannot hold even a single free-block
    /// header.
    pub fn with_config(capacity: usize, config: HeapConfig) -> AllocResult<Self> {
        if capacity < MIN_BLOCK_SIZE {
            return Err(AllocError::invalid_layout(
                "heap capacity cannot hold a free-block header",
            ));
        }

        let region = Region::new(capacity, BLOCK_ALIGN, config.alloc_pattern);

        // SAFETY: The region was just allocated: the whole window is
        // exclusively owned, writable, and starts on a BLOCK_ALIGN boundary.
        let free_list = unsafe { FreeList::with_spanning_block(region.start(), capacity) };

        #[cfg(feature = "logging")]
        tracing::debug!(capacity, "heap allocator created");

        Ok(Self {
            region,
            config,
            free_list: Mutex::new(free_list),
            used: AtomicUsize::new(0),
            total_allocs: AtomicU32::new(0),
            total_deallocs: AtomicU32::new(0),
            failed_allocs: AtomicU32::new(0),
            peak_usage: AtomicUsize::new(0),
        })
    }

    /// Creates a new heap allocator with default configuration
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, HeapConfig::default())
    }

    /// Creates a production-optimized heap allocator
    pub fn production(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, HeapConfig::production())
    }

    /// Creates a debug-optimized heap allocator
    pub fn debug(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, HeapConfig::debug())
    }

    /// Returns the total capacity of the allocator
    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Returns the amount of memory currently allocated, bookkeeping
    /// included
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Returns the sum of all free block sizes
    ///
    /// Walks the free list. `free_memory() + used()` equals the capacity at
    /// all times (the tiling invariant); note that a request can still fail
    /// when no single free block is large enough.
    pub fn free_memory(&self) -> usize {
        self.free_list.lock().total_free()
    }

    /// Returns the number of blocks on the free list
    pub fn free_block_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the size of the largest free block
    ///
    /// An upper bound on the largest currently satisfiable request,
    /// headers included.
    pub fn largest_free_block(&self) -> usize {
        self.free_list.lock().largest()
    }

    /// Checks if a pointer belongs to this heap
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.region.contains(ptr as usize)
    }

    /// Actual span needed to place `size` payload bytes `align`-aligned
    /// inside a block starting at `block_addr`
    ///
    /// The span is rounded up to `BLOCK_ALIGN` so the block following a
    /// split starts on a header-capable boundary; the rounded-up bytes are
    /// absorbed surplus.
    #[inline]
    fn required_span(block_addr: usize, size: usize, align: usize) -> usize {
        let data_start = block_addr + HEADER_SIZE;
        let aligned = align_up(data_start, align);
        let padding = aligned - data_start;
        align_up(HEADER_SIZE + padding + size, BLOCK_ALIGN)
    }

    fn record_failure(&self, layout: Layout) -> AllocError {
        if self.config.track_stats {
            self.failed_allocs.fetch_add(1, Ordering::Relaxed);
        }
        AllocError::out_of_memory(layout)
    }
}

// SAFETY: Returned pointers are aligned, in-bounds and disjoint: each
// successful allocation owns exactly the block span recorded in its header,
// and the free list only hands a block out once between deallocations.
unsafe impl Allocator for HeapAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        let size = layout.size();
        let align = layout.align();

        if size == 0 {
            return Err(AllocError::invalid_layout("zero-size allocation"));
        }

        // Conservative screening total: an upper bound that can be computed
        // without knowing the candidate block's address. Requests that fail
        // it cannot succeed regardless of fragmentation.
        let total = size
            .checked_add(HEADER_SIZE)
            .ok_or_else(|| AllocError::size_overflow("allocation size"))?;
        if total > usize::MAX - (align - 1) {
            return Err(AllocError::size_overflow("aligned allocation size"));
        }
        let screened = align_up(total, align);
        if screened > self.capacity() - self.used() {
            return Err(self.record_failure(layout));
        }

        let mut list = self.free_list.lock();

        // Best-fit over the exact per-block requirement: the fit closure
        // accounts for the padding this block's own address forces, so a
        // chosen block is always genuinely large enough.
        let Some((block, required)) = list.best_fit(|addr| Self::required_span(addr, size, align))
        else {
            drop(list);
            return Err(self.record_failure(layout));
        };

        // SAFETY: block came from the list and is exclusively ours once
        // removed; all derived addresses stay inside its span.
        unsafe {
            list.remove(block);

            let block_addr = block.as_ptr() as usize;
            let block_size = block.as_ref().size;

            let data_start = block_addr + HEADER_SIZE;
            let aligned = align_up(data_start, align);
            let padding = aligned - data_start;

            // Split when the remainder can stand on its own as a free
            // block; otherwise the surplus is absorbed into the allocation.
            let reclaim_size = if block_size >= required + MIN_BLOCK_SIZE {
                let remainder = (block_addr + required) as *mut FreeBlock;
                (*remainder).size = block_size - required;
                list.insert(NonNull::new_unchecked(remainder));
                required
            } else {
                block_size
            };

            debug_assert!(list.is_well_formed());
            drop(list);

            let header = (aligned - HEADER_SIZE) as *mut AllocHeader;
            (*header).size = reclaim_size;
            (*header).padding = padding;

            let new_used = self.used.fetch_add(reclaim_size, Ordering::AcqRel) + reclaim_size;

            if self.config.track_stats {
                self.total_allocs.fetch_add(1, Ordering::Relaxed);
                atomic_max(&self.peak_usage, new_used);
            }

            if let Some(pattern) = self.config.alloc_pattern {
                ptr::write_bytes(aligned as *mut u8, pattern, size);
            }

            Ok(NonNull::slice_from_raw_parts(
                NonNull::new_unchecked(aligned as *mut u8),
                size,
            ))
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        let addr = ptr.as_ptr() as usize;

        // A pointer this engine never produced indicates a caller bug.
        let foreign = !self.region.contains(addr);
        debug_assert!(!foreign, "pointer does not belong to this heap");
        if foreign {
            return;
        }

        // SAFETY: addr was returned by allocate (caller's contract), so an
        // AllocHeader sits immediately below it and describes the block.
        unsafe {
            let header = (addr - HEADER_SIZE) as *const AllocHeader;
            let block_size = (*header).size;
            let padding = (*header).padding;
            let block_addr = addr - HEADER_SIZE - padding;

            debug_assert!(block_addr >= self.region.start());
            debug_assert!(block_addr + block_size <= self.region.end());
            debug_assert!(block_size >= MIN_BLOCK_SIZE);

            if let Some(pattern) = self.config.dealloc_pattern {
                ptr::write_bytes(block_addr as *mut u8, pattern, block_size);
            }

            self.used.fetch_sub(block_size, Ordering::AcqRel);

            let mut list = self.free_list.lock();
            let block = block_addr as *mut FreeBlock;
            (*block).size = block_size;
            let block = NonNull::new_unchecked(block);
            list.insert(block);
            list.coalesce(block);
            debug_assert!(list.is_well_formed());
        }

        if self.config.track_stats {
            self.total_deallocs.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl MemoryUsage for HeapAllocator {
    fn used_memory(&self) -> usize {
        self.used()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.capacity() - self.used())
    }

    fn total_memory(&self) -> Option<usize> {
        Some(self.capacity())
    }
}

impl Resettable for HeapAllocator {
    /// Reinstalls a single free block spanning the whole region
    ///
    /// # Safety
    /// Caller must ensure no allocation from this heap is still in use.
    unsafe fn reset(&self) {
        let mut list = self.free_list.lock();

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: No allocation is live (caller's contract), so the
            // whole window can be scribbled.
            unsafe {
                ptr::write_bytes(
                    self.region.start() as *mut u8,
                    pattern,
                    self.region.capacity(),
                );
            }
        }

        // SAFETY: The region window is owned and aligned; liveness is the
        // caller's contract.
        unsafe {
            list.install_spanning_block(self.region.start(), self.region.capacity());
        }
        self.used.store(0, Ordering::Release);

        if self.config.track_stats {
            self.total_allocs.store(0, Ordering::Relaxed);
            self.total_deallocs.store(0, Ordering::Relaxed);
            self.failed_allocs.store(0, Ordering::Relaxed);
            self.peak_usage.store(0, Ordering::Relaxed);
        }
    }

    fn can_reset(&self) -> bool {
        true
    }
}

impl StatisticsProvider for HeapAllocator {
    fn statistics(&self) -> AllocatorStats {
        AllocatorStats {
            allocated_bytes: self.used(),
            peak_allocated_bytes: if self.config.track_stats {
                self.peak_usage.load(Ordering::Relaxed)
            } else {
                self.used()
            },
            allocation_count: self.total_allocs.load(Ordering::Relaxed) as usize,
            deallocation_count: self.total_deallocs.load(Ordering::Relaxed) as usize,
            failed_allocations: self.failed_allocs.load(Ordering::Relaxed) as usize,
        }
    }

    fn reset_statistics(&self) {
        if self.config.track_stats {
            self.total_allocs.store(0, Ordering::Relaxed);
            self.total_deallocs.store(0, Ordering::Relaxed);
            self.failed_allocs.store(0, Ordering::Relaxed);
            self.peak_usage.store(0, Ordering::Relaxed);
        }
    }

    fn statistics_enabled(&self) -> bool {
        self.config.track_stats
    }
}

// SAFETY: The free list sits behind a mutex and all counters are atomic;
// the region is interior-mutable behind them.
unsafe impl Send for HeapAllocator {}
unsafe impl Sync for HeapAllocator {}
