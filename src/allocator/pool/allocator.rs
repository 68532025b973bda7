//! Main pool allocator implementation
//!
//! # Safety
//!
//! This module implements a thread-safe pool allocator using a lock-free
//! free list:
//! - Fixed-size cells partitioned from one backing region
//! - Atomic head pointer with CAS for allocation/deallocation
//! - Free cells store the next free cell's address in their first word
//!   (intrusive list); the same bytes become user payload once allocated
//!
//! ## Invariants
//!
//! - Every cell is either reachable from the free head exactly once or
//!   currently allocated; the two sets partition the pool
//! - All cells sit at `start + i * block_size` and inherit the region's
//!   base alignment
//! - Cell pointers are validated on deallocation (bounds + stride)
//! - `free_count` mirrors the list length for O(1) queries

use core::alloc::Layout;
use core::mem;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, AtomicU32, AtomicUsize, Ordering};

use super::{PoolConfig, PoolStats};
use crate::allocator::{
    AllocError, AllocResult, Allocator, AllocatorStats, MemoryUsage, Region, Resettable,
    StatisticsProvider,
};
use crate::utils::{align_up, atomic_max, is_power_of_two, Backoff};

/// Node view of a free cell
///
/// While a cell is free its first bytes hold the link to the next free
/// cell; once allocated the full cell belongs to the caller. The two views
/// never coexist.
#[repr(C)]
struct FreeCell {
    next: *mut FreeCell,
}

/// Pool allocator for fixed-size blocks
///
/// Manages `block_count` equally-sized cells carved from one region.
/// Allocation detaches the head of the intrusive free list; deallocation
/// pushes the cell back, so a freed cell is the next one handed out (LIFO
/// reuse).
///
/// The caller-supplied layout is advisory: every successful allocation
/// returns a full cell of the configured size, and requests that do not
/// fit the cell geometry are rejected.
///
/// # Memory Layout
/// ```text
/// [Cell0][Cell1][Cell2][Cell3]...[CellN]
///    ↓      ↓      ↓      ↓         ↓
/// [free] → [free] → [used] [free] → null
/// ```
pub struct PoolAllocator {
    /// Owned backing region containing all cells
    region: Region,

    /// Size of each cell (after coercion and alignment)
    block_size: usize,

    /// Alignment of each cell
    block_align: usize,

    /// Total number of cells in the pool
    block_count: usize,

    /// Head of the free list (atomic for thread safety)
    free_head: AtomicPtr<FreeCell>,

    /// Count of free cells (atomic mirror for O(1) queries)
    free_count: AtomicUsize,

    /// Configuration
    config: PoolConfig,

    /// Statistics (only tracked if enabled)
    total_allocs: AtomicU32,
    total_deallocs: AtomicU32,
    failed_allocs: AtomicU32,
    peak_usage: AtomicUsize,
}

impl PoolAllocator {
    /// Creates a new pool allocator with custom configuration
    ///
    /// `block_size` is coerced up to at least the size of a machine
    /// pointer, so the intrusive free-list link always fits, and then
    /// rounded up to `block_align` so cells stride on aligned boundaries.
    ///
    /// # Errors
    /// Returns an error if `block_align` is not a power of two, if
    /// `block_count` is zero, or if the total size overflows.
    pub fn with_config(
        block_size: usize,
        block_align: usize,
        block_count: usize,
        config: PoolConfig,
    ) -> AllocResult<Self> {
        if !is_power_of_two(block_align) {
            return Err(AllocError::invalid_layout("block alignment must be a power of two"));
        }
        if block_count == 0 {
            return Err(AllocError::invalid_layout("pool needs at least one block"));
        }

        // Every cell start must be able to hold the link word, so both the
        // stride and the region base honor the link's own alignment on top
        // of the caller's.
        let cell_align = block_align.max(mem::align_of::<*mut FreeCell>());
        let coerced_size = block_size.max(mem::size_of::<*mut FreeCell>());
        let aligned_block_size = align_up(coerced_size, cell_align);

        let total_size = aligned_block_size
            .checked_mul(block_count)
            .ok_or_else(|| AllocError::size_overflow("pool size calculation"))?;

        let region = Region::new(total_size, cell_align, config.alloc_pattern);

        let allocator = Self {
            region,
            block_size: aligned_block_size,
            block_align,
            block_count,
            free_head: AtomicPtr::new(ptr::null_mut()),
            free_count: AtomicUsize::new(0),
            config,
            total_allocs: AtomicU32::new(0),
            total_deallocs: AtomicU32::new(0),
            failed_allocs: AtomicU32::new(0),
            peak_usage: AtomicUsize::new(0),
        };

        allocator.thread_free_list();

        #[cfg(feature = "logging")]
        tracing::debug!(
            block_size = allocator.block_size,
            block_align,
            block_count,
            "pool allocator created"
        );

        Ok(allocator)
    }

    /// Creates a new pool allocator with default configuration
    pub fn new(block_size: usize, block_align: usize, block_count: usize) -> AllocResult<Self> {
        Self::with_config(block_size, block_align, block_count, PoolConfig::default())
    }

    /// Creates a pool allocator sized and aligned for a specific type
    pub fn for_type<T>(block_count: usize) -> AllocResult<Self> {
        let layout = Layout::new::<T>();
        Self::new(layout.size(), layout.align(), block_count)
    }

    /// Creates a pool allocator from a layout
    pub fn for_layout(layout: Layout, block_count: usize) -> AllocResult<Self> {
        Self::new(layout.size(), layout.align(), block_count)
    }

    /// Creates a pool allocator with production configuration
    pub fn production(
        block_size: usize,
        block_align: usize,
        block_count: usize,
    ) -> AllocResult<Self> {
        Self::with_config(block_size, block_align, block_count, PoolConfig::production())
    }

    /// Creates a pool allocator with debug configuration
    pub fn debug(block_size: usize, block_align: usize, block_count: usize) -> AllocResult<Self> {
        Self::with_config(block_size, block_align, block_count, PoolConfig::debug())
    }

    /// Returns the size of each block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the alignment of each block
    pub fn block_align(&self) -> usize {
        self.block_align
    }

    /// Returns the total number of blocks in the pool
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Returns the total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.block_size * self.block_count
    }

    /// Returns the number of allocated blocks
    pub fn allocated_blocks(&self) -> usize {
        self.block_count - self.free_blocks()
    }

    /// Returns the number of free blocks
    pub fn free_blocks(&self) -> usize {
        self.free_count.load(Ordering::Relaxed)
    }

    /// Checks if the pool is exhausted (no free blocks)
    pub fn is_full(&self) -> bool {
        self.free_head.load(Ordering::Acquire).is_null()
    }

    /// Checks if the pool is idle (all blocks free)
    pub fn is_empty(&self) -> bool {
        self.allocated_blocks() == 0
    }

    /// Checks if a pointer belongs to this pool
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.region.contains(ptr as usize)
    }

    /// Threads the intrusive free chain through every cell
    fn thread_free_list(&self) {
        let mut prev_cell: *mut FreeCell = ptr::null_mut();

        // Link cells in reverse so the head ends up at cell 0.
        for i in (0..self.block_count).rev() {
            let cell_addr = self.region.start() + i * self.block_size;
            debug_assert_eq!(cell_addr % self.block_align, 0);

            let cell = cell_addr as *mut FreeCell;

            // SAFETY: Writing the link word of a free cell.
            // - cell_addr is within the region and stride-aligned
            // - Every cell is at least size_of::<*mut FreeCell>() bytes
            //   (coerced in with_config)
            // - No concurrent access: called before the pool is shared or
            //   under the reset contract (no live allocations)
            unsafe {
                (*cell).next = prev_cell;
            }

            prev_cell = cell;
        }

        self.free_head.store(prev_cell, Ordering::Release);
        self.free_count.store(self.block_count, Ordering::Relaxed);
    }

    /// Detaches the head of the free list
    fn try_allocate_block(&self) -> Option<NonNull<u8>> {
        let mut backoff = if self.config.use_backoff {
            Some(Backoff::new())
        } else {
            None
        };
        let mut attempts = 0;

        loop {
            let head = self.free_head.load(Ordering::Acquire);

            if head.is_null() {
                return None;
            }

            if attempts >= self.config.max_retries {
                return None;
            }

            // SAFETY: head is non-null and points at a free cell; free
            // cells always hold a valid link word. Acquire pairs with the
            // Release store in deallocate_block.
            let next = unsafe { (*head).next };

            if self
                .free_head
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.free_count.fetch_sub(1, Ordering::Relaxed);

                if self.config.track_stats {
                    self.total_allocs.fetch_add(1, Ordering::Relaxed);
                    atomic_max(&self.peak_usage, self.used_memory());
                }

                if let Some(pattern) = self.config.alloc_pattern {
                    // SAFETY: The cell was just detached; it belongs
                    // exclusively to this call until returned to the caller.
                    unsafe {
                        ptr::write_bytes(head.cast::<u8>(), pattern, self.block_size);
                    }
                }

                return NonNull::new(head.cast::<u8>());
            }

            attempts += 1;
            if let Some(ref mut b) = backoff {
                b.spin();
            }
        }
    }

    /// Pushes a cell back onto the free list
    fn deallocate_block(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;

        // Foreign or misaligned pointers indicate a caller bug.
        let valid = self.contains(ptr.as_ptr())
            && (addr - self.region.start()) % self.block_size == 0;
        debug_assert!(valid, "pointer does not address a cell of this pool");
        if !valid {
            return false;
        }

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: ptr addresses a full cell owned by the caller until
            // this push completes.
            unsafe {
                ptr::write_bytes(ptr.as_ptr(), pattern, self.block_size);
            }
        }

        let cell = ptr.as_ptr().cast::<FreeCell>();
        let mut backoff = if self.config.use_backoff {
            Some(Backoff::new())
        } else {
            None
        };

        loop {
            let head = self.free_head.load(Ordering::Acquire);

            // SAFETY: cell was validated above and is not on the free list;
            // writing its link word before the CAS means no other thread
            // observes a half-initialized node.
            unsafe {
                (*cell).next = head;
            }

            if self
                .free_head
                .compare_exchange_weak(head, cell, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.free_count.fetch_add(1, Ordering::Relaxed);

                if self.config.track_stats {
                    self.total_deallocs.fetch_add(1, Ordering::Relaxed);
                }

                return true;
            }

            if let Some(ref mut b) = backoff {
                b.spin();
            }
        }
    }

    /// Get a statistics snapshot (if tracking is enabled)
    pub fn stats(&self) -> Option<PoolStats> {
        if !self.config.track_stats {
            return None;
        }

        Some(PoolStats {
            total_allocs: self.total_allocs.load(Ordering::Relaxed),
            total_deallocs: self.total_deallocs.load(Ordering::Relaxed),
            peak_usage: self.peak_usage.load(Ordering::Relaxed),
            current_usage: self.used_memory(),
            block_size: self.block_size,
            block_count: self.block_count,
            free_blocks: self.free_blocks(),
        })
    }
}

// SAFETY: All free-list mutation goes through the atomic head pointer;
// allocated cells are exclusively owned by their callers and disjoint from
// the list.
unsafe impl Allocator for PoolAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            return Err(AllocError::invalid_layout("zero-size allocation"));
        }
        if layout.size() > self.block_size || layout.align() > self.block_align {
            return Err(AllocError::invalid_layout("layout exceeds pool cell geometry"));
        }

        if let Some(ptr) = self.try_allocate_block() {
            Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
        } else {
            if self.config.track_stats {
                self.failed_allocs.fetch_add(1, Ordering::Relaxed);
            }
            Err(AllocError::pool_exhausted(layout))
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        self.deallocate_block(ptr);
    }
}

impl MemoryUsage for PoolAllocator {
    fn used_memory(&self) -> usize {
        self.allocated_blocks() * self.block_size
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.free_blocks() * self.block_size)
    }

    fn total_memory(&self) -> Option<usize> {
        Some(self.capacity())
    }
}

impl Resettable for PoolAllocator {
    /// Rethreads the free chain through every cell
    ///
    /// # Safety
    /// Caller must ensure no outstanding cell is still in use.
    unsafe fn reset(&self) {
        self.thread_free_list();

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

impl StatisticsProvider for PoolAllocator {
    fn statistics(&self) -> AllocatorStats {
        AllocatorStats {
            allocated_bytes: self.used_memory(),
            peak_allocated_bytes: if self.config.track_stats {
                self.peak_usage.load(Ordering::Relaxed)
            } else {
                self.used_memory()
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

// SAFETY: The region is interior-mutable behind the atomic free list; all
// shared state is atomic.
unsafe impl Send for PoolAllocator {}
unsafe impl Sync for PoolAllocator {}
