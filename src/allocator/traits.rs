//! Allocator capability traits
//!
//! The capability boundary is deliberately thin: engines share the
//! operation set but no state and no bookkeeping. [`Allocator`] is the
//! uniform allocate/deallocate contract, [`MemoryUsage`] the capacity
//! reporting side, and [`Resettable`] the bulk-reclamation extension for
//! engines that support it.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::AllocResult;
use crate::utils::format_bytes;

/// Uniform allocation capability shared by all engines
///
/// # Safety Requirements
///
/// Implementors must ensure that:
/// - Returned pointers are valid, writable and properly aligned for the
///   requested layout, and disjoint from every other live allocation
/// - Deallocation only occurs for previously allocated pointers
/// - A failed allocation mutates no engine state
pub unsafe trait Allocator {
    /// Allocates memory with the given layout
    ///
    /// # Safety
    /// - Returned memory is uninitialized and must be written before read
    /// - The pointer must not outlive the allocator
    ///
    /// # Errors
    /// Returns a recoverable error when the engine cannot satisfy the
    /// request (exhaustion), and a contract error for invalid layouts.
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>>;

    /// Deallocates memory at the given pointer
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator with `layout`
    /// - After this call, `ptr` becomes invalid and must not be used
    /// - Double-free is undefined behavior
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Memory usage reporting
///
/// All engines in this crate have a fixed backing capacity, so
/// `total_memory` and `available_memory` are always `Some`; the `Option`
/// shape is kept so wrappers over unbounded allocators can share the trait.
pub trait MemoryUsage {
    /// Returns current allocated memory in bytes
    ///
    /// Engine bookkeeping (headers, alignment padding, absorbed block
    /// surplus) counts toward this figure where the engine's reclamation
    /// policy demands it; see each engine's documentation.
    fn used_memory(&self) -> usize;

    /// Returns memory still available for allocation in bytes
    fn available_memory(&self) -> Option<usize>;

    /// Returns total memory capacity in bytes
    fn total_memory(&self) -> Option<usize> {
        self.available_memory().map(|available| self.used_memory() + available)
    }

    /// Returns memory usage as a percentage (0.0 to 100.0)
    fn memory_usage_percent(&self) -> Option<f32> {
        self.total_memory().map(|total| {
            if total == 0 {
                0.0
            } else {
                (self.used_memory() as f32 / total as f32) * 100.0
            }
        })
    }

    /// Checks if usage is at or above the given percentage threshold
    fn is_memory_pressure(&self, threshold_percent: f32) -> Option<bool> {
        self.memory_usage_percent().map(|usage| usage >= threshold_percent)
    }

    /// Returns a point-in-time usage snapshot
    fn memory_usage(&self) -> BasicMemoryUsage {
        BasicMemoryUsage {
            used: self.used_memory(),
            available: self.available_memory(),
            total: self.total_memory(),
            usage_percent: self.memory_usage_percent(),
        }
    }
}

/// Point-in-time memory usage snapshot
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BasicMemoryUsage {
    /// Currently used memory in bytes
    pub used: usize,
    /// Available memory in bytes (None if unlimited)
    pub available: Option<usize>,
    /// Total memory capacity in bytes (None if unlimited)
    pub total: Option<usize>,
    /// Memory usage as percentage (None if it cannot be calculated)
    pub usage_percent: Option<f32>,
}

impl core::fmt::Display for BasicMemoryUsage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "used: {}", format_bytes(self.used))?;

        if let Some(total) = self.total {
            write!(f, ", total: {}", format_bytes(total))?;
        }

        if let Some(percent) = self.usage_percent {
            write!(f, " ({:.1}%)", percent)?;
        }

        Ok(())
    }
}

/// Bulk-reclamation extension
///
/// Resetting invalidates every outstanding allocation at once. The stack
/// and pool engines reset to their initial free state; the heap reinstalls
/// a single free block spanning the whole region.
pub trait Resettable {
    /// Resets the allocator, invalidating all previous allocations
    ///
    /// # Safety
    /// - All pointers from previous allocations become invalid immediately
    /// - Caller must ensure no live references exist before calling
    unsafe fn reset(&self);

    /// Checks if the allocator can be safely reset
    fn can_reset(&self) -> bool {
        true
    }

    /// Resets only if `can_reset` allows it; returns whether a reset ran
    ///
    /// # Safety
    /// Same requirements as [`reset`](Resettable::reset) when the reset is
    /// actually performed.
    unsafe fn try_reset(&self) -> bool {
        if self.can_reset() {
            unsafe { self.reset() };
            true
        } else {
            false
        }
    }
}

/// RAII guard that resets an allocator when dropped
///
/// Useful for scoped scratch allocations: everything allocated while the
/// guard lives is reclaimed when it goes out of scope, unless
/// [`disable_reset`](ResetGuard::disable_reset) was called.
pub struct ResetGuard<'a, A: Resettable + ?Sized> {
    allocator: &'a A,
    should_reset: bool,
}

impl<'a, A: Resettable + ?Sized> ResetGuard<'a, A> {
    /// Creates a guard that resets `allocator` on drop
    pub fn new(allocator: &'a A) -> Self {
        Self { allocator, should_reset: true }
    }

    /// Disables the automatic reset, keeping allocations alive past the
    /// guard's scope
    pub fn disable_reset(&mut self) {
        self.should_reset = false;
    }

    /// Gets a reference to the guarded allocator
    pub fn allocator(&self) -> &A {
        self.allocator
    }

    /// Checks if the guard will reset on drop
    pub fn will_reset(&self) -> bool {
        self.should_reset
    }
}

impl<'a, A: Resettable + ?Sized> Drop for ResetGuard<'a, A> {
    fn drop(&mut self) {
        if self.should_reset {
            // Best effort reset on drop
            unsafe {
                self.allocator.try_reset();
            }
        }
    }
}

impl<'a, A: Resettable + ?Sized> core::ops::Deref for ResetGuard<'a, A> {
    type Target = A;

    fn deref(&self) -> &Self::Target {
        self.allocator
    }
}

/// Type-safe allocation extensions
///
/// Typed wrappers around the raw byte-level operations, eliminating manual
/// layout computation at call sites.
pub trait TypedAllocExt: Allocator {
    /// Allocates memory for a single value of type T
    ///
    /// # Safety
    /// - Returned memory is uninitialized and must be written before use
    /// - Must be released with [`dealloc_one`](TypedAllocExt::dealloc_one)
    #[inline]
    unsafe fn alloc_one<T>(&self) -> AllocResult<NonNull<T>> {
        let layout = Layout::new::<T>();
        let ptr = unsafe { self.allocate(layout)? };
        // SAFETY: allocate returned a non-null pointer aligned for T.
        Ok(unsafe { NonNull::new_unchecked(ptr.as_ptr().cast::<T>()) })
    }

    /// Allocates memory for an array of `n` elements of type T
    ///
    /// # Safety
    /// - Returned memory is uninitialized
    /// - Must be released with the same count via
    ///   [`dealloc_array`](TypedAllocExt::dealloc_array)
    #[inline]
    unsafe fn alloc_array<T>(&self, n: usize) -> AllocResult<NonNull<[T]>> {
        let layout = Layout::array::<T>(n)
            .map_err(|_| crate::error::AllocError::size_overflow("array layout overflow"))?;

        let ptr = unsafe { self.allocate(layout)? };
        // SAFETY: allocate returned a non-null pointer aligned for T.
        Ok(NonNull::slice_from_raw_parts(
            unsafe { NonNull::new_unchecked(ptr.as_ptr().cast::<T>()) },
            n,
        ))
    }

    /// Deallocates a single value
    ///
    /// # Safety
    /// - `ptr` must come from [`alloc_one`](TypedAllocExt::alloc_one) on
    ///   this allocator; the value must already be dropped
    #[inline]
    unsafe fn dealloc_one<T>(&self, ptr: NonNull<T>) {
        let layout = Layout::new::<T>();
        unsafe { self.deallocate(ptr.cast(), layout) };
    }

    /// Deallocates an array
    ///
    /// # Safety
    /// - `ptr` and `n` must match the original
    ///   [`alloc_array`](TypedAllocExt::alloc_array) call exactly
    #[inline]
    unsafe fn dealloc_array<T>(&self, ptr: NonNull<T>, n: usize) {
        if let Ok(layout) = Layout::array::<T>(n) {
            unsafe { self.deallocate(ptr.cast(), layout) };
        }
    }
}

// Blanket implementation for all allocators
impl<A: Allocator + ?Sized> TypedAllocExt for A {}

// ============================================================================
// Blanket implementations for references
// ============================================================================

unsafe impl<T: Allocator + ?Sized> Allocator for &T {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        unsafe { (**self).allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

impl<T: MemoryUsage + ?Sized> MemoryUsage for &T {
    fn used_memory(&self) -> usize {
        (**self).used_memory()
    }

    fn available_memory(&self) -> Option<usize> {
        (**self).available_memory()
    }

    fn total_memory(&self) -> Option<usize> {
        (**self).total_memory()
    }
}

impl<T: Resettable + ?Sized> Resettable for &T {
    unsafe fn reset(&self) {
        unsafe { (**self).reset() }
    }

    fn can_reset(&self) -> bool {
        (**self).can_reset()
    }
}
