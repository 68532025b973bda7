//! Boundary-tag headers and free-list surgery for the heap engine
//!
//! # Safety
//!
//! The `next`/`prev` links of the free list live inside the very blocks
//! being managed: the list is an index structure over the engine's region,
//! not an ownership graph. Everything here operates on raw addresses under
//! these invariants, which the owning engine upholds:
//!
//! - Every block start handed to this module lies inside the region, is
//!   aligned to [`BLOCK_ALIGN`], and spans at least [`MIN_BLOCK_SIZE`]
//!   bytes (free blocks) that no allocation currently owns
//! - The list is sorted by strictly ascending address and `head.prev` is
//!   null
//! - The engine serializes all calls (the list lives behind a lock)

use core::mem;
use core::ptr::{self, NonNull};

/// Header of a free block, linked into the address-sorted free list
#[repr(C)]
pub(super) struct FreeBlock {
    /// Span of the whole block in bytes, headers included
    pub(super) size: usize,
    pub(super) next: *mut FreeBlock,
    pub(super) prev: *mut FreeBlock,
}

/// Header of an allocated block, placed immediately before the payload
#[repr(C)]
pub(super) struct AllocHeader {
    /// Reclamation span of the block: header, padding, payload and any
    /// absorbed surplus
    pub(super) size: usize,
    /// Byte distance from the block's physical start to this header
    pub(super) padding: usize,
}

/// Size of the allocation header preceding every payload
pub(super) const HEADER_SIZE: usize = mem::size_of::<AllocHeader>();

/// A free block must be able to hold its own header; no split may leave a
/// remainder smaller than this
pub(super) const MIN_BLOCK_SIZE: usize = mem::size_of::<FreeBlock>();

/// Alignment every block start is kept at, so that either header view can
/// be written in place
pub(super) const BLOCK_ALIGN: usize = mem::align_of::<FreeBlock>();

/// Address-sorted doubly-linked list of free blocks
pub(super) struct FreeList {
    head: *mut FreeBlock,
}

impl FreeList {
    /// Creates a list holding one free block spanning `[start, start + size)`
    ///
    /// # Safety
    /// `[start, start + size)` must be an exclusively owned, writable range
    /// with `start` aligned to [`BLOCK_ALIGN`] and `size >= MIN_BLOCK_SIZE`.
    pub(super) unsafe fn with_spanning_block(start: usize, size: usize) -> Self {
        let mut list = Self { head: ptr::null_mut() };
        unsafe { list.install_spanning_block(start, size) };
        list
    }

    /// Discards all entries and reinstalls one block spanning the region
    ///
    /// # Safety
    /// Same requirements as [`with_spanning_block`](Self::with_spanning_block);
    /// additionally no allocation may be live anywhere in the range.
    pub(super) unsafe fn install_spanning_block(&mut self, start: usize, size: usize) {
        debug_assert!(size >= MIN_BLOCK_SIZE);
        debug_assert_eq!(start % BLOCK_ALIGN, 0);

        let block = start as *mut FreeBlock;
        // SAFETY: Caller guarantees the range is exclusively owned, writable
        // and aligned for a FreeBlock header.
        unsafe {
            (*block).size = size;
            (*block).next = ptr::null_mut();
            (*block).prev = ptr::null_mut();
        }
        self.head = block;
    }

    /// Whether the list holds no blocks
    pub(super) fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Best-fit search with per-block fit computation
    ///
    /// Walks the list in address order and returns the block with the
    /// smallest size among those for which `fit` reports an actual required
    /// span no larger than the block. Ties go to the first (lowest-addressed)
    /// candidate. `fit` receives the block's start address.
    pub(super) fn best_fit<F>(&self, mut fit: F) -> Option<(NonNull<FreeBlock>, usize)>
    where
        F: FnMut(usize) -> usize,
    {
        let mut best: *mut FreeBlock = ptr::null_mut();
        let mut best_required = 0;
        let mut current = self.head;

        while !current.is_null() {
            // SAFETY: current came from the list; list nodes are valid free
            // block headers (module invariant).
            unsafe {
                let size = (*current).size;
                let required = fit(current as usize);
                if size >= required && (best.is_null() || size < (*best).size) {
                    best = current;
                    best_required = required;
                }
                current = (*current).next;
            }
        }

        NonNull::new(best).map(|block| (block, best_required))
    }

    /// Unlinks a block from the list
    ///
    /// # Safety
    /// `block` must currently be linked into this list.
    pub(super) unsafe fn remove(&mut self, block: NonNull<FreeBlock>) {
        let block = block.as_ptr();
        // SAFETY: block is a live list node; its neighbors (when non-null)
        // are live list nodes as well.
        unsafe {
            let prev = (*block).prev;
            let next = (*block).next;

            if !prev.is_null() {
                (*prev).next = next;
            } else {
                self.head = next;
            }

            if !next.is_null() {
                (*next).prev = prev;
            }
        }
    }

    /// Splices a block in, keeping ascending address order
    ///
    /// # Safety
    /// `block` must be a valid free block header inside the region, not
    /// currently linked, and its address must not collide with any listed
    /// block.
    pub(super) unsafe fn insert(&mut self, block: NonNull<FreeBlock>) {
        let block = block.as_ptr();
        // SAFETY: block is a valid unlinked header; list nodes are valid
        // (module invariant).
        unsafe {
            (*block).next = ptr::null_mut();
            (*block).prev = ptr::null_mut();

            if self.head.is_null() {
                self.head = block;
                return;
            }

            if block < self.head {
                (*block).next = self.head;
                (*self.head).prev = block;
                self.head = block;
                return;
            }

            let mut current = self.head;
            while !(*current).next.is_null() && (*current).next < block {
                current = (*current).next;
            }

            (*block).next = (*current).next;
            (*block).prev = current;
            if !(*current).next.is_null() {
                (*(*current).next).prev = block;
            }
            (*current).next = block;
        }
    }

    /// Merges a just-inserted block with physically adjacent neighbors
    ///
    /// The successor is absorbed first, then the block itself is absorbed
    /// into its predecessor when adjacent. Both merges apply when both
    /// adjacencies hold, which keeps the "no two adjacent free blocks"
    /// invariant.
    ///
    /// # Safety
    /// `block` must be linked into this list.
    pub(super) unsafe fn coalesce(&mut self, block: NonNull<FreeBlock>) {
        let block = block.as_ptr();
        // SAFETY: block and its list neighbors are live free block headers;
        // address arithmetic stays inside the region because block spans are
        // region-bounded (module invariant).
        unsafe {
            let next = (*block).next;
            if !next.is_null() && next as usize == block as usize + (*block).size {
                (*block).size += (*next).size;
                self.remove(NonNull::new_unchecked(next));
            }

            let prev = (*block).prev;
            if !prev.is_null() && prev as usize + (*prev).size == block as usize {
                (*prev).size += (*block).size;
                self.remove(NonNull::new_unchecked(block));
            }
        }
    }

    /// Number of free blocks (walks the list)
    pub(super) fn len(&self) -> usize {
        let mut count = 0;
        let mut current = self.head;
        while !current.is_null() {
            count += 1;
            // SAFETY: list nodes are valid free block headers.
            current = unsafe { (*current).next };
        }
        count
    }

    /// Sum of all free block sizes (walks the list)
    pub(super) fn total_free(&self) -> usize {
        let mut total = 0;
        let mut current = self.head;
        while !current.is_null() {
            // SAFETY: list nodes are valid free block headers.
            unsafe {
                total += (*current).size;
                current = (*current).next;
            }
        }
        total
    }

    /// Size of the largest free block (walks the list)
    pub(super) fn largest(&self) -> usize {
        let mut largest = 0;
        let mut current = self.head;
        while !current.is_null() {
            // SAFETY: list nodes are valid free block headers.
            unsafe {
                largest = largest.max((*current).size);
                current = (*current).next;
            }
        }
        largest
    }

    /// Checks the address ordering and link symmetry of the list
    ///
    /// Used by debug assertions and tests; walks the whole list.
    pub(super) fn is_well_formed(&self) -> bool {
        let mut current = self.head;
        let mut prev: *mut FreeBlock = ptr::null_mut();

        while !current.is_null() {
            // SAFETY: list nodes are valid free block headers.
            unsafe {
                if (*current).prev != prev {
                    return false;
                }
                if !prev.is_null() {
                    // Strictly ascending, and never physically adjacent
                    // (adjacent blocks must have been coalesced).
                    if (prev as usize) + (*prev).size >= current as usize {
                        return false;
                    }
                }
                prev = current;
                current = (*current).next;
            }
        }

        true
    }
}

// SAFETY: The raw pointers index into a region owned by the engine, which
// serializes all list access behind a lock.
unsafe impl Send for FreeList {}
