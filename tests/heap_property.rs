//! Property tests for the heap allocator
//!
//! Random allocate/free interleavings against a model of live allocations,
//! checking the invariants that must hold after every step: the region is
//! exactly tiled by free and allocated blocks, pointers are aligned and
//! in-bounds, and payloads survive the churn around them.

use forge_memory::allocator::{Allocator, HeapAllocator, HeapConfig, MemoryUsage};
use proptest::prelude::*;
use std::alloc::Layout;

const CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone)]
enum Op {
    /// Allocate `size` bytes at alignment `1 << align_log2`
    Alloc { size: usize, align_log2: u8 },
    /// Free the live allocation at `index % live.len()`
    Free { index: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..2048, 0u8..7).prop_map(|(size, align_log2)| Op::Alloc { size, align_log2 }),
        2 => (0usize..64).prop_map(|index| Op::Free { index }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn heap_survives_random_interleavings(ops in proptest::collection::vec(op_strategy(), 1..200)) {
        let allocator = HeapAllocator::with_config(CAPACITY, HeapConfig::debug()).unwrap();
        let capacity = allocator.capacity();
        let mut live: Vec<(std::ptr::NonNull<[u8]>, Layout, u8)> = Vec::new();
        let mut next_tag: u8 = 0;

        for op in ops {
            match op {
                Op::Alloc { size, align_log2 } => {
                    let align = 1usize << align_log2;
                    let layout = Layout::from_size_align(size, align).unwrap();

                    // Exhaustion is a legal outcome; anything else must
                    // produce a valid allocation.
                    if let Ok(ptr) = unsafe { allocator.allocate(layout) } {
                        let addr = ptr.cast::<u8>().as_ptr() as usize;
                        prop_assert_eq!(addr % align, 0, "misaligned pointer");
                        prop_assert!(allocator.contains(ptr.cast::<u8>().as_ptr()));
                        prop_assert!(
                            allocator.contains(unsafe {
                                ptr.cast::<u8>().as_ptr().add(size - 1)
                            }),
                            "allocation end not contained in allocator"
                        );

                        next_tag = next_tag.wrapping_add(1);
                        unsafe {
                            std::ptr::write_bytes(ptr.cast::<u8>().as_ptr(), next_tag, size);
                        }
                        live.push((ptr, layout, next_tag));
                    }
                }
                Op::Free { index } => {
                    if !live.is_empty() {
                        let (ptr, layout, tag) = live.swap_remove(index % live.len());
                        unsafe {
                            prop_assert_eq!(*ptr.cast::<u8>().as_ptr(), tag, "payload corrupted");
                            prop_assert_eq!(
                                *ptr.cast::<u8>().as_ptr().add(layout.size() - 1),
                                tag,
                                "payload tail corrupted"
                            );
                            allocator.deallocate(ptr.cast(), layout);
                        }
                    }
                }
            }

            // Tiling invariant: every byte is either free or accounted to a
            // live allocation.
            prop_assert_eq!(
                allocator.free_memory() + allocator.used_memory(),
                capacity,
                "region not exactly tiled"
            );
            prop_assert!(allocator.used_memory() <= capacity);
        }

        // Draining everything coalesces the region back into one block.
        for (ptr, layout, _) in live.drain(..) {
            unsafe { allocator.deallocate(ptr.cast(), layout) };
        }
        prop_assert_eq!(allocator.used_memory(), 0);
        prop_assert_eq!(allocator.free_block_count(), 1);
        prop_assert_eq!(allocator.largest_free_block(), capacity);
    }

    #[test]
    fn heap_allocations_never_overlap(sizes in proptest::collection::vec(1usize..512, 1..32)) {
        let allocator = HeapAllocator::new(CAPACITY).unwrap();
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        let mut ptrs = Vec::new();

        for size in sizes {
            let layout = Layout::from_size_align(size, 8).unwrap();
            let ptr = unsafe { allocator.allocate(layout).unwrap() };
            let start = ptr.cast::<u8>().as_ptr() as usize;

            for &(other_start, other_len) in &ranges {
                prop_assert!(
                    start + size <= other_start || other_start + other_len <= start,
                    "allocation [{}; {}) overlaps [{}; {})",
                    start,
                    size,
                    other_start,
                    other_len
                );
            }

            ranges.push((start, size));
            ptrs.push((ptr, layout));
        }

        for (ptr, layout) in ptrs {
            unsafe { allocator.deallocate(ptr.cast(), layout) };
        }
    }
}
