//! Integration tests for the stack allocator

use forge_memory::allocator::{
    Allocator, MemoryUsage, Resettable, StackAllocator, StackConfig, StackFrame,
};
use std::alloc::Layout;

#[test]
fn test_stack_allocator_basic() {
    let allocator = StackAllocator::new(4096).expect("Failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(128, 8).unwrap();
        let ptr = allocator.allocate(layout).expect("Allocation failed");

        std::ptr::write_bytes(ptr.cast::<u8>().as_ptr(), 0x55, 128);
        assert_eq!(*ptr.cast::<u8>().as_ptr(), 0x55);
    }
}

#[test]
fn test_stack_allocator_sequential_addresses() {
    // Consecutive allocations move strictly upward and usage counts the
    // consumed range, padding included.
    let allocator = StackAllocator::new(1024).expect("Failed to create stack allocator");

    unsafe {
        let p1 = allocator
            .allocate(Layout::from_size_align(64, 8).unwrap())
            .expect("Allocation 1 failed");
        let p2 = allocator
            .allocate(Layout::from_size_align(32, 8).unwrap())
            .expect("Allocation 2 failed");

        assert!(p2.cast::<u8>().as_ptr() > p1.cast::<u8>().as_ptr());
        assert_eq!(allocator.used_memory(), 96);
    }
}

#[test]
fn test_stack_allocator_deallocate_is_noop() {
    let allocator = StackAllocator::new(1024).expect("Failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let ptr = allocator.allocate(layout).expect("Allocation failed");

        allocator.deallocate(ptr.cast(), layout);

        // Individual frees reclaim nothing on a stack.
        assert_eq!(allocator.used_memory(), 64);
    }
}

#[test]
fn test_stack_allocator_marker_rewind() {
    let allocator = StackAllocator::new(1024).expect("Failed to create stack allocator");

    unsafe {
        let marker = allocator.mark();

        allocator
            .allocate(Layout::from_size_align(64, 8).unwrap())
            .expect("Allocation 1 failed");
        allocator
            .allocate(Layout::from_size_align(32, 8).unwrap())
            .expect("Allocation 2 failed");
        assert_eq!(allocator.used_memory(), 96);

        allocator.release(marker).expect("Release failed");
        assert_eq!(allocator.used_memory(), 0);
    }
}

#[test]
fn test_stack_allocator_nested_markers() {
    let allocator = StackAllocator::new(4096).expect("Failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(32, 8).unwrap();

        let marker1 = allocator.mark();
        allocator.allocate(layout).expect("Allocation 1 failed");
        let after_one = allocator.used_memory();

        let marker2 = allocator.mark();
        allocator.allocate(layout).expect("Allocation 2 failed");

        let marker3 = allocator.mark();
        allocator.allocate(layout).expect("Allocation 3 failed");

        allocator.release(marker3).expect("Release 3 failed");
        assert_eq!(allocator.used_memory(), after_one + 32);

        allocator.release(marker2).expect("Release 2 failed");
        assert_eq!(allocator.used_memory(), after_one);

        allocator.release(marker1).expect("Release 1 failed");
        assert_eq!(allocator.used_memory(), 0);
    }
}

#[test]
fn test_stack_allocator_marker_from_the_future() {
    let allocator = StackAllocator::new(1024).expect("Failed to create stack allocator");

    unsafe {
        allocator
            .allocate(Layout::from_size_align(64, 8).unwrap())
            .expect("Allocation failed");
        let marker = allocator.mark();
        allocator.reset();

        // The marker now lies ahead of the rewound top.
        assert!(allocator.release(marker).is_err());
        assert_eq!(allocator.used_memory(), 0);
    }
}

#[test]
fn test_stack_allocator_reset() {
    let allocator = StackAllocator::new(4096).expect("Failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(128, 8).unwrap();

        let ptr1 = allocator.allocate(layout).expect("Allocation 1 failed");
        allocator.allocate(layout).expect("Allocation 2 failed");

        let addr1 = ptr1.cast::<u8>().as_ptr() as usize;

        allocator.reset();
        assert_eq!(allocator.used_memory(), 0);

        // Allocation restarts from the beginning of the region.
        let ptr3 = allocator.allocate(layout).expect("Allocation 3 failed");
        assert_eq!(addr1, ptr3.cast::<u8>().as_ptr() as usize);
    }
}

#[test]
fn test_stack_allocator_alignment() {
    let allocator = StackAllocator::new(4096).expect("Failed to create stack allocator");

    unsafe {
        for align in [1usize, 2, 4, 8, 16, 32, 64] {
            let layout = Layout::from_size_align(24, align).unwrap();
            let ptr = allocator.allocate(layout).expect("Allocation failed");
            assert_eq!(ptr.cast::<u8>().as_ptr() as usize % align, 0);
        }
    }
}

#[test]
fn test_stack_allocator_oversize_fails_cleanly() {
    let allocator = StackAllocator::new(256).expect("Failed to create stack allocator");

    unsafe {
        let err = allocator
            .allocate(Layout::from_size_align(512, 8).unwrap())
            .unwrap_err();
        assert!(err.is_out_of_memory());
        assert_eq!(allocator.used_memory(), 0);

        // A fitting request still succeeds afterwards.
        allocator
            .allocate(Layout::from_size_align(128, 8).unwrap())
            .expect("Allocation failed");
    }
}

#[test]
fn test_stack_allocator_frame() {
    let allocator = StackAllocator::new(4096).expect("Failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(64, 8).unwrap();

        {
            let _frame = StackFrame::new(&allocator);
            allocator.allocate(layout).expect("Allocation 1 failed");
            allocator.allocate(layout).expect("Allocation 2 failed");
            assert_eq!(allocator.used_memory(), 128);
            // Frame rewinds on drop
        }

        assert_eq!(allocator.used_memory(), 0);
    }
}

#[test]
fn test_stack_allocator_multiple_frames() {
    let allocator = StackAllocator::new(4096).expect("Failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(32, 8).unwrap();

        let _frame1 = StackFrame::new(&allocator);
        allocator.allocate(layout).expect("Allocation 1 failed");

        {
            let _frame2 = StackFrame::new(&allocator);
            allocator.allocate(layout).expect("Allocation 2 failed");

            {
                let _frame3 = StackFrame::new(&allocator);
                allocator.allocate(layout).expect("Allocation 3 failed");
                assert_eq!(allocator.used_memory(), 96);
            }

            assert_eq!(allocator.used_memory(), 64);
        }

        assert_eq!(allocator.used_memory(), 32);
    }
}

#[test]
fn test_stack_allocator_exhaustion_then_rewind() {
    let allocator = StackAllocator::with_config(1024, StackConfig::performance())
        .expect("Failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(256, 8).unwrap();
        let marker = allocator.mark();

        for _ in 0..4 {
            allocator.allocate(layout).expect("Allocation failed");
        }
        assert!(allocator.allocate(layout).is_err());

        allocator.release(marker).expect("Release failed");
        allocator.allocate(layout).expect("Allocation after rewind failed");
    }
}

#[test]
fn test_stack_allocator_stress() {
    let allocator = StackAllocator::new(64 * 1024).expect("Failed to create stack allocator");

    unsafe {
        let layout = Layout::from_size_align(128, 8).unwrap();

        for _ in 0..100 {
            let marker = allocator.mark();

            for i in 0..10 {
                let ptr = allocator.allocate(layout).expect("Allocation failed");
                std::ptr::write_bytes(ptr.cast::<u8>().as_ptr(), i as u8, 128);
            }

            allocator.release(marker).expect("Release failed");
        }

        assert_eq!(allocator.used_memory(), 0);
    }
}

#[test]
fn test_stack_allocator_concurrent() {
    use std::sync::Arc;
    use std::thread;

    let allocator = Arc::new(
        StackAllocator::with_config(64 * 1024, StackConfig::production())
            .expect("Failed to create stack allocator"),
    );

    let mut handles = vec![];
    for i in 0..4 {
        let alloc = Arc::clone(&allocator);
        handles.push(thread::spawn(move || unsafe {
            let layout = Layout::from_size_align(64, 8).unwrap();
            for _ in 0..32 {
                let ptr = alloc.allocate(layout).expect("Allocation failed");
                std::ptr::write_bytes(ptr.cast::<u8>().as_ptr(), i as u8, 64);
                assert_eq!(*ptr.cast::<u8>().as_ptr(), i as u8);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // 4 threads * 32 allocations * 64 bytes, 8-aligned so no padding.
    assert_eq!(allocator.used_memory(), 4 * 32 * 64);
}
