//! RAII-based stack frame for automatic restoration

use super::{StackAllocator, StackMarker};

/// RAII helper for stack-based scoped allocation
///
/// Automatically rewinds the stack to the position captured at
/// construction when it goes out of scope. Frames nest: inner frames must
/// be dropped before outer ones, which lexical scoping enforces.
pub struct StackFrame<'a> {
    allocator: &'a StackAllocator,
    marker: StackMarker,
}

impl<'a> StackFrame<'a> {
    /// Creates a stack frame that restores to the current position on drop
    pub fn new(allocator: &'a StackAllocator) -> Self {
        let marker = allocator.mark();
        Self { allocator, marker }
    }

    /// Gets the underlying allocator
    pub fn allocator(&self) -> &'a StackAllocator {
        self.allocator
    }

    /// Manually restore and consume this frame
    pub fn restore(self) {
        drop(self);
    }
}

impl<'a> Drop for StackFrame<'a> {
    fn drop(&mut self) {
        // SAFETY: The frame's marker was taken from this allocator and the
        // caller promised, by constructing the frame, that allocations made
        // inside its scope do not escape it.
        unsafe {
            let _ = self.allocator.release(self.marker);
        }
    }
}
