//! Position markers for scoped bulk deallocation

/// Opaque snapshot of a stack allocator's top position
///
/// Obtained from [`StackAllocator::mark`](super::StackAllocator::mark) and
/// handed back to [`release`](super::StackAllocator::release) to rewind the
/// stack in bulk. Markers carry no ownership; rewinding past a marker
/// invalidates every allocation made after it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackMarker {
    pub(crate) position: usize,
}
