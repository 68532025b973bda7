//! # Forge Memory
//!
//! Fixed-region memory allocators for the Forge engine.
//!
//! Each allocator owns one contiguous byte region, acquired once at
//! construction, and carves it into aligned sub-regions under a distinct
//! discipline:
//!
//! - [`StackAllocator`]: monotonic bump allocation with marker-based bulk
//!   rewind, for frame-lifetime scratch data.
//! - [`PoolAllocator`]: fixed-size blocks threaded through an intrusive
//!   free list, for homogeneous per-entity objects.
//! - [`HeapAllocator`]: variable-size best-fit allocation over a
//!   boundary-tagged free list with split-on-allocate and coalesce-on-free,
//!   for long-lived data.
//!
//! All three implement the [`Allocator`] capability plus [`MemoryUsage`]
//! for capacity queries. Pointers must be returned to the engine that
//! handed them out; the engines never share or exchange memory.

pub mod allocator;
pub mod error;
pub mod utils;

// Re-export main types
pub use allocator::*;
pub use error::{AllocError, AllocErrorKind, AllocResult};
