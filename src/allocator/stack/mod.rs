//! Stack allocator for frame-lifetime memory
//!
//! Monotonic bump allocation within a single region. Individual
//! allocations cannot be freed; reclamation is bulk-only through markers,
//! frames, or a full reset.
//!
//! ## Modules
//! - `allocator` - Main `StackAllocator` implementation
//! - `config` - Configuration variants (production, debug, performance)
//! - `frame` - RAII helper for automatic stack restoration
//! - `marker` - Position markers for scoped deallocation

pub mod allocator;
pub mod config;
pub mod frame;
pub mod marker;

pub use allocator::StackAllocator;
pub use config::StackConfig;
pub use frame::StackFrame;
pub use marker::StackMarker;
