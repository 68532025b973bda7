//! Heap allocator configuration

/// Configuration for heap allocator
#[derive(Debug, Clone, Copy)]
pub struct HeapConfig {
    /// Enable statistics tracking
    pub track_stats: bool,

    /// Fill pattern byte for newly allocated payloads (for debugging)
    pub alloc_pattern: Option<u8>,
    /// Fill pattern byte for reclaimed blocks (for debugging)
    pub dealloc_pattern: Option<u8>,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            track_stats: cfg!(debug_assertions),
            alloc_pattern: if cfg!(debug_assertions) {
                Some(0xCD)
            } else {
                None
            },
            dealloc_pattern: if cfg!(debug_assertions) {
                Some(0xFE)
            } else {
                None
            },
        }
    }
}

impl HeapConfig {
    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: None,
        }
    }

    /// Debug configuration - pattern fills and statistics enabled
    #[must_use]
    pub fn debug() -> Self {
        Self {
            track_stats: true,
            alloc_pattern: Some(0xCD),
            dealloc_pattern: Some(0xFE),
        }
    }
}
