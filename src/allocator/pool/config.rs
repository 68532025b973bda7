//! Pool allocator configuration

/// Configuration for pool allocator
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Enable statistics tracking
    pub track_stats: bool,

    /// Fill pattern byte for newly allocated blocks (for debugging)
    pub alloc_pattern: Option<u8>,
    /// Fill pattern byte for deallocated blocks (for debugging)
    pub dealloc_pattern: Option<u8>,

    /// Use exponential backoff for CAS retries
    pub use_backoff: bool,

    /// Maximum CAS retry attempts
    pub max_retries: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            track_stats: cfg!(debug_assertions),
            alloc_pattern: if cfg!(debug_assertions) {
                Some(0xAB)
            } else {
                None
            },
            dealloc_pattern: if cfg!(debug_assertions) {
                Some(0xDE)
            } else {
                None
            },
            use_backoff: true,
            max_retries: 500,
        }
    }
}

impl PoolConfig {
    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            use_backoff: true,
            max_retries: 1000,
        }
    }

    /// Debug configuration - pattern fills and statistics enabled
    #[must_use]
    pub fn debug() -> Self {
        Self {
            track_stats: true,
            alloc_pattern: Some(0xAB),
            dealloc_pattern: Some(0xDE),
            use_backoff: false,
            max_retries: 100,
        }
    }

    /// Performance configuration - minimal overhead
    #[must_use]
    pub fn performance() -> Self {
        Self {
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            use_backoff: false,
            max_retries: 100,
        }
    }
}
