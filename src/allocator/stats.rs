//! Allocator statistics tracking

/// Point-in-time statistics snapshot for an allocator engine
///
/// Counters are only maintained when the engine's config enables
/// `track_stats`; otherwise the count fields read zero and the byte fields
/// fall back to live usage.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorStats {
    /// Total bytes currently allocated
    pub allocated_bytes: usize,
    /// Peak bytes allocated
    pub peak_allocated_bytes: usize,
    /// Total number of successful allocations
    pub allocation_count: usize,
    /// Total number of deallocations
    pub deallocation_count: usize,
    /// Number of failed allocations
    pub failed_allocations: usize,
}

impl AllocatorStats {
    /// Creates a new empty stats object
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocated_bytes: 0,
            peak_allocated_bytes: 0,
            allocation_count: 0,
            deallocation_count: 0,
            failed_allocations: 0,
        }
    }

    /// Check if there are any active allocations
    #[must_use]
    pub fn has_active_allocations(&self) -> bool {
        self.allocation_count > self.deallocation_count
    }

    /// Balance of allocations vs deallocations
    #[must_use]
    pub fn allocation_balance(&self) -> isize {
        self.allocation_count as isize - self.deallocation_count as isize
    }

    /// Fraction of allocation attempts that succeeded (0.0 to 1.0)
    #[must_use]
    pub fn allocation_efficiency(&self) -> f64 {
        let total_attempts = self.allocation_count + self.failed_allocations;
        if total_attempts > 0 {
            self.allocation_count as f64 / total_attempts as f64
        } else {
            1.0
        }
    }
}

impl Default for AllocatorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Allocator Statistics:")?;
        writeln!(f, "  Current allocated: {} bytes", self.allocated_bytes)?;
        writeln!(f, "  Peak allocated: {} bytes", self.peak_allocated_bytes)?;
        writeln!(f, "  Allocations: {}", self.allocation_count)?;
        writeln!(f, "  Deallocations: {}", self.deallocation_count)?;
        writeln!(f, "  Failed allocations: {}", self.failed_allocations)?;
        write!(
            f,
            "  Allocation efficiency: {:.2}%",
            self.allocation_efficiency() * 100.0
        )
    }
}

/// Statistics reporting for allocator engines
pub trait StatisticsProvider {
    /// Get current statistics
    fn statistics(&self) -> AllocatorStats;

    /// Reset all statistics counters
    fn reset_statistics(&self);

    /// Check if statistics collection is enabled
    fn statistics_enabled(&self) -> bool;
}
