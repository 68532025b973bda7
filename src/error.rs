//! Error types for forge-memory
//!
//! Allocation failures split into two classes. Recoverable errors
//! (exhaustion of a region or pool) are normal results callers are expected
//! to handle, typically by falling back to another allocator. The remaining
//! kinds indicate contract misuse at the call site and are never produced
//! by a correct caller.

use core::alloc::Layout;
use core::fmt;

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{trace, warn};

/// Allocation error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum AllocErrorKind {
    /// Insufficient contiguous capacity in the backing region
    #[error("out of memory")]
    OutOfMemory,
    /// No free blocks left in a fixed-size pool
    #[error("pool exhausted")]
    PoolExhausted,
    /// Size calculation overflow
    #[error("size overflow")]
    SizeOverflow,
    /// Invalid layout parameters (e.g. zero size)
    #[error("invalid layout")]
    InvalidLayout,
    /// Stack marker ahead of the current top, or outside the region
    #[error("invalid marker")]
    InvalidMarker,
}

impl AllocErrorKind {
    /// Returns a static string describing the error
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocErrorKind::OutOfMemory => "out of memory",
            AllocErrorKind::PoolExhausted => "pool exhausted",
            AllocErrorKind::SizeOverflow => "size overflow",
            AllocErrorKind::InvalidLayout => "invalid layout",
            AllocErrorKind::InvalidMarker => "invalid marker",
        }
    }

    /// Whether this error is an expected outcome callers should handle
    /// (exhaustion), as opposed to contract misuse at the call site.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, AllocErrorKind::OutOfMemory | AllocErrorKind::PoolExhausted)
    }
}

/// Error returned by allocator operations
///
/// Carries the failing [`Layout`] when one was involved, plus an optional
/// static message naming the violated expectation.
#[derive(Debug, Clone)]
pub struct AllocError {
    kind: AllocErrorKind,
    layout: Option<Layout>,
    message: Option<&'static str>,
}

impl AllocError {
    /// Creates a new allocation error with the given kind
    pub fn new(kind: AllocErrorKind) -> Self {
        let error = Self { kind, layout: None, message: None };
        error.log();
        error
    }

    /// Creates a new allocation error with layout information
    pub fn with_layout(kind: AllocErrorKind, layout: Layout) -> Self {
        let error = Self { kind, layout: Some(layout), message: None };
        error.log();
        error
    }

    /// Attaches a static message naming the violated expectation
    pub fn with_message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }

    /// Out-of-memory failure for the given layout
    pub fn out_of_memory(layout: Layout) -> Self {
        Self::with_layout(AllocErrorKind::OutOfMemory, layout)
    }

    /// Pool exhaustion failure for the given layout
    pub fn pool_exhausted(layout: Layout) -> Self {
        Self::with_layout(AllocErrorKind::PoolExhausted, layout)
    }

    /// Invalid layout parameters
    pub fn invalid_layout(message: &'static str) -> Self {
        Self::new(AllocErrorKind::InvalidLayout).with_message(message)
    }

    /// Size calculation overflow
    pub fn size_overflow(message: &'static str) -> Self {
        Self::new(AllocErrorKind::SizeOverflow).with_message(message)
    }

    /// Marker ahead of the current top, or outside the region
    pub fn invalid_marker(message: &'static str) -> Self {
        Self::new(AllocErrorKind::InvalidMarker).with_message(message)
    }

    /// Returns the specific error kind
    #[inline]
    pub const fn kind(&self) -> AllocErrorKind {
        self.kind
    }

    /// Returns the layout associated with this error, if any
    #[inline]
    pub const fn layout(&self) -> Option<Layout> {
        self.layout
    }

    /// Returns the attached message, if any
    #[inline]
    pub const fn message(&self) -> Option<&'static str> {
        self.message
    }

    /// Checks if this is an out-of-memory error
    #[inline]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self.kind, AllocErrorKind::OutOfMemory)
    }

    /// Whether this error is an expected outcome callers should handle
    #[inline]
    pub const fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }

    #[cfg(feature = "logging")]
    fn log(&self) {
        if self.kind.is_recoverable() {
            trace!(kind = self.kind.as_str(), layout = ?self.layout, "allocation failed");
        } else {
            warn!(kind = self.kind.as_str(), layout = ?self.layout, "allocator contract violation");
        }
    }

    #[cfg(not(feature = "logging"))]
    fn log(&self) {}
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.layout {
            Some(layout) => write!(
                f,
                "memory allocation failed ({}): could not allocate {} bytes with alignment {}",
                self.kind,
                layout.size(),
                layout.align()
            )?,
            None => write!(f, "memory allocation failed ({})", self.kind)?,
        }
        if let Some(message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for AllocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<AllocErrorKind> for AllocError {
    fn from(kind: AllocErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result type for allocation operations
pub type AllocResult<T> = Result<T, AllocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(AllocErrorKind::OutOfMemory.is_recoverable());
        assert!(AllocErrorKind::PoolExhausted.is_recoverable());
        assert!(!AllocErrorKind::InvalidLayout.is_recoverable());
        assert!(!AllocErrorKind::InvalidMarker.is_recoverable());
    }

    #[test]
    fn test_error_with_layout() {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let error = AllocError::out_of_memory(layout);

        assert!(error.is_out_of_memory());
        assert_eq!(error.layout(), Some(layout));
        assert!(error.to_string().contains("64 bytes"));
    }

    #[test]
    fn test_error_message() {
        let error = AllocError::invalid_layout("zero-size allocation");
        assert_eq!(error.kind(), AllocErrorKind::InvalidLayout);
        assert_eq!(error.message(), Some("zero-size allocation"));
        assert!(error.to_string().contains("zero-size allocation"));
    }
}
