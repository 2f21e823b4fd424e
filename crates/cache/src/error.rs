//! Error types for cache operations.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
	/// The cache was disposed; it accepts no further operations.
	#[error("cache used after disposal")]
	Disposed,
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
