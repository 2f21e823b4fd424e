//! Error types for option resolution and validation.

use thiserror::Error;

/// Errors raised while resolving or validating formatting options.
///
/// These are caller-correctable and are always raised before any backend runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
	/// A numeric option is outside its accepted range.
	#[error("option `{name}` must be between {min} and {max}, got {value}")]
	OutOfRange {
		/// Option name as it appears in configuration.
		name: &'static str,
		/// The rejected value.
		value: u64,
		/// Smallest accepted value.
		min: u64,
		/// Largest accepted value.
		max: u64,
	},

	/// A list option contains an entry that cannot be serialized.
	#[error("option `{name}` has an invalid entry {entry:?}: {reason}")]
	InvalidEntry {
		/// Option name as it appears in configuration.
		name: &'static str,
		/// The rejected entry.
		entry: String,
		/// Why the entry was rejected.
		reason: &'static str,
	},

	/// A prose wrap mode string was not recognized.
	#[error("invalid prose wrap mode: {0} (expected 'always', 'never' or 'preserve')")]
	InvalidProseWrap(String),

	/// A content type string was not recognized.
	#[error("unknown content type: {0}")]
	UnknownContentType(String),
}

/// Result type for option operations.
pub type Result<T> = std::result::Result<T, OptionsError>;
