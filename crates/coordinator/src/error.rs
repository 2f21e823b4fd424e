//! Error types for coordinator operations.

use std::path::PathBuf;

use fmtbridge_backend::BackendError;
use fmtbridge_cache::CacheError;
use fmtbridge_options::{ContentType, FormatOptions, OptionsError};
use thiserror::Error;

/// Errors returned by [`crate::Coordinator`].
#[derive(Debug, Error)]
pub enum Error {
	/// An option value was rejected before any backend ran.
	#[error(transparent)]
	Options(#[from] OptionsError),
	/// The backend failed. Carries what it was asked to do.
	#[error("formatting {content_type} with {options} failed: {source}")]
	Backend {
		#[source]
		source: BackendError,
		content_type: ContentType,
		options: Box<FormatOptions>,
	},
	/// A configured backend could not be constructed.
	#[error("backend unavailable: {0}")]
	Unavailable(#[source] BackendError),
	/// The coordinator was disposed.
	#[error("coordinator used after disposal")]
	Disposed,
	/// The configuration file could not be read.
	#[error("failed to read config {}: {source}", path.display())]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	/// The configuration file is not valid TOML for this schema.
	#[error("invalid config: {0}")]
	ConfigParse(#[from] toml::de::Error),
	/// The configuration is well-formed but unusable.
	#[error("invalid config: {0}")]
	Config(String),
	/// Input bytes are not UTF-8.
	#[error("input is not valid UTF-8: {0}")]
	InvalidInput(#[from] std::str::Utf8Error),
}

impl Error {
	/// The backend error behind this failure, if any.
	pub fn backend(&self) -> Option<&BackendError> {
		match self {
			Self::Backend { source, .. } | Self::Unavailable(source) => Some(source),
			_ => None,
		}
	}
}

impl From<CacheError> for Error {
	fn from(err: CacheError) -> Self {
		match err {
			CacheError::Disposed => Self::Disposed,
		}
	}
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;
