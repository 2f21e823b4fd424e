//! Formatter backends.
//!
//! A [`Backend`] turns a [`FormatRequest`] into a [`FormatOutcome`] or a check verdict. Two
//! implementations exist, each behind a cargo feature:
//!
//! - `process`: [`process::ProcessBackend`] spawns an external formatter (`deno fmt` by default)
//!   per call and streams the source text through its stdin.
//! - `plugin`: [`plugin::PluginBackend`] hosts one sandboxed Wasm formatter module per content
//!   family and marshals strings through the module's shared linear memory.
//!
//! Every call receives a [`CallContext`] carrying an optional deadline and a cancellation token.
//! Backends never cache; that is the coordinator's job.

use std::fmt;

use async_trait::async_trait;
use fmtbridge_options::{ContentFamily, ContentType, FormatOptions};

mod context;
mod error;
#[cfg(feature = "plugin")]
pub mod plugin;
#[cfg(feature = "process")]
pub mod process;

pub use context::CallContext;
pub use error::{BackendError, Result};

/// Which strategy a backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
	/// External formatter process.
	Process,
	/// Sandboxed Wasm plugin module.
	Plugin,
}

impl fmt::Display for BackendKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Process => "process",
			Self::Plugin => "plugin",
		})
	}
}

/// Whether a call formats or only verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
	/// Produce formatted text.
	#[default]
	Format,
	/// Report whether the text is already formatted.
	Check,
}

/// One formatting request. Borrowed for the duration of a backend call.
#[derive(Debug, Clone, Copy)]
pub struct FormatRequest<'a> {
	/// Source text.
	pub text: &'a str,
	/// Grammar to apply.
	pub content_type: ContentType,
	/// Fully resolved options.
	pub options: &'a FormatOptions,
}

impl<'a> FormatRequest<'a> {
	pub fn new(text: &'a str, content_type: ContentType, options: &'a FormatOptions) -> Self {
		Self {
			text,
			content_type,
			options,
		}
	}

	/// Family of the request's content type.
	pub fn family(&self) -> ContentFamily {
		self.content_type.family()
	}
}

/// Successful formatter result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
	/// The input was already formatted.
	Unchanged,
	/// The formatter rewrote the input.
	Formatted(String),
}

impl FormatOutcome {
	pub fn is_unchanged(&self) -> bool {
		matches!(self, Self::Unchanged)
	}

	/// Resolves the outcome to text, reusing `original` when unchanged.
	pub fn into_text(self, original: &str) -> String {
		match self {
			Self::Unchanged => original.to_owned(),
			Self::Formatted(text) => text,
		}
	}
}

/// Uniform format/check capability.
///
/// Implementations must be safe to share between coordinators derived from one another; all
/// mutable state lives behind interior locks.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
	/// Strategy tag, for logs and diagnostics.
	fn kind(&self) -> BackendKind;

	/// Whether this backend can format the given family.
	fn supports(&self, family: ContentFamily) -> bool;

	/// Formats the request, yielding at I/O boundaries.
	async fn format(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<FormatOutcome>;

	/// Formats the request on the calling thread.
	fn format_blocking(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<FormatOutcome>;

	/// Returns `true` if the request text is already formatted.
	async fn check(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<bool> {
		Ok(self.format(request, ctx).await?.is_unchanged())
	}

	/// Blocking counterpart of [`Backend::check`].
	fn check_blocking(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<bool> {
		Ok(self.format_blocking(request, ctx)?.is_unchanged())
	}

	/// Releases long-lived resources. Called once by the owning coordinator.
	fn dispose(&self) {}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unchanged_resolves_to_original() {
		assert_eq!(FormatOutcome::Unchanged.into_text("a"), "a");
		assert_eq!(FormatOutcome::Formatted("b".into()).into_text("a"), "b");
	}
}
