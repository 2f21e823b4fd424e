//! Error types for backend calls.

use fmtbridge_options::ContentType;
use thiserror::Error;

/// Errors surfaced by a backend call.
///
/// The check-mode "not formatted" signal is never an error; it becomes `Ok(false)`.
#[derive(Debug, Error)]
pub enum BackendError {
	/// The OS refused to spawn the formatter.
	#[error("permission denied spawning `{program}`")]
	PermissionDenied { program: String },
	/// The formatter executable could not be resolved.
	#[error("formatter executable `{program}` not found")]
	ExecutableNotFound { program: String },
	/// The formatter exited unsuccessfully.
	#[error("`{program}` exited with {}: {}", exit_label(.status), .stderr.trim())]
	ProcessFailed {
		program: String,
		args: Vec<String>,
		/// Exit code, or `None` if the process was terminated by a signal.
		status: Option<i32>,
		stdout: String,
		stderr: String,
	},
	/// The formatter wrote bytes that are not UTF-8.
	#[error("formatter output is not valid UTF-8")]
	InvalidOutput,
	/// A pipe or temp file operation failed.
	#[error("failed to {action}: {source}")]
	Io {
		action: &'static str,
		#[source]
		source: std::io::Error,
	},
	/// The module broke the marshaling protocol.
	#[error("plugin protocol violation: {0}")]
	ProtocolViolation(String),
	/// The module trapped during a call.
	#[error("plugin `{plugin}` trapped: {reason}")]
	ModuleTrap { plugin: String, reason: String },
	/// The module does not speak the supported ABI.
	#[error("plugin `{plugin}` is incompatible: {reason}")]
	ModuleIncompatible { plugin: String, reason: String },
	/// The module could not be compiled or instantiated.
	#[error("failed to load plugin `{plugin}`: {reason}")]
	ModuleLoad { plugin: String, reason: String },
	/// The module reported a formatting error (status 2).
	#[error("plugin `{plugin}` failed: {message}")]
	Plugin { plugin: String, message: String },
	/// A module artifact could not be downloaded.
	#[error("failed to fetch {url}: {reason}")]
	Fetch { url: String, reason: String },
	/// No handler for this content type.
	#[error("backend does not handle {0} content")]
	UnsupportedContent(ContentType),
	/// The call's deadline passed.
	#[error("formatter call timed out")]
	Timeout,
	/// The call's cancellation token fired.
	#[error("formatter call cancelled")]
	Cancelled,
}

impl BackendError {
	pub(crate) fn io(action: &'static str) -> impl FnOnce(std::io::Error) -> Self {
		move |source| Self::Io { action, source }
	}

	/// Returns `true` for deadline and cancellation errors.
	pub fn is_interrupt(&self) -> bool {
		matches!(self, Self::Timeout | Self::Cancelled)
	}
}

fn exit_label(status: &Option<i32>) -> String {
	match status {
		Some(code) => format!("status {code}"),
		None => "a signal".to_owned(),
	}
}

/// Result type for backend calls.
pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn process_failure_message_includes_status_and_stderr() {
		let err = BackendError::ProcessFailed {
			program: "deno".into(),
			args: vec!["fmt".into()],
			status: Some(1),
			stdout: String::new(),
			stderr: "error: Expected ';'\n".into(),
		};
		assert_eq!(err.to_string(), "`deno` exited with status 1: error: Expected ';'");
	}

	#[test]
	fn signal_exit_is_labelled() {
		let err = BackendError::ProcessFailed {
			program: "deno".into(),
			args: Vec::new(),
			status: None,
			stdout: String::new(),
			stderr: String::new(),
		};
		assert_eq!(err.to_string(), "`deno` exited with a signal: ");
	}
}
