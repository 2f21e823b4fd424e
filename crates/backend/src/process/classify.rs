//! Maps a finished formatter run to a result.

use crate::error::{BackendError, Result};
use crate::FormatOutcome;

/// Everything observed from one formatter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Captured {
	/// Exit code; `None` when killed by a signal.
	pub status: Option<i32>,
	pub stdout: Vec<u8>,
	pub stderr: Vec<u8>,
}

impl Captured {
	pub fn success(&self) -> bool {
		self.status == Some(0)
	}

	fn into_failure(self, program: &str, args: &[String]) -> BackendError {
		BackendError::ProcessFailed {
			program: program.to_owned(),
			args: args.to_vec(),
			status: self.status,
			stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
			stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
		}
	}
}

/// Classifies a run that wrote the formatted text to stdout.
pub(crate) fn formatted_stdout(input: &str, captured: Captured, program: &str, args: &[String]) -> Result<FormatOutcome> {
	if !captured.success() {
		return Err(captured.into_failure(program, args));
	}
	let text = String::from_utf8(captured.stdout).map_err(|_| BackendError::InvalidOutput)?;
	Ok(outcome(input, text))
}

/// Turns a format result into a check verdict: formatted means unchanged.
///
/// A failed run whose output mentions `marker` (ignoring case) is a `false` verdict rather than an
/// error, for tools that refuse to print unformatted input.
pub(crate) fn check_verdict(formatted: Result<FormatOutcome>, marker: &str) -> Result<bool> {
	match formatted {
		Ok(outcome) => Ok(outcome.is_unchanged()),
		Err(BackendError::ProcessFailed { stdout, stderr, .. })
			if mentions(&stdout, marker) || mentions(&stderr, marker) =>
		{
			Ok(false)
		}
		Err(err) => Err(err),
	}
}

fn mentions(stream: &str, marker: &str) -> bool {
	!marker.is_empty() && stream.to_lowercase().contains(&marker.to_lowercase())
}

/// Classifies a run that rewrote a file in place. `rewritten` is the file's content afterwards.
pub(crate) fn rewritten_file(
	input: &str,
	captured: Captured,
	rewritten: Vec<u8>,
	program: &str,
	args: &[String],
) -> Result<FormatOutcome> {
	if !captured.success() {
		return Err(captured.into_failure(program, args));
	}
	let text = String::from_utf8(rewritten).map_err(|_| BackendError::InvalidOutput)?;
	Ok(outcome(input, text))
}

fn outcome(input: &str, text: String) -> FormatOutcome {
	if text == input { FormatOutcome::Unchanged } else { FormatOutcome::Formatted(text) }
}
