//! External-process backend.
//!
//! Each call spawns a fresh formatter child; nothing is reused between calls.
//!
//! - Async calls pipe the source through stdin as `<program> <subcommand> <flags...> --ext <ext>
//!   -` and read the result from stdout. Input is written in
//!   [`WRITE_CHUNK_SIZE`] chunks while stdout and stderr are drained concurrently, so a child that
//!   fills its output pipe before consuming all input cannot deadlock the host.
//! - Blocking calls write the source to a temp file named with the content type's extension,
//!   run the formatter on that path, and read the file back. Output streams go to anonymous temp
//!   files so the deadline can be polled without risk of a full pipe.
//!
//! A check is a format whose result equals the input. The tool's own `--check` mode is not used,
//! so the verdict never depends on how the tool words its report.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use fmtbridge_options::{ContentFamily, FormatOptions, flags};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use crate::error::{BackendError, Result};
use crate::{Backend, BackendKind, CallContext, FormatOutcome, FormatRequest};

mod classify;
mod io;

pub use io::WRITE_CHUNK_SIZE;

use classify::Captured;

/// Interval between exit polls on the blocking path.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// External formatter invocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProcessConfig {
	/// Executable name (resolved on `PATH`) or path.
	pub program: String,
	/// Subcommand placed before all flags.
	pub subcommand: String,
	/// Extra environment for the child.
	pub env: BTreeMap<String, String>,
	/// Substring that marks a failed run as "valid input, not formatted" when checking. Matched
	/// case-insensitively.
	pub not_formatted_marker: String,
}

impl Default for ProcessConfig {
	fn default() -> Self {
		Self {
			program: "deno".into(),
			subcommand: "fmt".into(),
			env: BTreeMap::new(),
			not_formatted_marker: "not formatted".into(),
		}
	}
}

/// Where the formatter reads its source from.
enum Source<'a> {
	Stdin { ext: &'a str },
	File(&'a Path),
}

/// Backend that shells out to an external formatter.
#[derive(Debug)]
pub struct ProcessBackend {
	config: ProcessConfig,
	program: PathBuf,
}

impl ProcessBackend {
	/// Resolves the configured executable. Fails fast if it cannot be found.
	pub fn new(config: ProcessConfig) -> Result<Self> {
		let program = resolve_program(&config.program)?;
		tracing::debug!(program = %program.display(), "resolved formatter executable");
		Ok(Self { config, program })
	}

	pub fn config(&self) -> &ProcessConfig {
		&self.config
	}

	/// Resolved executable path.
	pub fn program(&self) -> &Path {
		&self.program
	}

	fn args(&self, options: &FormatOptions, source: Source<'_>) -> Vec<String> {
		let mut args = vec![self.config.subcommand.clone()];
		args.extend(flags::to_flags(options));
		match source {
			Source::Stdin { ext } => args.extend(["--ext".into(), ext.into(), "-".into()]),
			Source::File(path) => args.push(path.to_string_lossy().into_owned()),
		}
		args
	}

	fn spawn_error(&self, source: std::io::Error) -> BackendError {
		let program = self.config.program.clone();
		match source.kind() {
			std::io::ErrorKind::PermissionDenied => BackendError::PermissionDenied { program },
			std::io::ErrorKind::NotFound => BackendError::ExecutableNotFound { program },
			_ => BackendError::Io {
				action: "spawn formatter",
				source,
			},
		}
	}

	async fn run_piped(&self, args: &[String], input: &str, ctx: &CallContext) -> Result<Captured> {
		ctx.checkpoint()?;

		let mut cmd = tokio::process::Command::new(&self.program);
		cmd.args(args)
			.envs(&self.config.env)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		tracing::debug!(program = %self.config.program, ?args, bytes = input.len(), "spawning formatter");
		let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

		let (Some(stdin), Some(mut stdout), Some(mut stderr)) =
			(child.stdin.take(), child.stdout.take(), child.stderr.take())
		else {
			return Err(BackendError::Io {
				action: "attach formatter pipes",
				source: std::io::Error::other("stdio not piped"),
			});
		};

		let exchange = async {
			let read_out = async {
				let mut buf = Vec::new();
				stdout.read_to_end(&mut buf).await.map(|_| buf)
			};
			let read_err = async {
				let mut buf = Vec::new();
				stderr.read_to_end(&mut buf).await.map(|_| buf)
			};
			let (written, out, err) = tokio::join!(io::write_chunked(stdin, input.as_bytes()), read_out, read_err);
			written.map_err(BackendError::io("write formatter stdin"))?;
			let stdout = out.map_err(BackendError::io("read formatter stdout"))?;
			let stderr = err.map_err(BackendError::io("read formatter stderr"))?;
			let status = child.wait().await.map_err(BackendError::io("wait for formatter"))?;
			Ok(Captured {
				status: status.code(),
				stdout,
				stderr,
			})
		};

		// Dropping the child on interrupt kills it.
		let captured = tokio::select! {
			captured = exchange => captured?,
			err = ctx.interrupted() => {
				tracing::debug!(program = %self.config.program, error = %err, "formatter interrupted");
				return Err(err);
			}
		};
		tracing::trace!(status = ?captured.status, stdout = captured.stdout.len(), "formatter exited");
		Ok(captured)
	}

	fn run_blocking(&self, args: &[String], ctx: &CallContext) -> Result<Captured> {
		ctx.checkpoint()?;

		let mut stdout = tempfile::tempfile().map_err(BackendError::io("create stdout capture"))?;
		let mut stderr = tempfile::tempfile().map_err(BackendError::io("create stderr capture"))?;

		let mut cmd = std::process::Command::new(&self.program);
		cmd.args(args)
			.envs(&self.config.env)
			.stdin(Stdio::null())
			.stdout(stdout.try_clone().map_err(BackendError::io("create stdout capture"))?)
			.stderr(stderr.try_clone().map_err(BackendError::io("create stderr capture"))?);

		tracing::debug!(program = %self.config.program, ?args, "spawning formatter (blocking)");
		let mut child = ChildGuard(cmd.spawn().map_err(|e| self.spawn_error(e))?);

		let status = loop {
			if let Some(status) = child.0.try_wait().map_err(BackendError::io("wait for formatter"))? {
				break status;
			}
			ctx.checkpoint()?;
			std::thread::sleep(POLL_INTERVAL);
		};

		Ok(Captured {
			status: status.code(),
			stdout: read_capture(&mut stdout)?,
			stderr: read_capture(&mut stderr)?,
		})
	}

	fn write_source(&self, request: &FormatRequest<'_>) -> Result<tempfile::NamedTempFile> {
		let suffix = format!(".{}", request.content_type.extension());
		let mut file = tempfile::Builder::new()
			.prefix("fmtbridge-")
			.suffix(&suffix)
			.tempfile()
			.map_err(BackendError::io("create source temp file"))?;
		file.write_all(request.text.as_bytes())
			.and_then(|()| file.flush())
			.map_err(BackendError::io("write source temp file"))?;
		Ok(file)
	}
}

#[async_trait]
impl Backend for ProcessBackend {
	fn kind(&self) -> BackendKind {
		BackendKind::Process
	}

	fn supports(&self, _family: ContentFamily) -> bool {
		true
	}

	async fn format(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<FormatOutcome> {
		let ext = request.content_type.extension();
		let args = self.args(request.options, Source::Stdin { ext });
		let captured = self.run_piped(&args, request.text, ctx).await?;
		classify::formatted_stdout(request.text, captured, &self.config.program, &args)
	}

	fn format_blocking(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<FormatOutcome> {
		let file = self.write_source(request)?;
		let args = self.args(request.options, Source::File(file.path()));
		let captured = self.run_blocking(&args, ctx)?;
		let rewritten = if captured.success() {
			std::fs::read(file.path()).map_err(BackendError::io("read formatted temp file"))?
		} else {
			Vec::new()
		};
		classify::rewritten_file(request.text, captured, rewritten, &self.config.program, &args)
	}

	async fn check(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<bool> {
		let formatted = self.format(request, ctx).await;
		classify::check_verdict(formatted, &self.config.not_formatted_marker)
	}

	fn check_blocking(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<bool> {
		let formatted = self.format_blocking(request, ctx);
		classify::check_verdict(formatted, &self.config.not_formatted_marker)
	}
}

/// Kills and reaps the child if it is still running when dropped.
struct ChildGuard(std::process::Child);

impl Drop for ChildGuard {
	fn drop(&mut self) {
		if matches!(self.0.try_wait(), Ok(None)) {
			let _ = self.0.kill();
			let _ = self.0.wait();
		}
	}
}

fn read_capture(file: &mut std::fs::File) -> Result<Vec<u8>> {
	let mut buf = Vec::new();
	file.seek(SeekFrom::Start(0))
		.and_then(|_| file.read_to_end(&mut buf))
		.map_err(BackendError::io("read formatter output"))?;
	Ok(buf)
}

/// Paths are taken as given; bare names are looked up on `PATH`.
fn resolve_program(program: &str) -> Result<PathBuf> {
	let path = Path::new(program);
	if path.components().count() > 1 {
		return if path.exists() {
			Ok(path.to_path_buf())
		} else {
			Err(BackendError::ExecutableNotFound {
				program: program.to_owned(),
			})
		};
	}
	which::which(program).map_err(|_| BackendError::ExecutableNotFound {
		program: program.to_owned(),
	})
}
