//! On-disk plugin artifacts, fetched on first use by a trusted helper process.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use crate::error::{BackendError, Result};
use crate::CallContext;

/// Directory of plugin artifacts plus the command that downloads missing ones.
///
/// A missing artifact is fetched with `<command...> -o <tmp> <base_url>/<artifact>` into a
/// sibling temp file and renamed into place, so a reader never observes a partial download.
#[derive(Debug, Clone)]
pub struct PluginStore {
	dir: PathBuf,
	base_url: String,
	command: Vec<String>,
}

impl PluginStore {
	pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>, command: Vec<String>) -> Self {
		Self {
			dir: dir.into(),
			base_url: base_url.into(),
			command,
		}
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Local path of `artifact`, whether or not it exists yet.
	pub fn path_for(&self, artifact: &str) -> PathBuf {
		self.dir.join(artifact)
	}

	/// Remote location of `artifact`.
	pub fn url_for(&self, artifact: &str) -> String {
		format!("{}/{artifact}", self.base_url.trim_end_matches('/'))
	}

	/// Returns the artifact's path, downloading it first if absent.
	pub async fn fetch(&self, artifact: &str, ctx: &CallContext) -> Result<PathBuf> {
		let path = self.path_for(artifact);
		if path.is_file() {
			return Ok(path);
		}
		ctx.checkpoint()?;
		let (cmd, part, url) = self.prepare(artifact)?;

		let mut cmd = tokio::process::Command::from(cmd);
		cmd.kill_on_drop(true);
		let output = tokio::select! {
			output = cmd.output() => output,
			err = ctx.interrupted() => {
				let _ = std::fs::remove_file(&part);
				return Err(err);
			}
		};
		self.finish(output, &part, &path, url)
	}

	/// Blocking counterpart of [`PluginStore::fetch`].
	pub fn fetch_blocking(&self, artifact: &str, ctx: &CallContext) -> Result<PathBuf> {
		let path = self.path_for(artifact);
		if path.is_file() {
			return Ok(path);
		}
		ctx.checkpoint()?;
		let (mut cmd, part, url) = self.prepare(artifact)?;
		let output = cmd.output();
		self.finish(output, &part, &path, url)
	}

	fn prepare(&self, artifact: &str) -> Result<(std::process::Command, PathBuf, String)> {
		let url = self.url_for(artifact);
		let Some((program, args)) = self.command.split_first() else {
			return Err(BackendError::Fetch {
				url,
				reason: "no fetch command configured".into(),
			});
		};
		which::which(program).map_err(|_| BackendError::Fetch {
			url: url.clone(),
			reason: format!("`{program}` is not available on PATH"),
		})?;

		std::fs::create_dir_all(&self.dir).map_err(BackendError::io("create plugin directory"))?;
		let part = self.dir.join(format!(".{artifact}.{}.part", std::process::id()));

		let mut cmd = std::process::Command::new(program);
		cmd.args(args)
			.arg("-o")
			.arg(&part)
			.arg(&url)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::piped());
		tracing::info!(%url, dest = %self.dir.display(), "fetching plugin");
		Ok((cmd, part, url))
	}

	fn finish(&self, output: std::io::Result<Output>, part: &Path, path: &Path, url: String) -> Result<PathBuf> {
		let output = output.map_err(|e| BackendError::Fetch {
			url: url.clone(),
			reason: e.to_string(),
		})?;
		if !output.status.success() {
			let _ = std::fs::remove_file(part);
			return Err(BackendError::Fetch {
				url,
				reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
			});
		}
		std::fs::rename(part, path).map_err(BackendError::io("move fetched plugin into place"))?;
		tracing::debug!(path = %path.display(), "plugin fetched");
		Ok(path.to_path_buf())
	}
}
