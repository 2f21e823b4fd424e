//! `fmtbridge` binary.
//!
//! Formats FILE (or stdin) and prints the result, or with `--check` exits with status 1 when the
//! input is not formatted.

mod cli;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use fmtbridge::{Coordinator, CoordinatorConfig, Output, Request};
use tracing::debug;

fn main() -> anyhow::Result<ExitCode> {
	let cli = Cli::parse();
	setup_tracing(cli.verbose);

	let config = load_config(cli.config.as_deref())?;
	let content_type = cli
		.content_type()
		.context("cannot infer the content type; pass --ext")?;
	let source = read_source(cli.file.as_deref())?;

	let coordinator = Coordinator::from_config(&config)?;
	let mut request = Request::from_utf8(&source, content_type)?.overrides(cli.overrides());
	if let Some(timeout) = cli.timeout() {
		request = request.timeout(timeout);
	}

	debug!(%content_type, mode = ?cli.mode(), blocking = cli.blocking, "formatting");
	let output = if cli.blocking {
		coordinator.run_blocking(cli.mode(), &request)
	} else {
		let runtime = tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()
			.context("failed to start async runtime")?;
		runtime.block_on(coordinator.run(cli.mode(), &request))
	};
	coordinator.dispose();

	match output? {
		Output::Text(text) => {
			let mut stdout = std::io::stdout().lock();
			stdout.write_all(text.as_bytes())?;
			stdout.flush()?;
			Ok(ExitCode::SUCCESS)
		}
		Output::Checked(true) => Ok(ExitCode::SUCCESS),
		Output::Checked(false) => {
			let name = cli.file.as_deref().map_or("<stdin>".into(), |p| p.display().to_string());
			eprintln!("{name}: not formatted");
			Ok(ExitCode::FAILURE)
		}
	}
}

/// An explicit `--config` must exist; the default location is optional.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<CoordinatorConfig> {
	if let Some(path) = explicit {
		return Ok(CoordinatorConfig::load(path)?);
	}
	match default_config_path().filter(|p| p.is_file()) {
		Some(path) => {
			debug!(path = %path.display(), "using default config");
			Ok(CoordinatorConfig::load(path)?)
		}
		None => Ok(CoordinatorConfig::default()),
	}
}

fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("fmtbridge").join("config.toml"))
}

fn read_source(file: Option<&Path>) -> anyhow::Result<Vec<u8>> {
	match file {
		Some(path) => std::fs::read(path).with_context(|| format!("failed to read {}", path.display())),
		None => {
			let mut buf = Vec::new();
			std::io::stdin().lock().read_to_end(&mut buf).context("failed to read stdin")?;
			Ok(buf)
		}
	}
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("fmtbridge=debug,fmtbridge_backend=debug,fmtbridge_cache=trace,info")
		} else {
			EnvFilter::new("warn")
		}
	});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}
