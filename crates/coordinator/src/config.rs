//! TOML configuration.
//!
//! ```toml
//! [options]
//! lineWidth = 100
//! semiColons = false
//!
//! [cache]
//! capacity = 256
//! ttl-ms = 300000
//!
//! [[backends]]
//! kind = "plugin"
//! base-url = "https://plugins.dprint.dev"
//!
//! [[backends]]
//! kind = "process"
//! program = "deno"
//! ```
//!
//! Option names use the same camelCase spelling as plugin configuration; everything else is
//! kebab-case. Backends are listed in preference order.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fmtbridge_backend::Backend;
use fmtbridge_backend::plugin::{PluginBackend, PluginConfig};
use fmtbridge_backend::process::{ProcessBackend, ProcessConfig};
use fmtbridge_options::OptionsOverride;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complete coordinator configuration. Deep-copied into each coordinator built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CoordinatorConfig {
	/// Instance-level option defaults.
	pub options: OptionsOverride,
	pub cache: CacheConfig,
	/// Backends in preference order.
	pub backends: Vec<BackendConfig>,
}

impl Default for CoordinatorConfig {
	fn default() -> Self {
		Self {
			options: OptionsOverride::default(),
			cache: CacheConfig::default(),
			backends: vec![BackendConfig::Process(ProcessConfig::default())],
		}
	}
}

impl CoordinatorConfig {
	/// Reads and parses a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml(&text)?;
		tracing::debug!(path = %path.display(), backends = config.backends.len(), "loaded config");
		Ok(config)
	}

	pub fn from_toml(text: &str) -> Result<Self> {
		Ok(toml::from_str(text)?)
	}
}

/// Cache sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CacheConfig {
	/// Maximum entries; `0` disables caching.
	pub capacity: usize,
	/// Maximum entry age in milliseconds.
	pub ttl_ms: u64,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			capacity: 256,
			ttl_ms: 300_000,
		}
	}
}

impl CacheConfig {
	pub fn ttl(&self) -> Duration {
		Duration::from_millis(self.ttl_ms)
	}
}

/// One backend declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BackendConfig {
	Process(ProcessConfig),
	Plugin(PluginConfig),
}

impl BackendConfig {
	/// Constructs the backend. Process backends resolve their executable here.
	pub fn build(&self) -> Result<Arc<dyn Backend>> {
		Ok(match self {
			Self::Process(config) => Arc::new(ProcessBackend::new(config.clone()).map_err(Error::Unavailable)?),
			Self::Plugin(config) => Arc::new(PluginBackend::new(config.clone())),
		})
	}
}

#[cfg(test)]
mod tests {
	use fmtbridge_options::ContentFamily;
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_file_yields_defaults() {
		let config = CoordinatorConfig::from_toml("").unwrap();
		assert_eq!(config, CoordinatorConfig::default());
		assert_eq!(config.cache.ttl(), Duration::from_secs(300));
	}

	#[test]
	fn full_file_parses() {
		let config = CoordinatorConfig::from_toml(
			r#"
[options]
lineWidth = 100
semiColons = false

[cache]
capacity = 8
ttl-ms = 1000

[[backends]]
kind = "plugin"
dir = "/var/cache/plugins"
base-url = "https://mirror.example"

[backends.artifacts]
data = "json.wasm"

[[backends]]
kind = "process"
program = "/opt/deno/bin/deno"
"#,
		)
		.unwrap();

		assert_eq!(config.options, OptionsOverride::new().line_width(100).semicolons(false));
		assert_eq!(config.cache, CacheConfig { capacity: 8, ttl_ms: 1000 });

		let [BackendConfig::Plugin(plugin), BackendConfig::Process(process)] = config.backends.as_slice() else {
			panic!("unexpected backends: {:?}", config.backends);
		};
		assert_eq!(plugin.base_url, "https://mirror.example");
		assert_eq!(plugin.artifacts.len(), 1);
		assert_eq!(plugin.artifacts[&ContentFamily::Data], "json.wasm");
		assert_eq!(process.program, "/opt/deno/bin/deno");
		assert_eq!(process.subcommand, "fmt");
	}

	#[test]
	fn unknown_keys_are_rejected() {
		assert!(matches!(CoordinatorConfig::from_toml("[cache]\nsize = 3\n"), Err(Error::ConfigParse(_))));
		assert!(matches!(CoordinatorConfig::from_toml("[options]\nwidth = 3\n"), Err(Error::ConfigParse(_))));
	}

	#[test]
	fn load_reads_a_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("fmtbridge.toml");
		std::fs::write(&path, "[cache]\ncapacity = 0\n").unwrap();

		let config = CoordinatorConfig::load(&path).unwrap();
		assert_eq!(config.cache.capacity, 0);
		assert_eq!(config.cache.ttl_ms, 300_000);
	}

	#[test]
	fn missing_file_reports_path() {
		let err = CoordinatorConfig::load("/nonexistent/fmtbridge.toml").unwrap_err();
		assert!(err.to_string().contains("/nonexistent/fmtbridge.toml"), "{err}");
	}

	#[test]
	fn missing_executable_is_unavailable() {
		let backend = BackendConfig::Process(ProcessConfig {
			program: "fmtbridge-no-such-formatter".into(),
			..ProcessConfig::default()
		});
		assert!(matches!(backend.build(), Err(Error::Unavailable(_))));
	}
}
