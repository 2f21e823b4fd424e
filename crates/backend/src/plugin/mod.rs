//! Sandboxed Wasm plugin backend.
//!
//! Each content family is served by one formatter module speaking the schema-3 string ABI (see
//! [`abi`]). Modules are fetched into a local directory on first use ([`PluginStore`]),
//! compiled and schema-checked ([`WasmModule`]), and then kept for the lifetime of the backend
//! as a [`PluginInstance`]. A module rejected as incompatible stays rejected for its family only;
//! fetch and load failures are retried on the next call.
//!
//! Each family's instance has its own lock, so a slow call in one family never holds up
//! another. The markup instance formats its fenced code blocks by calling back into the host,
//! which routes them to the sibling family's instance.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use fmtbridge_options::{ContentFamily, ContentType, FormatOptions, plugin_config};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wasmtime::Engine;

use crate::error::{BackendError, Result};
use crate::{Backend, BackendKind, CallContext, FormatOutcome, FormatRequest};

pub mod abi;
mod instance;
mod store;
mod wasm;

pub use abi::{
	AbiError, AbiResult, EmbeddedFormatter, Export, ModuleAbi, SCHEMA_VERSION, STATUS_CHANGED, STATUS_ERROR,
	STATUS_UNCHANGED,
};
pub use instance::PluginInstance;
pub use store::PluginStore;
pub use wasm::WasmModule;

/// Default artifact host.
pub const DEFAULT_BASE_URL: &str = "https://plugins.dprint.dev";

/// Plugin backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PluginConfig {
	/// Local artifact directory.
	pub dir: PathBuf,
	/// Base URL artifacts are fetched from.
	pub base_url: String,
	/// Download command; `-o <tmp> <url>` is appended.
	pub fetch_command: Vec<String>,
	/// Artifact file name per content family. Families without an entry are unsupported.
	pub artifacts: BTreeMap<ContentFamily, String>,
}

impl Default for PluginConfig {
	fn default() -> Self {
		Self {
			dir: default_plugin_dir(),
			base_url: DEFAULT_BASE_URL.into(),
			fetch_command: vec!["curl".into(), "-fsSL".into()],
			artifacts: BTreeMap::from([
				(ContentFamily::Script, "typescript-0.84.4.wasm".into()),
				(ContentFamily::Data, "json-0.17.2.wasm".into()),
				(ContentFamily::Markup, "markdown-0.15.2.wasm".into()),
			]),
		}
	}
}

/// `<cache dir>/fmtbridge/plugins`, falling back to the temp dir.
pub fn default_plugin_dir() -> PathBuf {
	dirs::cache_dir()
		.unwrap_or_else(std::env::temp_dir)
		.join("fmtbridge")
		.join("plugins")
}

enum Slot {
	Ready(PluginInstance<WasmModule>),
	Incompatible { plugin: String, reason: String },
}

/// Backend hosting one Wasm formatter module per content family.
pub struct PluginBackend {
	shared: Arc<Shared>,
}

/// State reachable from both the backend and the markup instance's embedded-code router.
struct Shared {
	engine: Engine,
	store: PluginStore,
	artifacts: BTreeMap<ContentFamily, String>,
	/// Held only to look up or replace a slot. Module calls lock the slot itself, so families
	/// format in parallel.
	slots: Mutex<HashMap<ContentFamily, Arc<Mutex<Slot>>>>,
	this: Weak<Shared>,
}

impl std::fmt::Debug for PluginBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PluginBackend")
			.field("dir", &self.shared.store.dir())
			.field("artifacts", &self.shared.artifacts)
			.field("loaded", &self.shared.slots.lock().len())
			.finish()
	}
}

impl PluginBackend {
	pub fn new(config: PluginConfig) -> Self {
		let shared = Arc::new_cyclic(|this| Shared {
			engine: Engine::default(),
			store: PluginStore::new(config.dir, config.base_url, config.fetch_command),
			artifacts: config.artifacts,
			slots: Mutex::new(HashMap::new()),
			this: this.clone(),
		});
		Self { shared }
	}

	pub fn store(&self) -> &PluginStore {
		&self.shared.store
	}

	/// Whether a live instance exists for `family`.
	pub fn is_loaded(&self, family: ContentFamily) -> bool {
		self.shared
			.slot(family)
			.is_some_and(|slot| matches!(&*slot.lock(), Slot::Ready(_)))
	}
}

impl Shared {
	fn slot(&self, family: ContentFamily) -> Option<Arc<Mutex<Slot>>> {
		self.slots.lock().get(&family).cloned()
	}

	fn artifact(&self, request: &FormatRequest<'_>) -> Result<&str> {
		self.artifacts
			.get(&request.family())
			.map(String::as_str)
			.ok_or(BackendError::UnsupportedContent(request.content_type))
	}

	/// `Some` once the family has a live instance or a remembered rejection.
	fn settled(&self, family: ContentFamily) -> Option<Result<()>> {
		let slot = self.slot(family)?;
		let settled = match &*slot.lock() {
			Slot::Ready(_) => Ok(()),
			Slot::Incompatible { plugin, reason } => Err(BackendError::ModuleIncompatible {
				plugin: plugin.clone(),
				reason: reason.clone(),
			}),
		};
		Some(settled)
	}

	async fn ensure_loaded(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<()> {
		let artifact = self.artifact(request)?;
		if let Some(settled) = self.settled(request.family()) {
			return settled;
		}
		let path = self.store.fetch(artifact, ctx).await?;
		self.install(request.family(), artifact, path)
	}

	fn ensure_loaded_blocking(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<()> {
		let artifact = self.artifact(request)?;
		if let Some(settled) = self.settled(request.family()) {
			return settled;
		}
		let path = self.store.fetch_blocking(artifact, ctx)?;
		self.install(request.family(), artifact, path)
	}

	fn install(&self, family: ContentFamily, artifact: &str, path: PathBuf) -> Result<()> {
		let bytes = std::fs::read(&path).map_err(BackendError::io("read plugin artifact"))?;
		match WasmModule::instantiate(&self.engine, &bytes, artifact) {
			Ok(module) => {
				// Markup documents embed code blocks of the other families.
				let module = if family == ContentFamily::Markup {
					module.with_embedded(Arc::new(Embedded {
						shared: self.this.clone(),
						host: family,
					}))
				} else {
					module
				};
				tracing::info!(%family, plugin = artifact, "plugin loaded");
				self.slots.lock().entry(family).or_insert_with(|| {
					Arc::new(Mutex::new(Slot::Ready(PluginInstance::new(module, artifact, family))))
				});
				Ok(())
			}
			Err(BackendError::ModuleIncompatible { plugin, reason }) => {
				tracing::warn!(%family, %plugin, %reason, "plugin rejected");
				self.slots.lock().insert(
					family,
					Arc::new(Mutex::new(Slot::Incompatible {
						plugin: plugin.clone(),
						reason: reason.clone(),
					})),
				);
				Err(BackendError::ModuleIncompatible { plugin, reason })
			}
			Err(err) => Err(err),
		}
	}

	/// Runs `f` on the family's instance. A trapped instance is discarded so the next call
	/// starts from a fresh module.
	fn with_instance<T>(
		&self,
		family: ContentFamily,
		f: impl FnOnce(&mut PluginInstance<WasmModule>) -> Result<T>,
	) -> Result<T> {
		let unloaded = || BackendError::ModuleLoad {
			plugin: family.plugin_name().to_owned(),
			reason: "plugin was unloaded".into(),
		};
		let slot = self.slot(family).ok_or_else(unloaded)?;
		let mut guard = slot.lock();
		let Slot::Ready(instance) = &mut *guard else {
			return Err(unloaded());
		};
		let result = f(instance);
		drop(guard);

		if let Err(BackendError::ModuleTrap { plugin, reason }) = &result {
			tracing::warn!(%family, %plugin, %reason, "discarding trapped plugin instance");
			let mut slots = self.slots.lock();
			if slots.get(&family).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
				slots.remove(&family);
			}
		}
		result
	}
}

/// Formats code blocks a markup module hands back through `host_format` with the instance of
/// the block's own family. The host family itself is never re-entered.
struct Embedded {
	shared: Weak<Shared>,
	host: ContentFamily,
}

impl EmbeddedFormatter for Embedded {
	fn format_embedded(
		&self,
		path: &str,
		text: &str,
		override_config: Option<&str>,
		options: &FormatOptions,
		ctx: &CallContext,
	) -> Result<FormatOutcome> {
		let Some(content_type) = ContentType::from_path(Path::new(path)) else {
			return Ok(FormatOutcome::Unchanged);
		};
		let family = content_type.family();
		let Some(shared) = self.shared.upgrade() else {
			return Ok(FormatOutcome::Unchanged);
		};
		if family == self.host || !shared.artifacts.contains_key(&family) {
			return Ok(FormatOutcome::Unchanged);
		}

		let options = match override_config.and_then(|c| serde_json::from_str::<Map<String, Value>>(c).ok()) {
			Some(config) => plugin_config::apply_override(options, &config),
			None => options.clone(),
		};
		let request = FormatRequest::new(text, content_type, &options);
		shared.ensure_loaded_blocking(&request, ctx)?;
		tracing::trace!(host = %self.host, %family, "formatting embedded code");
		shared.with_instance(family, |instance| instance.format(&request, ctx))
	}
}

#[async_trait]
impl Backend for PluginBackend {
	fn kind(&self) -> BackendKind {
		BackendKind::Plugin
	}

	fn supports(&self, family: ContentFamily) -> bool {
		self.shared.artifacts.contains_key(&family)
	}

	async fn format(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<FormatOutcome> {
		self.shared.ensure_loaded(request, ctx).await?;
		self.shared
			.with_instance(request.family(), |instance| instance.format(request, ctx))
	}

	fn format_blocking(&self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<FormatOutcome> {
		self.shared.ensure_loaded_blocking(request, ctx)?;
		self.shared
			.with_instance(request.family(), |instance| instance.format(request, ctx))
	}

	fn dispose(&self) {
		let mut slots = self.shared.slots.lock();
		tracing::debug!(instances = slots.len(), "disposing plugin instances");
		slots.clear();
	}
}
