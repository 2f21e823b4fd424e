//! Backend routing in front of the result cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fmtbridge_backend::{Backend, BackendError, CallContext, FormatRequest, Mode};
use fmtbridge_cache::{CacheKey, CacheObserver, CacheStats, Clock, FormatCache, NoopObserver, SystemClock};
use fmtbridge_options::{ContentFamily, ContentType, FormatOptions, OptionsOverride};
use parking_lot::{Mutex, RwLock};

use crate::config::{CacheConfig, CoordinatorConfig};
use crate::error::{Error, Result};

/// One call into the coordinator.
#[derive(Debug, Clone)]
pub struct Request<'a> {
	text: &'a str,
	content_type: ContentType,
	overrides: OptionsOverride,
	context: CallContext,
}

impl<'a> Request<'a> {
	pub fn new(text: &'a str, content_type: ContentType) -> Self {
		Self {
			text,
			content_type,
			overrides: OptionsOverride::default(),
			context: CallContext::default(),
		}
	}

	/// Builds a request from raw bytes, rejecting invalid UTF-8 before any backend runs.
	pub fn from_utf8(bytes: &'a [u8], content_type: ContentType) -> Result<Self> {
		Ok(Self::new(std::str::from_utf8(bytes)?, content_type))
	}

	/// Per-call options, layered over the coordinator's defaults.
	pub fn overrides(mut self, overrides: OptionsOverride) -> Self {
		self.overrides = overrides;
		self
	}

	/// Fails the backend call with a timeout once `timeout` has elapsed.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.context = self.context.with_timeout(timeout);
		self
	}

	/// Replaces the call context wholesale.
	pub fn context(mut self, context: CallContext) -> Self {
		self.context = context;
		self
	}

	pub fn text(&self) -> &'a str {
		self.text
	}

	pub fn content_type(&self) -> ContentType {
		self.content_type
	}
}

/// Result of [`Coordinator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
	/// Formatted text.
	Text(String),
	/// Check verdict: `true` when the input was already formatted.
	Checked(bool),
}

/// Builder for [`Coordinator`].
pub struct CoordinatorBuilder {
	defaults: OptionsOverride,
	cache: CacheConfig,
	backends: Vec<Arc<dyn Backend>>,
	clock: Arc<dyn Clock>,
	observer: Arc<dyn CacheObserver>,
}

impl Default for CoordinatorBuilder {
	fn default() -> Self {
		Self {
			defaults: OptionsOverride::default(),
			cache: CacheConfig::default(),
			backends: Vec::new(),
			clock: Arc::new(SystemClock),
			observer: Arc::new(NoopObserver),
		}
	}
}

impl CoordinatorBuilder {
	/// Instance-level option defaults.
	pub fn defaults(mut self, defaults: OptionsOverride) -> Self {
		self.defaults = defaults;
		self
	}

	pub fn cache_capacity(mut self, capacity: usize) -> Self {
		self.cache.capacity = capacity;
		self
	}

	pub fn cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
		self
	}

	/// Appends a backend. Earlier backends take precedence for the families they support.
	pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
		self.backends.push(backend);
		self
	}

	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
		self.observer = observer;
		self
	}

	/// Validates the defaults and fixes the routing table.
	pub fn build(self) -> Result<Coordinator> {
		if self.backends.is_empty() {
			return Err(Error::Config("no backends configured".into()));
		}
		OptionsOverride::default().resolve(&self.defaults)?;

		let routes = route_families(&self.backends);
		for family in ContentFamily::ALL {
			match routes.get(&family) {
				Some(&index) => {
					tracing::debug!(%family, backend = %self.backends[index].kind(), "routed content family")
				}
				None => tracing::debug!(%family, "no backend supports content family"),
			}
		}

		let cache = Settings {
			cache: self.cache,
			clock: self.clock,
			observer: self.observer,
		};
		Ok(Coordinator {
			defaults: self.defaults,
			backends: RwLock::new(self.backends),
			routes,
			cache: Mutex::new(cache.new_cache()),
			settings: cache,
		})
	}
}

/// First backend in preference order supporting each family.
fn route_families(backends: &[Arc<dyn Backend>]) -> BTreeMap<ContentFamily, usize> {
	ContentFamily::ALL
		.into_iter()
		.filter_map(|family| {
			let index = backends.iter().position(|b| b.supports(family))?;
			Some((family, index))
		})
		.collect()
}

/// What a derived coordinator needs to build its own cache.
#[derive(Clone)]
struct Settings {
	cache: CacheConfig,
	clock: Arc<dyn Clock>,
	observer: Arc<dyn CacheObserver>,
}

impl Settings {
	fn new_cache(&self) -> FormatCache {
		FormatCache::new(self.cache.capacity, self.cache.ttl())
			.with_clock(Arc::clone(&self.clock))
			.with_observer(Arc::clone(&self.observer))
	}
}

/// A request after option resolution, bound to its backend and cache key.
struct Prepared<'r> {
	text: &'r str,
	content_type: ContentType,
	options: FormatOptions,
	key: CacheKey,
	backend: Arc<dyn Backend>,
	context: &'r CallContext,
}

impl Prepared<'_> {
	fn backend_request(&self) -> FormatRequest<'_> {
		FormatRequest::new(self.text, self.content_type, &self.options)
	}

	fn fail(&self, source: BackendError) -> Error {
		Error::Backend {
			source,
			content_type: self.content_type,
			options: Box::new(self.options.clone()),
		}
	}
}

/// Formats and checks source text through a fixed set of backends, caching results.
///
/// Backends are chosen per content family when the coordinator is built and never re-selected.
/// Formatted results are cached under a key covering the text, the content type, and every
/// resolved option; check calls reuse those entries but never create them.
///
/// The cache lock is never held across an await, but concurrent misses on the same key are not
/// de-duplicated: both callers run the backend and the later result wins.
pub struct Coordinator {
	defaults: OptionsOverride,
	/// Emptied on dispose.
	backends: RwLock<Vec<Arc<dyn Backend>>>,
	routes: BTreeMap<ContentFamily, usize>,
	cache: Mutex<FormatCache>,
	settings: Settings,
}

impl std::fmt::Debug for Coordinator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Coordinator")
			.field("defaults", &self.defaults)
			.field("backends", &*self.backends.read())
			.field("routes", &self.routes)
			.field("cache", &*self.cache.lock())
			.finish()
	}
}

impl Coordinator {
	pub fn builder() -> CoordinatorBuilder {
		CoordinatorBuilder::default()
	}

	/// Builds every configured backend and a coordinator over them.
	pub fn from_config(config: &CoordinatorConfig) -> Result<Self> {
		let mut builder = Self::builder()
			.defaults(config.options.clone())
			.cache_capacity(config.cache.capacity)
			.cache_ttl(config.cache.ttl());
		for backend in &config.backends {
			builder = builder.backend(backend.build()?);
		}
		builder.build()
	}

	/// Derives a coordinator whose defaults are `overrides` layered over this one's.
	///
	/// The new coordinator shares this one's backends (and their loaded plugin instances) but
	/// starts with an empty cache of the same size.
	pub fn with_options(&self, overrides: OptionsOverride) -> Result<Self> {
		let backends = self.backends.read().clone();
		if self.is_disposed() || backends.is_empty() {
			return Err(Error::Disposed);
		}
		let defaults = overrides.over(&self.defaults);
		OptionsOverride::default().resolve(&defaults)?;

		Ok(Self {
			defaults,
			backends: RwLock::new(backends),
			routes: self.routes.clone(),
			cache: Mutex::new(self.settings.new_cache()),
			settings: self.settings.clone(),
		})
	}

	/// Instance-level option defaults.
	pub fn defaults(&self) -> &OptionsOverride {
		&self.defaults
	}

	/// Resolves per-call overrides over this coordinator's defaults.
	pub fn resolve(&self, overrides: &OptionsOverride) -> Result<FormatOptions> {
		Ok(overrides.resolve(&self.defaults)?)
	}

	/// Cache key a request would be stored under.
	pub fn canonical_key(&self, request: &Request<'_>) -> Result<CacheKey> {
		let options = self.resolve(&request.overrides)?;
		Ok(fmtbridge_cache::canonical_key(request.text, request.content_type, &options))
	}

	/// Formats the request, consulting the cache first.
	pub async fn format(&self, request: &Request<'_>) -> Result<String> {
		let call = self.prepare(request)?;
		if let Some(hit) = self.lookup(&call.key)? {
			return Ok(hit);
		}
		let outcome = call
			.backend
			.format(&call.backend_request(), call.context)
			.await
			.map_err(|e| call.fail(e))?;
		self.store(call.key, outcome.into_text(call.text))
	}

	/// Blocking counterpart of [`Coordinator::format`].
	pub fn format_blocking(&self, request: &Request<'_>) -> Result<String> {
		let call = self.prepare(request)?;
		if let Some(hit) = self.lookup(&call.key)? {
			return Ok(hit);
		}
		let outcome = call
			.backend
			.format_blocking(&call.backend_request(), call.context)
			.map_err(|e| call.fail(e))?;
		self.store(call.key, outcome.into_text(call.text))
	}

	/// Returns `true` if the text is already formatted.
	///
	/// A cached format result answers without running the backend. Check verdicts themselves
	/// are not cached.
	pub async fn check(&self, request: &Request<'_>) -> Result<bool> {
		let call = self.prepare(request)?;
		if let Some(hit) = self.lookup(&call.key)? {
			return Ok(hit == call.text);
		}
		call.backend
			.check(&call.backend_request(), call.context)
			.await
			.map_err(|e| call.fail(e))
	}

	/// Blocking counterpart of [`Coordinator::check`].
	pub fn check_blocking(&self, request: &Request<'_>) -> Result<bool> {
		let call = self.prepare(request)?;
		if let Some(hit) = self.lookup(&call.key)? {
			return Ok(hit == call.text);
		}
		call.backend
			.check_blocking(&call.backend_request(), call.context)
			.map_err(|e| call.fail(e))
	}

	/// Formats or checks depending on `mode`.
	pub async fn run(&self, mode: Mode, request: &Request<'_>) -> Result<Output> {
		match mode {
			Mode::Format => self.format(request).await.map(Output::Text),
			Mode::Check => self.check(request).await.map(Output::Checked),
		}
	}

	/// Blocking counterpart of [`Coordinator::run`].
	pub fn run_blocking(&self, mode: Mode, request: &Request<'_>) -> Result<Output> {
		match mode {
			Mode::Format => self.format_blocking(request).map(Output::Text),
			Mode::Check => self.check_blocking(request).map(Output::Checked),
		}
	}

	pub fn cache_stats(&self) -> CacheStats {
		self.cache.lock().stats()
	}

	/// Number of cached entries, including expired ones not yet looked up.
	pub fn cache_len(&self) -> usize {
		self.cache.lock().len()
	}

	/// Releases the cache and, where this coordinator is their last owner, the backends.
	///
	/// Idempotent. Every later call fails with [`Error::Disposed`].
	pub fn dispose(&self) {
		let mut cache = self.cache.lock();
		if cache.is_disposed() {
			return;
		}
		cache.dispose();
		drop(cache);

		let backends = std::mem::take(&mut *self.backends.write());
		for backend in backends {
			if Arc::strong_count(&backend) == 1 {
				tracing::debug!(backend = %backend.kind(), "disposing backend");
				backend.dispose();
			}
		}
	}

	pub fn is_disposed(&self) -> bool {
		self.cache.lock().is_disposed()
	}

	fn prepare<'r>(&self, request: &'r Request<'_>) -> Result<Prepared<'r>> {
		if self.is_disposed() {
			return Err(Error::Disposed);
		}
		let options = self.resolve(&request.overrides)?;
		let key = fmtbridge_cache::canonical_key(request.text, request.content_type, &options);
		let Some(&index) = self.routes.get(&request.content_type.family()) else {
			return Err(Error::Backend {
				source: BackendError::UnsupportedContent(request.content_type),
				content_type: request.content_type,
				options: Box::new(options),
			});
		};
		// Emptied by a concurrent dispose.
		let Some(backend) = self.backends.read().get(index).cloned() else {
			return Err(Error::Disposed);
		};
		Ok(Prepared {
			text: request.text,
			content_type: request.content_type,
			options,
			key,
			backend,
			context: &request.context,
		})
	}

	fn lookup(&self, key: &CacheKey) -> Result<Option<String>> {
		let hit = self.cache.lock().get(key)?;
		match &hit {
			Some(_) => tracing::debug!(key = %key, "cache hit"),
			None => tracing::debug!(key = %key, "cache miss"),
		}
		Ok(hit)
	}

	fn store(&self, key: CacheKey, text: String) -> Result<String> {
		self.cache.lock().set(key, text.clone())?;
		Ok(text)
	}
}
