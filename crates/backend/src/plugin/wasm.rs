//! [`ModuleAbi`] over a wasmtime instance.

use std::sync::Arc;

use fmtbridge_options::FormatOptions;
use wasmtime::{
	Caller, Engine, Extern, ExternType, Func, Instance, Linker, Memory, Module, Store, Val, ValType,
};

use super::abi::{
	AbiError, AbiResult, EmbeddedFormatter, Export, ModuleAbi, SCHEMA_VERSION, STATUS_CHANGED, STATUS_ERROR,
	STATUS_UNCHANGED,
};
use crate::error::{BackendError, Result};
use crate::{CallContext, FormatOutcome};

/// Host import module expected by schema-3 plugins.
const HOST_MODULE: &str = "dprint";

/// Export present only in schema-4 plugins.
const SCHEMA_4_MARKER: &str = "dprint_plugin_version_4";

/// Host imports backed by [`HostState`]. Other `dprint` imports answer zero.
const HOST_FUNCTIONS: [&str; 9] = [
	"host_clear_bytes",
	"host_read_buffer",
	"host_write_buffer",
	"host_take_file_path",
	"host_take_override_config",
	"host_format",
	"host_get_formatted_text",
	"host_get_error_text",
	"host_has_cancelled",
];

/// Host side of the module's calls back into the host.
#[derive(Default)]
struct HostState {
	/// Bytes moved by `host_read_buffer`/`host_write_buffer`.
	shared: Vec<u8>,
	file_path: Option<String>,
	override_config: Option<String>,
	formatted: Vec<u8>,
	error: Vec<u8>,
	embedded: Option<Arc<dyn EmbeddedFormatter>>,
	/// Options and context of the format call in progress.
	call: Option<(FormatOptions, CallContext)>,
}

impl HostState {
	fn clear_transfer(&mut self) {
		self.shared.clear();
		self.file_path = None;
		self.override_config = None;
		self.formatted.clear();
		self.error.clear();
	}

	fn take_shared_string(&mut self) -> String {
		let bytes = std::mem::take(&mut self.shared);
		String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
	}

	fn cancelled(&self) -> bool {
		self.call.as_ref().is_some_and(|(_, ctx)| ctx.checkpoint().is_err())
	}

	/// `host_format`: hands the shared bytes to the embedded formatter.
	fn format(&mut self) -> u32 {
		let text = std::mem::take(&mut self.shared);
		let path = self.file_path.take().unwrap_or_default();
		let override_config = self.override_config.take();
		let (Some(embedded), Some((options, ctx))) = (self.embedded.clone(), self.call.clone()) else {
			return STATUS_UNCHANGED;
		};

		let result = match String::from_utf8(text) {
			Ok(text) => embedded.format_embedded(&path, &text, override_config.as_deref(), &options, &ctx),
			Err(_) => Err(BackendError::ProtocolViolation(format!(
				"embedded text for `{path}` is not UTF-8"
			))),
		};
		tracing::trace!(%path, ok = result.is_ok(), "embedded format");
		match result {
			Ok(FormatOutcome::Unchanged) => STATUS_UNCHANGED,
			Ok(FormatOutcome::Formatted(text)) => {
				self.formatted = text.into_bytes();
				STATUS_CHANGED
			}
			Err(err) => {
				self.error = err.to_string().into_bytes();
				STATUS_ERROR
			}
		}
	}
}

/// A compiled, instantiated, schema-checked formatter module.
pub struct WasmModule {
	store: Store<HostState>,
	instance: Instance,
	memory: Memory,
}

impl std::fmt::Debug for WasmModule {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WasmModule")
			.field("embedded", &self.store.data().embedded.is_some())
			.finish_non_exhaustive()
	}
}

impl WasmModule {
	/// Compiles and instantiates `bytes`, then verifies the schema version.
	///
	/// The schema-3 host functions are served from the store's [`HostState`]; `host_format`
	/// answers "unchanged" until a formatter is attached with [`WasmModule::with_embedded`].
	/// Other `dprint` imports return zero and any other import is linked as a trap.
	pub fn instantiate(engine: &Engine, bytes: &[u8], plugin: &str) -> Result<Self> {
		let load_err = |reason: String| BackendError::ModuleLoad {
			plugin: plugin.to_owned(),
			reason,
		};

		let module = Module::new(engine, bytes).map_err(|e| load_err(format!("{e:#}")))?;
		let mut linker: Linker<HostState> = Linker::new(engine);
		link_host_functions(&mut linker).map_err(|e| load_err(format!("{e:#}")))?;
		for import in module.imports() {
			if import.module() != HOST_MODULE || HOST_FUNCTIONS.contains(&import.name()) {
				continue;
			}
			let ExternType::Func(ty) = import.ty() else {
				continue;
			};
			let Some(zeros) = ty.results().map(|t| Zero::of(&t)).collect::<Option<Vec<Zero>>>() else {
				continue;
			};
			linker
				.func_new(HOST_MODULE, import.name(), ty.clone(), move |_caller, _params, results| {
					for (slot, zero) in results.iter_mut().zip(&zeros) {
						*slot = zero.val();
					}
					Ok(())
				})
				.map_err(|e| load_err(format!("{e:#}")))?;
		}
		linker
			.define_unknown_imports_as_traps(&module)
			.map_err(|e| load_err(format!("{e:#}")))?;

		let mut store = Store::new(engine, HostState::default());
		let instance = linker
			.instantiate(&mut store, &module)
			.map_err(|e| load_err(format!("{e:#}")))?;

		let incompatible = |reason: String| BackendError::ModuleIncompatible {
			plugin: plugin.to_owned(),
			reason,
		};
		let version = match instance.get_typed_func::<(), u32>(&mut store, "get_plugin_schema_version") {
			Ok(func) => func
				.call(&mut store, ())
				.map_err(|e| load_err(format!("get_plugin_schema_version trapped: {e:#}")))?,
			Err(_) if instance.get_export(&mut store, SCHEMA_4_MARKER).is_some() => 4,
			Err(_) => return Err(incompatible("no schema version export".into())),
		};
		if version != SCHEMA_VERSION {
			return Err(incompatible(format!(
				"schema version {version}, host supports {SCHEMA_VERSION}"
			)));
		}

		let memory = instance
			.get_memory(&mut store, "memory")
			.ok_or_else(|| incompatible("no exported memory".into()))?;

		tracing::debug!(plugin, version, "plugin module instantiated");
		Ok(Self { store, instance, memory })
	}

	/// Routes the module's `host_format` calls to `formatter`.
	pub fn with_embedded(mut self, formatter: Arc<dyn EmbeddedFormatter>) -> Self {
		self.store.data_mut().embedded = Some(formatter);
		self
	}

	fn func(&mut self, name: &'static str) -> AbiResult<Func> {
		self.instance
			.get_func(&mut self.store, name)
			.ok_or(AbiError::MissingExport(name))
	}

	fn call(&mut self, name: &'static str, params: &[Val]) -> AbiResult<u32> {
		let func = self.func(name)?;
		let ty = func.ty(&self.store);
		if ty.params().len() != params.len() {
			return Err(AbiError::MissingExport(name));
		}
		let mut results: Vec<Val> = ty.results().map(|_| Val::I32(0)).collect();
		func.call(&mut self.store, params, &mut results)
			.map_err(|e| AbiError::Trap(format!("{name}: {e:#}")))?;
		Ok(match results.first() {
			Some(Val::I32(v)) => *v as u32,
			Some(Val::I64(v)) => *v as u32,
			_ => 0,
		})
	}
}

impl ModuleAbi for WasmModule {
	fn buffer_ptr(&mut self) -> AbiResult<u32> {
		self.call("get_wasm_memory_buffer", &[])
	}

	fn buffer_size(&mut self) -> AbiResult<u32> {
		self.call("get_wasm_memory_buffer_size", &[])
	}

	fn clear_shared_bytes(&mut self, len: u32) -> AbiResult<()> {
		self.call("clear_shared_bytes", &[Val::I32(len as i32)]).map(drop)
	}

	fn add_to_shared_bytes_from_buffer(&mut self, len: u32) -> AbiResult<()> {
		self.call("add_to_shared_bytes_from_buffer", &[Val::I32(len as i32)]).map(drop)
	}

	fn set_buffer_with_shared_bytes(&mut self, offset: u32, len: u32) -> AbiResult<()> {
		self.call("set_buffer_with_shared_bytes", &[Val::I32(offset as i32), Val::I32(len as i32)])
			.map(drop)
	}

	fn read_memory(&mut self, ptr: u32, buf: &mut [u8]) -> AbiResult<()> {
		self.memory
			.read(&self.store, ptr as usize, buf)
			.map_err(|_| AbiError::OutOfBounds { ptr, len: buf.len() })
	}

	fn write_memory(&mut self, ptr: u32, bytes: &[u8]) -> AbiResult<()> {
		self.memory
			.write(&mut self.store, ptr as usize, bytes)
			.map_err(|_| AbiError::OutOfBounds { ptr, len: bytes.len() })
	}

	fn invoke(&mut self, export: Export) -> AbiResult<u32> {
		self.call(export.symbol(), &[])
	}

	fn exports(&mut self, export: Export) -> bool {
		self.instance.get_func(&mut self.store, export.symbol()).is_some()
	}

	fn begin_call(&mut self, options: &FormatOptions, ctx: &CallContext) {
		let state = self.store.data_mut();
		state.clear_transfer();
		state.call = Some((options.clone(), ctx.clone()));
	}

	fn end_call(&mut self) {
		let state = self.store.data_mut();
		state.clear_transfer();
		state.call = None;
	}
}

fn link_host_functions(linker: &mut Linker<HostState>) -> wasmtime::Result<()> {
	linker.func_wrap(HOST_MODULE, "host_clear_bytes", |mut caller: Caller<'_, HostState>, len: u32| {
		caller.data_mut().shared = Vec::with_capacity(len as usize);
	})?;
	linker.func_wrap(
		HOST_MODULE,
		"host_read_buffer",
		|mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> wasmtime::Result<()> {
			let memory = caller_memory(&mut caller)?;
			let (data, state) = memory.data_and_store_mut(&mut caller);
			let bytes = data
				.get(ptr as usize..ptr as usize + len as usize)
				.ok_or_else(|| out_of_bounds(ptr, len))?;
			state.shared.extend_from_slice(bytes);
			Ok(())
		},
	)?;
	linker.func_wrap(
		HOST_MODULE,
		"host_write_buffer",
		|mut caller: Caller<'_, HostState>, ptr: u32, offset: u32, len: u32| -> wasmtime::Result<()> {
			let memory = caller_memory(&mut caller)?;
			let (data, state) = memory.data_and_store_mut(&mut caller);
			let src = state
				.shared
				.get(offset as usize..offset as usize + len as usize)
				.ok_or_else(|| wasmtime::Error::msg(format!("shared bytes hold no range {offset}+{len}")))?;
			let dst = data
				.get_mut(ptr as usize..ptr as usize + len as usize)
				.ok_or_else(|| out_of_bounds(ptr, len))?;
			dst.copy_from_slice(src);
			Ok(())
		},
	)?;
	linker.func_wrap(HOST_MODULE, "host_take_file_path", |mut caller: Caller<'_, HostState>| {
		let state = caller.data_mut();
		state.file_path = Some(state.take_shared_string());
	})?;
	linker.func_wrap(HOST_MODULE, "host_take_override_config", |mut caller: Caller<'_, HostState>| {
		let state = caller.data_mut();
		state.override_config = Some(state.take_shared_string());
	})?;
	linker.func_wrap(HOST_MODULE, "host_format", |mut caller: Caller<'_, HostState>| -> u32 {
		caller.data_mut().format()
	})?;
	linker.func_wrap(HOST_MODULE, "host_get_formatted_text", |mut caller: Caller<'_, HostState>| -> u32 {
		let state = caller.data_mut();
		state.shared = std::mem::take(&mut state.formatted);
		state.shared.len() as u32
	})?;
	linker.func_wrap(HOST_MODULE, "host_get_error_text", |mut caller: Caller<'_, HostState>| -> u32 {
		let state = caller.data_mut();
		state.shared = std::mem::take(&mut state.error);
		state.shared.len() as u32
	})?;
	linker.func_wrap(HOST_MODULE, "host_has_cancelled", |caller: Caller<'_, HostState>| -> i32 {
		i32::from(caller.data().cancelled())
	})?;
	Ok(())
}

fn caller_memory(caller: &mut Caller<'_, HostState>) -> wasmtime::Result<Memory> {
	caller
		.get_export("memory")
		.and_then(Extern::into_memory)
		.ok_or_else(|| wasmtime::Error::msg("module exports no memory"))
}

fn out_of_bounds(ptr: u32, len: u32) -> wasmtime::Error {
	wasmtime::Error::msg(AbiError::OutOfBounds { ptr, len: len as usize }.to_string())
}

/// Numeric result a host stub fills with zero.
#[derive(Clone, Copy)]
enum Zero {
	I32,
	I64,
	F32,
	F64,
}

impl Zero {
	fn of(ty: &ValType) -> Option<Self> {
		match ty {
			ValType::I32 => Some(Self::I32),
			ValType::I64 => Some(Self::I64),
			ValType::F32 => Some(Self::F32),
			ValType::F64 => Some(Self::F64),
			_ => None,
		}
	}

	fn val(self) -> Val {
		match self {
			Self::I32 => Val::I32(0),
			Self::I64 => Val::I64(0),
			Self::F32 => Val::F32(0),
			Self::F64 => Val::F64(0),
		}
	}
}

#[cfg(test)]
mod tests {
	use fmtbridge_options::{ContentFamily, ContentType, FormatOptions};
	use parking_lot::Mutex;

	use super::*;
	use crate::FormatRequest;
	use crate::plugin::PluginInstance;

	/// Minimal schema-3 module. Shared bytes live at 2048, the 16-byte transfer buffer at 1024.
	fn plugin_wat(format_body: &str) -> String {
		format!(
			r#"(module
	(import "dprint" "host_has_cancelled" (func $cancelled (result i32)))
	(import "env" "unexpected" (func $unexpected))
	(memory (export "memory") 1)
	(global $len (mut i32) (i32.const 0))
	(func (export "get_plugin_schema_version") (result i32) i32.const 3)
	(func (export "get_wasm_memory_buffer") (result i32) i32.const 1024)
	(func (export "get_wasm_memory_buffer_size") (result i32) i32.const 16)
	(func (export "clear_shared_bytes") (param i32) i32.const 0 global.set $len)
	(func (export "add_to_shared_bytes_from_buffer") (param $n i32)
		(memory.copy (i32.add (i32.const 2048) (global.get $len)) (i32.const 1024) (local.get $n))
		(global.set $len (i32.add (global.get $len) (local.get $n))))
	(func (export "set_buffer_with_shared_bytes") (param $off i32) (param $n i32)
		(memory.copy (i32.const 1024) (i32.add (i32.const 2048) (local.get $off)) (local.get $n)))
	(func (export "set_global_config"))
	(func (export "set_plugin_config"))
	(func (export "reset_config"))
	(func (export "set_file_path"))
	(func (export "format") (result i32) {format_body})
	(func (export "get_formatted_text") (result i32) global.get $len)
	(func (export "get_error_text") (result i32) global.get $len))"#
		)
	}

	/// Appends a newline to the input and reports a change.
	const APPEND_NEWLINE: &str = r#"
		(drop (call $cancelled))
		(i32.store8 (i32.add (i32.const 2048) (global.get $len)) (i32.const 10))
		(global.set $len (i32.add (global.get $len) (i32.const 1)))
		i32.const 1"#;

	fn instance(wat: &str) -> PluginInstance<WasmModule> {
		let module = WasmModule::instantiate(&Engine::default(), wat.as_bytes(), "test").unwrap();
		PluginInstance::new(module, "test", ContentFamily::Script)
	}

	#[test]
	fn round_trips_text_through_linear_memory() {
		let mut plugin = instance(&plugin_wat(APPEND_NEWLINE));
		let options = FormatOptions::default();
		let text = "const answer = 42; // longer than one transfer buffer";
		let req = FormatRequest::new(text, ContentType::TypeScript, &options);

		let outcome = plugin.format(&req, &CallContext::new()).unwrap();
		assert_eq!(outcome, FormatOutcome::Formatted(format!("{text}\n")));
		assert!(plugin.config_set());
	}

	#[test]
	fn status_zero_is_unchanged() {
		let mut plugin = instance(&plugin_wat("i32.const 0"));
		let options = FormatOptions::default();
		let req = FormatRequest::new("x", ContentType::TypeScript, &options);
		assert_eq!(plugin.format(&req, &CallContext::new()).unwrap(), FormatOutcome::Unchanged);
	}

	#[test]
	fn trap_in_format_is_a_module_trap() {
		let mut plugin = instance(&plugin_wat("unreachable"));
		let options = FormatOptions::default();
		let req = FormatRequest::new("x", ContentType::TypeScript, &options);
		let err = plugin.format(&req, &CallContext::new()).unwrap_err();
		assert!(matches!(err, BackendError::ModuleTrap { .. }), "{err:?}");
	}

	#[test]
	fn other_schema_versions_are_incompatible() {
		let engine = Engine::default();
		let v4 = r#"(module (func (export "get_plugin_schema_version") (result i32) i32.const 4))"#;
		let marker = r#"(module (func (export "dprint_plugin_version_4") (result i32) i32.const 4))"#;
		let bare = r#"(module)"#;

		for wat in [v4, marker, bare] {
			let err = WasmModule::instantiate(&engine, wat.as_bytes(), "test").unwrap_err();
			assert!(matches!(err, BackendError::ModuleIncompatible { .. }), "{err:?}");
		}
	}

	#[test]
	fn garbage_bytes_fail_to_load() {
		let err = WasmModule::instantiate(&Engine::default(), b"\0asm\x7f", "test").unwrap_err();
		assert!(matches!(err, BackendError::ModuleLoad { .. }), "{err:?}");
	}

	#[test]
	fn live_call_is_not_cancelled() {
		let wat = plugin_wat("call $cancelled");
		let mut plugin = instance(&wat);
		let options = FormatOptions::default();
		let req = FormatRequest::new("x", ContentType::TypeScript, &options);
		assert_eq!(plugin.format(&req, &CallContext::new()).unwrap(), FormatOutcome::Unchanged);
	}

	#[test]
	fn unknown_imports_trap_when_called() {
		let wat = plugin_wat("call $unexpected i32.const 0");
		let mut plugin = instance(&wat);
		let options = FormatOptions::default();
		let req = FormatRequest::new("x", ContentType::TypeScript, &options);
		let err = plugin.format(&req, &CallContext::new()).unwrap_err();
		assert!(matches!(err, BackendError::ModuleTrap { .. }), "{err:?}");
	}

	const EMBEDDING: &str = include_str!("testdata/embedding.wat");

	/// Upper-cases embedded text and records what it was asked to format.
	#[derive(Default)]
	struct Shouting {
		seen: Mutex<Vec<(String, String, u32)>>,
	}

	impl EmbeddedFormatter for Shouting {
		fn format_embedded(
			&self,
			path: &str,
			text: &str,
			_override_config: Option<&str>,
			options: &FormatOptions,
			_ctx: &CallContext,
		) -> Result<FormatOutcome> {
			self.seen.lock().push((path.to_owned(), text.to_owned(), options.line_width));
			if text.contains("fail") {
				return Err(BackendError::Plugin {
					plugin: "inner".into(),
					message: "bad block".into(),
				});
			}
			Ok(FormatOutcome::Formatted(text.to_uppercase()))
		}
	}

	fn embedding_instance(formatter: Arc<Shouting>) -> PluginInstance<WasmModule> {
		let module = WasmModule::instantiate(&Engine::default(), EMBEDDING.as_bytes(), "markup")
			.unwrap()
			.with_embedded(formatter);
		PluginInstance::new(module, "markup", ContentFamily::Markup)
	}

	#[test]
	fn host_format_routes_to_the_embedded_formatter() {
		let formatter = Arc::new(Shouting::default());
		let mut plugin = embedding_instance(formatter.clone());
		let options = FormatOptions {
			line_width: 60,
			..FormatOptions::default()
		};
		let req = FormatRequest::new("{\"a\":1}", ContentType::Markdown, &options);

		let outcome = plugin.format(&req, &CallContext::new()).unwrap();
		assert_eq!(outcome, FormatOutcome::Formatted("{\"A\":1}".into()));
		assert_eq!(
			formatter.seen.lock().as_slice(),
			[("file.json".to_owned(), "{\"a\":1}".to_owned(), 60)]
		);
	}

	#[test]
	fn embedded_failure_reaches_the_module_as_error_text() {
		let mut plugin = embedding_instance(Arc::new(Shouting::default()));
		let options = FormatOptions::default();
		let req = FormatRequest::new("fail", ContentType::Markdown, &options);

		let err = plugin.format(&req, &CallContext::new()).unwrap_err();
		let BackendError::Plugin { plugin, message } = err else {
			panic!("unexpected error: {err:?}");
		};
		assert_eq!(plugin, "markup");
		assert!(message.contains("bad block"), "{message}");
	}

	#[test]
	fn host_format_without_a_formatter_is_unchanged() {
		let module = WasmModule::instantiate(&Engine::default(), EMBEDDING.as_bytes(), "markup").unwrap();
		let mut plugin = PluginInstance::new(module, "markup", ContentFamily::Markup);
		let options = FormatOptions::default();
		let req = FormatRequest::new("{}", ContentType::Markdown, &options);
		assert_eq!(plugin.format(&req, &CallContext::new()).unwrap(), FormatOutcome::Unchanged);
	}
}
