//! Exported surface of a schema-3 formatter module.

use std::fmt;

use fmtbridge_options::FormatOptions;
use thiserror::Error;

use crate::error::Result;
use crate::{CallContext, FormatOutcome};

/// Schema version this host speaks.
pub const SCHEMA_VERSION: u32 = 3;

/// Status codes shared by the `format()` export and the `host_format` import.
pub const STATUS_UNCHANGED: u32 = 0;
pub const STATUS_CHANGED: u32 = 1;
pub const STATUS_ERROR: u32 = 2;

/// Nullary exports called by the host.
///
/// Exports without a result report `0` through [`ModuleAbi::invoke`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Export {
	/// Consumes the shared bytes as the global configuration JSON.
	SetGlobalConfig,
	/// Consumes the shared bytes as the plugin configuration JSON.
	SetPluginConfig,
	/// Drops previously received configuration.
	ResetConfig,
	/// Consumes the shared bytes as the path of the file being formatted.
	SetFilePath,
	/// Consumes the shared bytes as a per-call configuration override. Optional.
	SetOverrideConfig,
	/// Formats the shared bytes. Returns a status code.
	Format,
	/// Loads the formatted text into the shared bytes and returns its length.
	GetFormattedText,
	/// Loads the error message into the shared bytes and returns its length.
	GetErrorText,
}

impl Export {
	/// Symbol name in the module's export table.
	pub const fn symbol(self) -> &'static str {
		match self {
			Self::SetGlobalConfig => "set_global_config",
			Self::SetPluginConfig => "set_plugin_config",
			Self::ResetConfig => "reset_config",
			Self::SetFilePath => "set_file_path",
			Self::SetOverrideConfig => "set_override_config",
			Self::Format => "format",
			Self::GetFormattedText => "get_formatted_text",
			Self::GetErrorText => "get_error_text",
		}
	}
}

impl fmt::Display for Export {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.symbol())
	}
}

/// Failure crossing the module boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
	/// The module trapped.
	#[error("trap: {0}")]
	Trap(String),
	/// A host read or write fell outside linear memory.
	#[error("memory access out of bounds at {ptr:#x} (+{len})")]
	OutOfBounds { ptr: u32, len: usize },
	/// A required export is absent or has the wrong signature.
	#[error("missing export `{0}`")]
	MissingExport(&'static str),
}

/// Result type for raw ABI calls.
pub type AbiResult<T> = std::result::Result<T, AbiError>;

/// Low-level calls into one module instance.
///
/// The string protocol layered on top lives in [`super::PluginInstance`]; implementors only move
/// integers and bytes.
pub trait ModuleAbi: Send {
	/// `get_wasm_memory_buffer`: address of the transfer buffer.
	fn buffer_ptr(&mut self) -> AbiResult<u32>;

	/// `get_wasm_memory_buffer_size`: capacity of the transfer buffer in bytes.
	fn buffer_size(&mut self) -> AbiResult<u32>;

	/// `clear_shared_bytes(len)`: starts a transfer of `len` bytes.
	fn clear_shared_bytes(&mut self, len: u32) -> AbiResult<()>;

	/// `add_to_shared_bytes_from_buffer(len)`: appends the first `len` buffer bytes.
	fn add_to_shared_bytes_from_buffer(&mut self, len: u32) -> AbiResult<()>;

	/// `set_buffer_with_shared_bytes(offset, len)`: copies shared bytes into the buffer.
	fn set_buffer_with_shared_bytes(&mut self, offset: u32, len: u32) -> AbiResult<()>;

	/// Copies linear memory at `ptr` into `buf`.
	fn read_memory(&mut self, ptr: u32, buf: &mut [u8]) -> AbiResult<()>;

	/// Copies `bytes` into linear memory at `ptr`.
	fn write_memory(&mut self, ptr: u32, bytes: &[u8]) -> AbiResult<()>;

	/// Calls a nullary export.
	fn invoke(&mut self, export: Export) -> AbiResult<u32>;

	/// Whether the module exports `export`.
	fn exports(&mut self, export: Export) -> bool;

	/// Called before a format sequence; host imports answer for this call until
	/// [`ModuleAbi::end_call`].
	fn begin_call(&mut self, _options: &FormatOptions, _ctx: &CallContext) {}

	fn end_call(&mut self) {}
}

/// Formats text a module hands back to the host through `host_format`, such as a code block
/// inside a markdown document.
pub trait EmbeddedFormatter: Send + Sync {
	/// `path` is the file path hint the module set (`file.ts` for a `ts` fence), and
	/// `override_config` the JSON object it attached, if any.
	fn format_embedded(
		&self,
		path: &str,
		text: &str,
		override_config: Option<&str>,
		options: &FormatOptions,
		ctx: &CallContext,
	) -> Result<FormatOutcome>;
}
