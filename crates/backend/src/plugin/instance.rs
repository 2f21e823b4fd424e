//! String marshaling and the call sequence on top of [`ModuleAbi`].

use fmtbridge_options::{ContentFamily, FormatOptions, plugin_config};
use serde_json::{Map, Value};

use super::abi::{AbiError, Export, ModuleAbi, STATUS_CHANGED, STATUS_ERROR, STATUS_UNCHANGED};
use crate::error::{BackendError, Result};
use crate::{CallContext, FormatOutcome, FormatRequest};

/// One live module instance serving one content family.
///
/// Configuration is sent once per instance (the handshake) and tracked by `config_set`. When the
/// module exports `set_override_config`, per-call options travel as an override and the
/// handshake is never repeated; otherwise an options change resets the configuration and
/// repeats the handshake.
#[derive(Debug)]
pub struct PluginInstance<A> {
	abi: A,
	plugin: String,
	family: ContentFamily,
	/// Transfer buffer `(ptr, size)`, read once.
	buffer: Option<(u32, u32)>,
	config_set: bool,
	configured_with: Option<FormatOptions>,
}

impl<A: ModuleAbi> PluginInstance<A> {
	pub fn new(abi: A, plugin: impl Into<String>, family: ContentFamily) -> Self {
		Self {
			abi,
			plugin: plugin.into(),
			family,
			buffer: None,
			config_set: false,
			configured_with: None,
		}
	}

	pub fn plugin(&self) -> &str {
		&self.plugin
	}

	/// The underlying module.
	pub fn abi(&self) -> &A {
		&self.abi
	}

	/// Whether the configuration handshake has completed.
	pub fn config_set(&self) -> bool {
		self.config_set
	}

	/// Drops the module's configuration; the next call repeats the handshake.
	pub fn reset_config(&mut self) -> Result<()> {
		if self.config_set {
			self.call(Export::ResetConfig)?;
		}
		self.config_set = false;
		self.configured_with = None;
		Ok(())
	}

	/// Formats one request.
	pub fn format(&mut self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<FormatOutcome> {
		ctx.checkpoint()?;
		self.abi.begin_call(request.options, ctx);
		let result = self.run_format(request, ctx);
		self.abi.end_call();
		result
	}

	fn run_format(&mut self, request: &FormatRequest<'_>, ctx: &CallContext) -> Result<FormatOutcome> {
		let has_override = self.abi.exports(Export::SetOverrideConfig);
		self.configure(request.options, has_override)?;

		if has_override {
			let config = plugin_config::override_config(self.family, request.options);
			self.send_json(&config)?;
			self.call(Export::SetOverrideConfig)?;
		}

		let path = format!("file.{}", request.content_type.extension());
		self.send_string(&path)?;
		self.call(Export::SetFilePath)?;

		self.send_string(request.text)?;
		ctx.checkpoint()?;

		let status = self.call(Export::Format)?;
		tracing::trace!(plugin = %self.plugin, status, "plugin format returned");
		match status {
			STATUS_UNCHANGED => Ok(FormatOutcome::Unchanged),
			STATUS_CHANGED => {
				let len = self.call(Export::GetFormattedText)?;
				let text = self.receive_string(len)?;
				if text == request.text {
					Ok(FormatOutcome::Unchanged)
				} else {
					Ok(FormatOutcome::Formatted(text))
				}
			}
			STATUS_ERROR => {
				let len = self.call(Export::GetErrorText)?;
				let message = self.receive_string(len)?;
				Err(BackendError::Plugin {
					plugin: self.plugin.clone(),
					message,
				})
			}
			other => Err(BackendError::ProtocolViolation(format!(
				"`{}` format() returned undocumented status {other}",
				self.plugin
			))),
		}
	}

	fn configure(&mut self, options: &FormatOptions, has_override: bool) -> Result<()> {
		if self.config_set {
			if has_override || self.configured_with.as_ref() == Some(options) {
				return Ok(());
			}
			tracing::debug!(plugin = %self.plugin, "options changed, resetting plugin config");
			self.reset_config()?;
		}

		self.send_json(&plugin_config::global_config(options))?;
		self.call(Export::SetGlobalConfig)?;
		self.send_json(&plugin_config::family_config(self.family, options))?;
		self.call(Export::SetPluginConfig)?;

		self.config_set = true;
		self.configured_with = Some(options.clone());
		tracing::debug!(plugin = %self.plugin, "plugin configured");
		Ok(())
	}

	fn call(&mut self, export: Export) -> Result<u32> {
		let result = self.abi.invoke(export);
		result.map_err(|e| self.abi_error(e))
	}

	fn transfer_buffer(&mut self) -> Result<(u32, u32)> {
		if let Some(buffer) = self.buffer {
			return Ok(buffer);
		}
		let ptr = self.abi.buffer_ptr().map_err(|e| self.abi_error(e))?;
		let size = self.abi.buffer_size().map_err(|e| self.abi_error(e))?;
		if size == 0 {
			return Err(BackendError::ProtocolViolation(format!(
				"`{}` reports a zero-sized transfer buffer",
				self.plugin
			)));
		}
		self.buffer = Some((ptr, size));
		Ok((ptr, size))
	}

	fn send_json(&mut self, config: &Map<String, Value>) -> Result<()> {
		let json = Value::Object(config.clone()).to_string();
		self.send_string(&json)
	}

	/// Moves `text` into the module's shared bytes, one buffer-sized chunk at a time.
	fn send_string(&mut self, text: &str) -> Result<()> {
		let bytes = text.as_bytes();
		let len = u32::try_from(bytes.len())
			.map_err(|_| BackendError::ProtocolViolation(format!("{} bytes exceed the 32-bit address space", bytes.len())))?;
		let (ptr, size) = self.transfer_buffer()?;

		self.abi.clear_shared_bytes(len).map_err(|e| self.abi_error(e))?;
		for chunk in bytes.chunks(size as usize) {
			self.abi.write_memory(ptr, chunk).map_err(|e| self.abi_error(e))?;
			self.abi
				.add_to_shared_bytes_from_buffer(chunk.len() as u32)
				.map_err(|e| self.abi_error(e))?;
		}
		Ok(())
	}

	/// Reads `len` shared bytes back out of the module.
	fn receive_string(&mut self, len: u32) -> Result<String> {
		let (ptr, size) = self.transfer_buffer()?;
		let mut out = Vec::with_capacity(len as usize);
		let mut offset = 0u32;
		while offset < len {
			let n = size.min(len - offset);
			self.abi
				.set_buffer_with_shared_bytes(offset, n)
				.map_err(|e| self.abi_error(e))?;
			let start = out.len();
			out.resize(start + n as usize, 0);
			self.abi
				.read_memory(ptr, &mut out[start..])
				.map_err(|e| self.abi_error(e))?;
			offset += n;
		}
		String::from_utf8(out).map_err(|_| {
			BackendError::ProtocolViolation(format!("`{}` returned text that is not UTF-8", self.plugin))
		})
	}

	fn abi_error(&self, err: AbiError) -> BackendError {
		match err {
			AbiError::Trap(reason) => BackendError::ModuleTrap {
				plugin: self.plugin.clone(),
				reason,
			},
			other => BackendError::ProtocolViolation(format!("`{}`: {other}", self.plugin)),
		}
	}
}
