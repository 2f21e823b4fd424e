//! Serialization of a normalized option set into plugin configuration objects.
//!
//! Plugins receive two objects during their configuration handshake: the global object shared
//! by every family and a family-specific object. Per-call overrides use the union of both.
//!
//! Every family object turns on the plugins' `deno` preset, which is what the external formatter
//! applies, so both backends produce the same text for the same options.

use serde_json::{Map, Value, json};

use crate::content::ContentFamily;
use crate::options::{FormatOptions, ProseWrap};

/// Line ending emitted by every plugin. The external formatter has no flag for it and always
/// writes `\n`, so plugins are pinned to match.
pub const NEW_LINE_KIND: &str = "lf";

/// Global configuration object shared by all plugin families.
pub fn global_config(options: &FormatOptions) -> Map<String, Value> {
	let mut map = Map::new();
	map.insert("lineWidth".into(), json!(options.line_width));
	map.insert("indentWidth".into(), json!(options.indent_width));
	map.insert("useTabs".into(), json!(options.use_tabs));
	map.insert("newLineKind".into(), json!(NEW_LINE_KIND));
	map
}

/// Family-specific configuration object.
pub fn family_config(family: ContentFamily, options: &FormatOptions) -> Map<String, Value> {
	let mut map = Map::new();
	map.insert("deno".into(), json!(true));
	match family {
		ContentFamily::Script => {
			let quote_style = if options.single_quote { "preferSingle" } else { "preferDouble" };
			let semi_colons = if options.semicolons { "prefer" } else { "asi" };
			map.insert("quoteStyle".into(), json!(quote_style));
			map.insert("semiColons".into(), json!(semi_colons));
		}
		ContentFamily::Data => {}
		ContentFamily::Markup => {
			let text_wrap = match options.prose_wrap {
				ProseWrap::Always => "always",
				ProseWrap::Never => "never",
				ProseWrap::Preserve => "maintain",
			};
			map.insert("textWrap".into(), json!(text_wrap));
		}
	}
	map
}

/// Per-call override object: the global object with the family object layered over it.
pub fn override_config(family: ContentFamily, options: &FormatOptions) -> Map<String, Value> {
	let mut map = global_config(options);
	map.extend(family_config(family, options));
	map
}

/// Applies the layout keys of an override object received from a plugin (a markup module asking
/// the host to format an embedded code block). Unknown keys are ignored; an override that would
/// produce invalid options is dropped.
pub fn apply_override(options: &FormatOptions, config: &Map<String, Value>) -> FormatOptions {
	let mut applied = options.clone();
	if let Some(width) = config.get("lineWidth").and_then(Value::as_u64).and_then(|n| u32::try_from(n).ok()) {
		applied.line_width = width;
	}
	if let Some(width) = config.get("indentWidth").and_then(Value::as_u64).and_then(|n| u8::try_from(n).ok()) {
		applied.indent_width = width;
	}
	if let Some(use_tabs) = config.get("useTabs").and_then(Value::as_bool) {
		applied.use_tabs = use_tabs;
	}
	if applied.validate().is_ok() { applied } else { options.clone() }
}
