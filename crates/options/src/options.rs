//! Normalized option set and the override layers merged over it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OptionsError, Result};

/// Accepted range for [`FormatOptions::line_width`].
pub const LINE_WIDTH_RANGE: (u32, u32) = (1, 1000);

/// Accepted range for [`FormatOptions::indent_width`].
pub const INDENT_WIDTH_RANGE: (u8, u8) = (1, 16);

/// How markup prose is wrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProseWrap {
	/// Wrap prose at the line width.
	#[default]
	Always,
	/// Unwrap prose onto a single line per paragraph.
	Never,
	/// Keep the author's line breaks.
	Preserve,
}

impl ProseWrap {
	/// Flag spelling of the mode.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Always => "always",
			Self::Never => "never",
			Self::Preserve => "preserve",
		}
	}
}

impl fmt::Display for ProseWrap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ProseWrap {
	type Err = OptionsError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"always" => Ok(Self::Always),
			"never" => Ok(Self::Never),
			"preserve" => Ok(Self::Preserve),
			other => Err(OptionsError::InvalidProseWrap(other.to_string())),
		}
	}
}

/// Fully resolved formatting options.
///
/// Every field is present and validated. Instances are produced by [`OptionsOverride::resolve`]
/// (or [`Default`] for the global defaults) and are never partially filled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOptions {
	/// Maximum line width.
	pub line_width: u32,
	/// Number of columns per indentation level.
	pub indent_width: u8,
	/// Indent with tabs instead of spaces.
	pub use_tabs: bool,
	/// Prefer single quotes in script sources.
	pub single_quote: bool,
	/// Prose wrapping for markup sources.
	pub prose_wrap: ProseWrap,
	/// Emit statement-terminating semicolons in script sources.
	#[serde(rename = "semiColons")]
	pub semicolons: bool,
	/// Glob patterns the external formatter skips.
	pub ignore: Vec<String>,
}

impl Default for FormatOptions {
	fn default() -> Self {
		Self {
			line_width: 80,
			indent_width: 2,
			use_tabs: false,
			single_quote: false,
			prose_wrap: ProseWrap::Always,
			semicolons: true,
			ignore: Vec::new(),
		}
	}
}

impl FormatOptions {
	/// Checks every field against its accepted range.
	pub fn validate(&self) -> Result<()> {
		let (min, max) = LINE_WIDTH_RANGE;
		if !(min..=max).contains(&self.line_width) {
			return Err(OptionsError::OutOfRange {
				name: "lineWidth",
				value: self.line_width.into(),
				min: min.into(),
				max: max.into(),
			});
		}

		let (min, max) = INDENT_WIDTH_RANGE;
		if !(min..=max).contains(&self.indent_width) {
			return Err(OptionsError::OutOfRange {
				name: "indentWidth",
				value: self.indent_width.into(),
				min: min.into(),
				max: max.into(),
			});
		}

		for entry in &self.ignore {
			if entry.is_empty() {
				return Err(OptionsError::InvalidEntry {
					name: "ignore",
					entry: entry.clone(),
					reason: "entries may not be empty",
				});
			}
			// The flag form joins entries with commas.
			if entry.contains(',') {
				return Err(OptionsError::InvalidEntry {
					name: "ignore",
					entry: entry.clone(),
					reason: "entries may not contain commas",
				});
			}
		}

		Ok(())
	}
}

impl fmt::Display for FormatOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match serde_json::to_string(self) {
			Ok(json) => f.write_str(&json),
			Err(_) => write!(f, "{self:?}"),
		}
	}
}

/// Sparse option layer.
///
/// Unset fields fall through to the next layer when resolved. Three layers exist at call time:
/// the caller's per-request override, the coordinator's instance defaults, and the global
/// [`FormatOptions::default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct OptionsOverride {
	/// See [`FormatOptions::line_width`].
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line_width: Option<u32>,
	/// See [`FormatOptions::indent_width`].
	#[serde(skip_serializing_if = "Option::is_none")]
	pub indent_width: Option<u8>,
	/// See [`FormatOptions::use_tabs`].
	#[serde(skip_serializing_if = "Option::is_none")]
	pub use_tabs: Option<bool>,
	/// See [`FormatOptions::single_quote`].
	#[serde(skip_serializing_if = "Option::is_none")]
	pub single_quote: Option<bool>,
	/// See [`FormatOptions::prose_wrap`].
	#[serde(skip_serializing_if = "Option::is_none")]
	pub prose_wrap: Option<ProseWrap>,
	/// See [`FormatOptions::semicolons`].
	#[serde(rename = "semiColons", skip_serializing_if = "Option::is_none")]
	pub semicolons: Option<bool>,
	/// See [`FormatOptions::ignore`].
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ignore: Option<Vec<String>>,
}

impl OptionsOverride {
	/// Creates an empty override.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the line width.
	pub fn line_width(mut self, value: u32) -> Self {
		self.line_width = Some(value);
		self
	}

	/// Set the indent width.
	pub fn indent_width(mut self, value: u8) -> Self {
		self.indent_width = Some(value);
		self
	}

	/// Set tab indentation.
	pub fn use_tabs(mut self, value: bool) -> Self {
		self.use_tabs = Some(value);
		self
	}

	/// Set single-quote preference.
	pub fn single_quote(mut self, value: bool) -> Self {
		self.single_quote = Some(value);
		self
	}

	/// Set the prose wrap mode.
	pub fn prose_wrap(mut self, value: ProseWrap) -> Self {
		self.prose_wrap = Some(value);
		self
	}

	/// Set semicolon emission.
	pub fn semicolons(mut self, value: bool) -> Self {
		self.semicolons = Some(value);
		self
	}

	/// Set the ignore patterns.
	pub fn ignore(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.ignore = Some(patterns.into_iter().map(Into::into).collect());
		self
	}

	/// Returns `true` if no field is set.
	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}

	/// Layers `self` over `lower`; fields set in `self` win.
	pub fn over(&self, lower: &OptionsOverride) -> OptionsOverride {
		OptionsOverride {
			line_width: self.line_width.or(lower.line_width),
			indent_width: self.indent_width.or(lower.indent_width),
			use_tabs: self.use_tabs.or(lower.use_tabs),
			single_quote: self.single_quote.or(lower.single_quote),
			prose_wrap: self.prose_wrap.or(lower.prose_wrap),
			semicolons: self.semicolons.or(lower.semicolons),
			ignore: self.ignore.clone().or_else(|| lower.ignore.clone()),
		}
	}

	/// Resolves `self` over `instance` over the global defaults, then validates the result.
	pub fn resolve(&self, instance: &OptionsOverride) -> Result<FormatOptions> {
		let merged = self.over(instance);
		let defaults = FormatOptions::default();
		let options = FormatOptions {
			line_width: merged.line_width.unwrap_or(defaults.line_width),
			indent_width: merged.indent_width.unwrap_or(defaults.indent_width),
			use_tabs: merged.use_tabs.unwrap_or(defaults.use_tabs),
			single_quote: merged.single_quote.unwrap_or(defaults.single_quote),
			prose_wrap: merged.prose_wrap.unwrap_or(defaults.prose_wrap),
			semicolons: merged.semicolons.unwrap_or(defaults.semicolons),
			ignore: merged.ignore.unwrap_or(defaults.ignore),
		};
		options.validate()?;
		Ok(options)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_layers_resolve_to_global_defaults() {
		let resolved = OptionsOverride::new().resolve(&OptionsOverride::new()).unwrap();
		assert_eq!(resolved, FormatOptions::default());
	}

	#[test]
	fn caller_wins_over_instance_over_global() {
		let instance = OptionsOverride::new().line_width(100).use_tabs(true);
		let caller = OptionsOverride::new().line_width(120);

		let resolved = caller.resolve(&instance).unwrap();
		assert_eq!(resolved.line_width, 120);
		assert!(resolved.use_tabs);
		assert_eq!(resolved.indent_width, 2);
	}

	#[test]
	fn resolve_rejects_out_of_range_values() {
		let err = OptionsOverride::new().line_width(0).resolve(&OptionsOverride::new()).unwrap_err();
		assert!(matches!(err, OptionsError::OutOfRange { name: "lineWidth", .. }));

		let err = OptionsOverride::new().indent_width(17).resolve(&OptionsOverride::new()).unwrap_err();
		assert!(matches!(err, OptionsError::OutOfRange { name: "indentWidth", value: 17, .. }));
	}

	#[test]
	fn resolve_rejects_comma_in_ignore_entry() {
		let err = OptionsOverride::new()
			.ignore(["dist,build"])
			.resolve(&OptionsOverride::new())
			.unwrap_err();
		assert!(matches!(err, OptionsError::InvalidEntry { name: "ignore", .. }));
	}

	#[test]
	fn override_deserializes_camel_case_and_rejects_unknown_fields() {
		let parsed: OptionsOverride = serde_json::from_str(r#"{"semiColons": false, "lineWidth": 90}"#).unwrap();
		assert_eq!(parsed, OptionsOverride::new().semicolons(false).line_width(90));

		let unknown = serde_json::from_str::<OptionsOverride>(r#"{"tabWidth": 4}"#);
		assert!(unknown.is_err());
	}

	#[test]
	fn display_is_compact_json() {
		let text = FormatOptions::default().to_string();
		assert!(text.starts_with('{'));
		assert!(text.contains("\"semiColons\":true"));
	}

	#[test]
	fn prose_wrap_parses_flag_spelling() {
		assert_eq!("preserve".parse::<ProseWrap>().unwrap(), ProseWrap::Preserve);
		assert!("sometimes".parse::<ProseWrap>().is_err());
	}
}
