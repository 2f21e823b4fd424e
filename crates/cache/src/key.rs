//! Canonical cache keys.

use std::collections::BTreeMap;
use std::fmt;

use fmtbridge_options::{ContentType, FormatOptions};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest identifying one (options, content type, text) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
	/// Returns the hex digest.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for CacheKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Order-independent fingerprint of a normalized option set and content type.
///
/// Every serialized field of [`FormatOptions`] is present; names are sorted lexicographically
/// before stringifying, so two semantically equal option sets always yield the same string.
pub fn fingerprint(content_type: ContentType, options: &FormatOptions) -> String {
	let mut fields: BTreeMap<String, Value> = BTreeMap::new();
	// Serializing a plain struct of scalars and strings cannot fail.
	if let Value::Object(map) = serde_json::to_value(options).unwrap_or_default() {
		fields.extend(map);
	}
	fields.insert("contentType".into(), Value::String(content_type.extension().into()));
	serde_json::to_string(&fields).unwrap_or_default()
}

/// Computes the canonical cache key for formatting `text` as `content_type` under `options`.
///
/// Content addressed: the key depends only on the values passed, never on where they live.
/// Each segment is length-prefixed so no two (fingerprint, text) splits hash alike.
pub fn canonical_key(text: &str, content_type: ContentType, options: &FormatOptions) -> CacheKey {
	let fingerprint = fingerprint(content_type, options);

	let mut hasher = Sha256::new();
	for segment in [fingerprint.as_bytes(), text.as_bytes()] {
		hasher.update((segment.len() as u64).to_le_bytes());
		hasher.update(segment);
	}
	CacheKey(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
	use fmtbridge_options::{OptionsOverride, ProseWrap};
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn key_is_64_hex_chars() {
		let key = canonical_key("let a = 1;", ContentType::TypeScript, &FormatOptions::default());
		assert_eq!(key.as_str().len(), 64);
		assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn fingerprint_is_sorted_and_complete() {
		let fp = fingerprint(ContentType::Json, &FormatOptions::default());
		assert_eq!(
			fp,
			r#"{"contentType":"json","ignore":[],"indentWidth":2,"lineWidth":80,"proseWrap":"always","semiColons":true,"singleQuote":false,"useTabs":false}"#
		);
	}

	#[test]
	fn every_output_affecting_field_changes_the_key() {
		let base = FormatOptions::default();
		let text = "# title";
		let base_key = canonical_key(text, ContentType::Markdown, &base);

		let variants = [
			FormatOptions { line_width: 81, ..base.clone() },
			FormatOptions { indent_width: 4, ..base.clone() },
			FormatOptions { use_tabs: true, ..base.clone() },
			FormatOptions { single_quote: true, ..base.clone() },
			FormatOptions { prose_wrap: ProseWrap::Never, ..base.clone() },
			FormatOptions { semicolons: false, ..base.clone() },
			FormatOptions { ignore: vec!["dist".into()], ..base.clone() },
		];
		for variant in variants {
			assert_ne!(canonical_key(text, ContentType::Markdown, &variant), base_key, "{variant}");
		}
		assert_ne!(canonical_key(text, ContentType::Json, &base), base_key);
		assert_ne!(canonical_key("# title ", ContentType::Markdown, &base), base_key);
	}

	#[test]
	fn segment_boundaries_are_unambiguous() {
		let options = FormatOptions::default();
		let a = canonical_key("}x", ContentType::Json, &options);
		let b = canonical_key("x", ContentType::Json, &options);
		assert_ne!(a, b);
	}

	proptest! {
		#[test]
		fn key_ignores_override_layer_split(
			line_width in 1u32..=1000,
			indent_width in 1u8..=16,
			use_tabs: bool,
			semicolons: bool,
			text in ".{0,64}",
		) {
			// Same values supplied through different layers normalize identically.
			let instance = OptionsOverride::new().line_width(line_width).use_tabs(use_tabs);
			let caller = OptionsOverride::new().indent_width(indent_width).semicolons(semicolons);
			let split = caller.resolve(&instance).unwrap();

			let all_in_caller = OptionsOverride::new()
				.semicolons(semicolons)
				.use_tabs(use_tabs)
				.indent_width(indent_width)
				.line_width(line_width);
			let joined = all_in_caller.resolve(&OptionsOverride::new()).unwrap();

			prop_assert_eq!(
				canonical_key(&text, ContentType::TypeScript, &split),
				canonical_key(&text, ContentType::TypeScript, &joined)
			);
		}

		#[test]
		fn key_ignores_json_field_order(line_width in 1u32..=1000, single_quote: bool) {
			let forward = format!(r#"{{"lineWidth": {line_width}, "singleQuote": {single_quote}}}"#);
			let reverse = format!(r#"{{"singleQuote": {single_quote}, "lineWidth": {line_width}}}"#);
			let a: OptionsOverride = serde_json::from_str(&forward).unwrap();
			let b: OptionsOverride = serde_json::from_str(&reverse).unwrap();
			let none = OptionsOverride::new();

			prop_assert_eq!(
				canonical_key("x", ContentType::Tsx, &a.resolve(&none).unwrap()),
				canonical_key("x", ContentType::Tsx, &b.resolve(&none).unwrap())
			);
		}
	}
}
