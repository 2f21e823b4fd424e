//! Content types and the static extension table that groups them into plugin families.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;

/// Kind of source text carried by a request.
///
/// The content type selects the grammar the formatter applies, so it is part of every cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
	/// JavaScript (`.js`, `.mjs`, `.cjs`).
	JavaScript,
	/// JavaScript with JSX (`.jsx`).
	Jsx,
	/// TypeScript (`.ts`, `.mts`, `.cts`).
	TypeScript,
	/// TypeScript with JSX (`.tsx`).
	Tsx,
	/// JSON (`.json`).
	Json,
	/// JSON with comments (`.jsonc`).
	Jsonc,
	/// Markdown (`.md`, `.markdown`).
	Markdown,
}

/// Group of content types served by one formatting plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFamily {
	/// Script-like sources.
	Script,
	/// Data-interchange sources.
	Data,
	/// Markup sources.
	Markup,
}

/// Extension table, lowercase and without the leading dot.
const EXTENSIONS: &[(&str, ContentType)] = &[
	("js", ContentType::JavaScript),
	("mjs", ContentType::JavaScript),
	("cjs", ContentType::JavaScript),
	("jsx", ContentType::Jsx),
	("ts", ContentType::TypeScript),
	("mts", ContentType::TypeScript),
	("cts", ContentType::TypeScript),
	("tsx", ContentType::Tsx),
	("json", ContentType::Json),
	("jsonc", ContentType::Jsonc),
	("md", ContentType::Markdown),
	("markdown", ContentType::Markdown),
];

impl ContentType {
	/// Every content type, in declaration order.
	pub const ALL: [ContentType; 7] = [
		Self::JavaScript,
		Self::Jsx,
		Self::TypeScript,
		Self::Tsx,
		Self::Json,
		Self::Jsonc,
		Self::Markdown,
	];

	/// Looks up a content type by file extension, with or without the leading dot.
	pub fn from_extension(ext: &str) -> Option<Self> {
		let ext = ext.strip_prefix('.').unwrap_or(ext);
		EXTENSIONS
			.iter()
			.find(|(candidate, _)| candidate.eq_ignore_ascii_case(ext))
			.map(|(_, ty)| *ty)
	}

	/// Infers the content type from a path's extension.
	pub fn from_path(path: &Path) -> Option<Self> {
		path.extension().and_then(|ext| ext.to_str()).and_then(Self::from_extension)
	}

	/// Canonical extension, used for `--ext` flags, temp file suffixes and plugin path hints.
	pub const fn extension(self) -> &'static str {
		match self {
			Self::JavaScript => "js",
			Self::Jsx => "jsx",
			Self::TypeScript => "ts",
			Self::Tsx => "tsx",
			Self::Json => "json",
			Self::Jsonc => "jsonc",
			Self::Markdown => "md",
		}
	}

	/// Plugin family this content type belongs to.
	pub const fn family(self) -> ContentFamily {
		match self {
			Self::JavaScript | Self::Jsx | Self::TypeScript | Self::Tsx => ContentFamily::Script,
			Self::Json | Self::Jsonc => ContentFamily::Data,
			Self::Markdown => ContentFamily::Markup,
		}
	}
}

impl fmt::Display for ContentType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.extension())
	}
}

impl FromStr for ContentType {
	type Err = OptionsError;

	/// Accepts any extension from the table, or a type name such as `typescript`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if let Some(ty) = Self::from_extension(s) {
			return Ok(ty);
		}
		Self::ALL
			.into_iter()
			.find(|ty| format!("{ty:?}").eq_ignore_ascii_case(s))
			.ok_or_else(|| OptionsError::UnknownContentType(s.to_string()))
	}
}

impl ContentFamily {
	/// Every family, in declaration order.
	pub const ALL: [ContentFamily; 3] = [Self::Script, Self::Data, Self::Markup];

	/// Name of the plugin serving this family.
	pub const fn plugin_name(self) -> &'static str {
		match self {
			Self::Script => "typescript",
			Self::Data => "json",
			Self::Markup => "markdown",
		}
	}
}

impl fmt::Display for ContentFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.plugin_name())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extension_lookup_ignores_case_and_dot() {
		assert_eq!(ContentType::from_extension("TS"), Some(ContentType::TypeScript));
		assert_eq!(ContentType::from_extension(".jsonc"), Some(ContentType::Jsonc));
		assert_eq!(ContentType::from_extension("markdown"), Some(ContentType::Markdown));
		assert_eq!(ContentType::from_extension("rs"), None);
	}

	#[test]
	fn path_inference() {
		assert_eq!(ContentType::from_path(Path::new("src/app.mts")), Some(ContentType::TypeScript));
		assert_eq!(ContentType::from_path(Path::new("README")), None);
	}

	#[test]
	fn families_group_by_plugin() {
		assert_eq!(ContentType::Tsx.family(), ContentFamily::Script);
		assert_eq!(ContentType::Jsonc.family(), ContentFamily::Data);
		assert_eq!(ContentType::Markdown.family(), ContentFamily::Markup);
		assert_eq!(ContentFamily::Data.plugin_name(), "json");
	}

	#[test]
	fn every_table_entry_round_trips_through_canonical_extension() {
		for (_, ty) in EXTENSIONS {
			assert_eq!(ContentType::from_extension(ty.extension()), Some(*ty));
		}
	}

	#[test]
	fn parse_accepts_names_and_extensions() {
		assert_eq!("typescript".parse::<ContentType>().unwrap(), ContentType::TypeScript);
		assert_eq!("md".parse::<ContentType>().unwrap(), ContentType::Markdown);
		assert!(matches!("cobol".parse::<ContentType>(), Err(OptionsError::UnknownContentType(_))));
	}
}
