//! Serialization of a normalized option set into the external formatter's flag syntax.
//!
//! Each option maps to exactly one flag shape:
//!
//! | Shape  | Example                    |
//! |--------|----------------------------|
//! | switch | `--use-tabs`, `--no-semicolons` |
//! | value  | `--line-width 100`         |
//! | list   | `--ignore=dist,build`      |
//!
//! Switches are emitted only when they differ from the tool's own default, so a default option
//! set produces only value flags.

use crate::options::FormatOptions;

/// Ordered flag list under construction.
#[derive(Debug, Default)]
struct FlagList {
	args: Vec<String>,
}

impl FlagList {
	fn switch(&mut self, name: &str, enabled: bool) -> &mut Self {
		if enabled {
			self.args.push(format!("--{name}"));
		}
		self
	}

	fn value(&mut self, name: &str, value: impl ToString) -> &mut Self {
		self.args.push(format!("--{name}"));
		self.args.push(value.to_string());
		self
	}

	fn list(&mut self, name: &str, entries: &[String]) -> &mut Self {
		if !entries.is_empty() {
			self.args.push(format!("--{name}={}", entries.join(",")));
		}
		self
	}
}

/// Serializes `options` into formatter flags, in a fixed order.
pub fn to_flags(options: &FormatOptions) -> Vec<String> {
	let mut flags = FlagList::default();
	flags
		.value("line-width", options.line_width)
		.value("indent-width", options.indent_width)
		.switch("use-tabs", options.use_tabs)
		.switch("single-quote", options.single_quote)
		.value("prose-wrap", options.prose_wrap)
		.switch("no-semicolons", !options.semicolons)
		.list("ignore", &options.ignore);
	flags.args
}
