use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use fmtbridge::{ContentType, Mode, OptionsOverride, ProseWrap};

#[derive(Parser, Debug)]
#[command(name = "fmtbridge")]
#[command(about = "Format or check source text through a cached formatter backend")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// File to format (reads stdin if omitted)
	pub file: Option<PathBuf>,

	/// Configuration file (defaults to <config dir>/fmtbridge/config.toml when present)
	#[arg(long, short = 'c', value_name = "PATH")]
	pub config: Option<PathBuf>,

	/// Content type or extension of the input (e.g. ts, json, md)
	#[arg(long)]
	pub ext: Option<ContentType>,

	/// Exit with status 1 instead of printing when the input is not formatted
	#[arg(long)]
	pub check: bool,

	/// Use the blocking backend path
	#[arg(long)]
	pub blocking: bool,

	/// Maximum line width
	#[arg(long, value_name = "N")]
	pub line_width: Option<u32>,

	/// Columns per indentation level
	#[arg(long, value_name = "N")]
	pub indent_width: Option<u8>,

	/// Indent with tabs
	#[arg(long, overrides_with = "no_use_tabs")]
	pub use_tabs: bool,

	/// Indent with spaces, even when the configuration file says tabs
	#[arg(long, overrides_with = "use_tabs")]
	pub no_use_tabs: bool,

	/// Prefer single quotes
	#[arg(long, overrides_with = "no_single_quote")]
	pub single_quote: bool,

	/// Prefer double quotes, even when the configuration file says single
	#[arg(long, overrides_with = "single_quote")]
	pub no_single_quote: bool,

	/// Emit statement-terminating semicolons, even when the configuration file omits them
	#[arg(long, overrides_with = "no_semicolons")]
	pub semicolons: bool,

	/// Omit statement-terminating semicolons
	#[arg(long, overrides_with = "semicolons")]
	pub no_semicolons: bool,

	/// Prose wrapping for markup (always, never, preserve)
	#[arg(long, value_name = "MODE")]
	pub prose_wrap: Option<ProseWrap>,

	/// Glob patterns the formatter skips (comma-separated)
	#[arg(long, value_delimiter = ',')]
	pub ignore: Option<Vec<String>>,

	/// Fail the call after this many milliseconds
	#[arg(long, value_name = "MS")]
	pub timeout_ms: Option<u64>,

	/// Verbose logging
	#[arg(short, long)]
	pub verbose: bool,
}

impl Cli {
	pub fn mode(&self) -> Mode {
		if self.check { Mode::Check } else { Mode::Format }
	}

	pub fn timeout(&self) -> Option<Duration> {
		self.timeout_ms.map(Duration::from_millis)
	}

	/// Options given on the command line. Switches that were not passed stay unset so the
	/// configuration file's defaults apply; each has a negated form, and the last one given wins.
	pub fn overrides(&self) -> OptionsOverride {
		OptionsOverride {
			line_width: self.line_width,
			indent_width: self.indent_width,
			use_tabs: switch(self.use_tabs, self.no_use_tabs),
			single_quote: switch(self.single_quote, self.no_single_quote),
			prose_wrap: self.prose_wrap,
			semicolons: switch(self.semicolons, self.no_semicolons),
			ignore: self.ignore.clone(),
		}
	}

	/// `--ext` wins over the file's extension.
	pub fn content_type(&self) -> Option<ContentType> {
		self.ext.or_else(|| self.file.as_deref().and_then(ContentType::from_path))
	}
}

fn switch(on: bool, off: bool) -> Option<bool> {
	match (on, off) {
		(true, _) => Some(true),
		(_, true) => Some(false),
		_ => None,
	}
}
