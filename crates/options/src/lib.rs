//! Formatting options shared by every fmtbridge backend.
//!
//! This crate owns three things:
//!
//! - [`ContentType`] and [`ContentFamily`]: what kind of source text a request carries, resolved
//!   through a static extension table.
//! - [`FormatOptions`] and [`OptionsOverride`]: the normalized option set and the sparse override
//!   layers merged over it (caller over instance defaults over global defaults).
//! - The two serialization targets of a normalized option set: the external formatter's flag list
//!   ([`flags`]) and the plugin configuration objects sent to sandboxed modules
//!   ([`plugin_config`]).
//!
//! Every field of [`FormatOptions`] affects formatter output, so all of them take part in cache
//! keys computed downstream.

mod content;
mod error;
pub mod flags;
mod options;
pub mod plugin_config;

pub use content::{ContentFamily, ContentType};
pub use error::{OptionsError, Result};
pub use options::{FormatOptions, OptionsOverride, ProseWrap};
