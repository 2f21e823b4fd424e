//! Cached, backend-agnostic source formatting.
//!
//! A [`Coordinator`] resolves per-call options over its defaults, computes a canonical cache
//! key, and only on a miss hands the request to the backend routed for the content type's
//! family. Backends come from [`fmtbridge_backend`]: an external formatter process or sandboxed
//! Wasm plugin modules.
//!
//! ```no_run
//! # async fn demo() -> fmtbridge::Result<()> {
//! use fmtbridge::{ContentType, Coordinator, CoordinatorConfig, OptionsOverride, Request};
//!
//! let coordinator = Coordinator::from_config(&CoordinatorConfig::default())?;
//! let request = Request::new("const foo = \"bar\";", ContentType::TypeScript)
//! 	.overrides(OptionsOverride::new().semicolons(false));
//! assert_eq!(coordinator.format(&request).await?, "const foo = \"bar\"\n");
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod error;

pub use config::{BackendConfig, CacheConfig, CoordinatorConfig};
pub use coordinator::{Coordinator, CoordinatorBuilder, Output, Request};
pub use error::{Error, Result};
pub use fmtbridge_backend::{Backend, BackendError, BackendKind, CallContext, Mode};
pub use fmtbridge_cache::{CacheKey, CacheObserver, CacheStats, Clock, ManualClock};
pub use fmtbridge_options::{ContentFamily, ContentType, FormatOptions, OptionsOverride, ProseWrap};
