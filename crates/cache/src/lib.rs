//! Content-addressed result cache.
//!
//! Formatter results are keyed by [`canonical_key`], a digest over the normalized option set,
//! the content type, and the source text. The [`FormatCache`] bounds the store with two
//! independent eviction pressures:
//!
//! - **Capacity**: inserting into a full cache evicts the least-recently-used entry.
//! - **Age**: an entry older than the TTL is dropped the next time it is looked up. Expiry is
//!   lazy; no background timer runs.
//!
//! Lifecycle notifications go to a [`CacheObserver`]. Time is read through a [`Clock`] so tests
//! can drive expiry deterministically.

mod clock;
mod error;
mod key;
mod observer;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Result};
pub use key::{CacheKey, canonical_key, fingerprint};
pub use observer::{CacheObserver, NoopObserver};
pub use store::{CacheEntry, CacheStats, FormatCache};
