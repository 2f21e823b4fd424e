use std::time::Instant;

use crate::key::CacheKey;

/// Receives cache lifecycle notifications.
///
/// Hooks run synchronously on the thread performing the cache operation, while the owner of the
/// cache may hold a lock around it. Implementations must not call back into the same cache or
/// coordinator, and a panic in a hook propagates to the caller of the cache operation.
pub trait CacheObserver: Send + Sync {
	/// A fresh entry was read and its timestamp refreshed.
	fn on_refresh(&self, _value: &str, _key: &CacheKey, _time: Instant) {}

	/// An entry left the cache through eviction, expiry, deletion, or a prune pass.
	fn on_remove(&self, _value: &str, _key: &CacheKey, _time: Instant) {}

	/// The cache was disposed. Fired once.
	fn on_dispose(&self) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CacheObserver for NoopObserver {}
