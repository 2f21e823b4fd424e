//! LRU + TTL store for formatter results.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::observer::{CacheObserver, NoopObserver};

/// A cached formatter result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
	/// The formatted text. Unchanged results store the original text.
	pub value: String,
	/// When the entry was inserted or last refreshed by a hit.
	pub inserted_at: Instant,
}

/// Counters for cache diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
	/// Lookups that returned a fresh entry.
	pub hits: u64,
	/// Lookups that found nothing or an expired entry.
	pub misses: u64,
	/// Entries dropped to make room or by a capacity prune.
	pub evictions: u64,
	/// Entries dropped for exceeding the TTL.
	pub expirations: u64,
}

/// Bounded key/value store with capacity and age eviction.
///
/// Ordering is true access-order LRU: a hit moves the entry to the most-recently-used position
/// and refreshes its timestamp, so capacity pressure evicts the entry that has gone longest
/// without being read or written.
///
/// A capacity of zero disables the cache: [`FormatCache::set`] becomes a no-op.
pub struct FormatCache {
	/// Unbounded map; the capacity bound is enforced here so prune passes can notify observers.
	entries: LruCache<CacheKey, CacheEntry>,
	capacity: usize,
	ttl: Duration,
	clock: Arc<dyn Clock>,
	observer: Arc<dyn CacheObserver>,
	stats: CacheStats,
	disposed: bool,
}

impl FormatCache {
	/// Creates a cache using the system clock and no observer.
	pub fn new(capacity: usize, ttl: Duration) -> Self {
		Self {
			entries: LruCache::unbounded(),
			capacity,
			ttl,
			clock: Arc::new(SystemClock),
			observer: Arc::new(NoopObserver),
			stats: CacheStats::default(),
			disposed: false,
		}
	}

	/// Replaces the clock.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Replaces the observer.
	pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
		self.observer = observer;
		self
	}

	/// Looks up a value, refreshing it on a hit.
	///
	/// An entry older than the TTL is removed (notifying `on_remove`) and reported as a miss.
	pub fn get(&mut self, key: &CacheKey) -> Result<Option<String>> {
		self.ensure_live()?;
		let now = self.clock.now();

		let expired = match self.entries.peek(key) {
			Some(entry) => self.is_expired(entry, now),
			None => {
				self.stats.misses += 1;
				return Ok(None);
			}
		};

		if expired {
			if let Some(entry) = self.entries.pop(key) {
				self.stats.expirations += 1;
				tracing::trace!(key = %key, "cache entry expired");
				self.observer.on_remove(&entry.value, key, now);
			}
			self.stats.misses += 1;
			return Ok(None);
		}

		let Some(entry) = self.entries.get_mut(key) else {
			self.stats.misses += 1;
			return Ok(None);
		};
		entry.inserted_at = now;
		let value = entry.value.clone();
		self.stats.hits += 1;
		self.observer.on_refresh(&value, key, now);
		Ok(Some(value))
	}

	/// Inserts or replaces a value.
	///
	/// When full, the least-recently-used entry is evicted first (notifying `on_remove`).
	pub fn set(&mut self, key: CacheKey, value: String) -> Result<()> {
		self.ensure_live()?;
		if self.capacity == 0 {
			return Ok(());
		}
		let now = self.clock.now();

		if let Some(entry) = self.entries.get_mut(&key) {
			entry.value = value;
			entry.inserted_at = now;
			return Ok(());
		}

		while self.entries.len() >= self.capacity {
			self.evict_lru(now);
		}
		self.entries.put(key, CacheEntry { value, inserted_at: now });
		Ok(())
	}

	/// Removes an entry, notifying `on_remove` whether or not it had expired.
	///
	/// Returns `true` if an entry was present.
	pub fn delete(&mut self, key: &CacheKey) -> Result<bool> {
		self.ensure_live()?;
		let Some(entry) = self.entries.pop(key) else {
			return Ok(false);
		};
		self.observer.on_remove(&entry.value, key, self.clock.now());
		Ok(true)
	}

	/// Changes the capacity and evicts least-recently-used entries until the cache fits.
	pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
		self.ensure_live()?;
		self.capacity = capacity;
		let now = self.clock.now();
		while self.entries.len() > self.capacity {
			self.evict_lru(now);
		}
		Ok(())
	}

	/// Changes the TTL and removes every entry that is expired under it.
	pub fn set_ttl(&mut self, ttl: Duration) -> Result<()> {
		self.ensure_live()?;
		self.ttl = ttl;
		let now = self.clock.now();

		let expired: Vec<CacheKey> = self
			.entries
			.iter()
			.filter(|(_, entry)| self.is_expired(entry, now))
			.map(|(key, _)| key.clone())
			.collect();

		for key in expired {
			if let Some(entry) = self.entries.pop(&key) {
				self.stats.expirations += 1;
				self.observer.on_remove(&entry.value, &key, now);
			}
		}
		Ok(())
	}

	/// Tears the cache down.
	///
	/// Idempotent. The first call fires `on_dispose` once and drops every entry without
	/// per-entry `on_remove` notifications.
	pub fn dispose(&mut self) {
		if self.disposed {
			return;
		}
		self.disposed = true;
		self.observer.on_dispose();
		self.entries.clear();
	}

	/// Returns `true` once [`FormatCache::dispose`] has run.
	pub fn is_disposed(&self) -> bool {
		self.disposed
	}

	/// Number of stored entries, including ones that have expired but not yet been looked up.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns `true` if no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Maximum number of entries.
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Free slots before the next insertion evicts.
	pub fn vacancies(&self) -> usize {
		self.capacity.saturating_sub(self.entries.len())
	}

	/// Maximum entry age.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Counters accumulated since creation.
	pub fn stats(&self) -> CacheStats {
		self.stats
	}

	fn ensure_live(&self) -> Result<()> {
		if self.disposed { Err(CacheError::Disposed) } else { Ok(()) }
	}

	fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
		now.saturating_duration_since(entry.inserted_at) > self.ttl
	}

	fn evict_lru(&mut self, now: Instant) {
		if let Some((key, entry)) = self.entries.pop_lru() {
			self.stats.evictions += 1;
			tracing::trace!(key = %key, "cache entry evicted");
			self.observer.on_remove(&entry.value, &key, now);
		}
	}
}

impl std::fmt::Debug for FormatCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FormatCache")
			.field("len", &self.entries.len())
			.field("capacity", &self.capacity)
			.field("ttl", &self.ttl)
			.field("stats", &self.stats)
			.field("disposed", &self.disposed)
			.finish()
	}
}
