use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of the current time for entry timestamps.
pub trait Clock: Send + Sync + fmt::Debug {
	/// Returns the current instant.
	fn now(&self) -> Instant;
}

/// Wall-clock time via [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
	now: Arc<Mutex<Instant>>,
}

impl ManualClock {
	/// Creates a clock frozen at the current instant.
	pub fn new() -> Self {
		Self {
			now: Arc::new(Mutex::new(Instant::now())),
		}
	}

	/// Moves the clock forward.
	pub fn advance(&self, by: Duration) {
		*self.now.lock() += by;
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Instant {
		*self.now.lock()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn manual_clock_clones_share_time() {
		let clock = ManualClock::new();
		let other = clock.clone();
		let start = clock.now();

		other.advance(Duration::from_millis(250));
		assert_eq!(clock.now() - start, Duration::from_millis(250));
	}
}
