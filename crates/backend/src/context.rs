use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{BackendError, Result};

/// Deadline and cancellation for one backend call.
///
/// Cloning shares the cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
	deadline: Option<Instant>,
	cancel: CancellationToken,
}

impl CallContext {
	/// A context with no deadline and a fresh token.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the deadline to `timeout` from now.
	pub fn with_timeout(self, timeout: Duration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);
		self
	}

	/// Replaces the cancellation token, typically with a child of a caller-owned token.
	pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;
		self
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	pub fn cancel_token(&self) -> &CancellationToken {
		&self.cancel
	}

	/// Time left before the deadline, if one is set.
	pub fn remaining(&self) -> Option<Duration> {
		self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
	}

	/// Fails if the call has been cancelled or its deadline has passed.
	///
	/// Cancellation wins when both hold.
	pub fn checkpoint(&self) -> Result<()> {
		if self.cancel.is_cancelled() {
			return Err(BackendError::Cancelled);
		}
		if self.deadline.is_some_and(|d| Instant::now() >= d) {
			return Err(BackendError::Timeout);
		}
		Ok(())
	}

	/// Resolves with the interrupting error once the call is cancelled or times out.
	///
	/// Never resolves when there is no deadline and the token is never cancelled.
	pub async fn interrupted(&self) -> BackendError {
		let expiry = async {
			match self.deadline {
				Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
				None => std::future::pending().await,
			}
		};
		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => BackendError::Cancelled,
			_ = expiry => BackendError::Timeout,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fresh_context_passes_checkpoint() {
		assert!(CallContext::new().checkpoint().is_ok());
	}

	#[test]
	fn elapsed_deadline_is_timeout() {
		let ctx = CallContext::new().with_deadline(Instant::now() - Duration::from_millis(1));
		assert!(matches!(ctx.checkpoint(), Err(BackendError::Timeout)));
		assert_eq!(ctx.remaining(), Some(Duration::ZERO));
	}

	#[test]
	fn cancellation_wins_over_timeout() {
		let ctx = CallContext::new().with_deadline(Instant::now());
		ctx.cancel_token().cancel();
		assert!(matches!(ctx.checkpoint(), Err(BackendError::Cancelled)));
	}

	#[tokio::test]
	async fn interrupted_resolves_on_deadline() {
		let ctx = CallContext::new().with_timeout(Duration::from_millis(10));
		assert!(matches!(ctx.interrupted().await, BackendError::Timeout));
	}

	#[tokio::test]
	async fn interrupted_resolves_on_cancel() {
		let ctx = CallContext::new();
		let token = ctx.cancel_token().clone();
		tokio::spawn(async move { token.cancel() });
		assert!(matches!(ctx.interrupted().await, BackendError::Cancelled));
	}
}
