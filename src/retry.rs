//! Bounded retry with exponential backoff for network calls
//!
//! Only timeout-class failures are retried. Everything else (permission
//! errors, conflicts, malformed responses) propagates after one attempt.

use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::protocol::Channel;
use crate::store::StoreResult;

/// Retry policy for a single network call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Timeouts tolerated before the last one is returned to the caller
	pub max_retries: u32,
	/// Delay before the first retry; doubles with each further retry
	pub base_delay: Duration,
	/// Upper bound on any single delay
	pub max_delay: Duration,
}

impl RetryPolicy {
	pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
		Self { max_retries, base_delay, max_delay }
	}

	/// Base 1s, capped at half the per-call timeout
	pub fn from_config(config: &RemoteConfig) -> Self {
		Self::new(config.max_retries, Duration::from_secs(1), config.timeout() / 2)
	}

	/// Backoff before retry number `retry` (0-based)
	pub fn delay(&self, retry: u32) -> Duration {
		let factor = 2u32.saturating_pow(retry);
		self.base_delay.checked_mul(factor).unwrap_or(self.max_delay).min(self.max_delay)
	}

	/// Run `op`, retrying timeouts. Each retry is announced on the host's
	/// debug channel before sleeping. Once the budget is spent the last
	/// error is returned as is.
	pub async fn run<R, W, T, F, Fut>(&self, chan: &mut Channel<R, W>, mut op: F) -> Result<T, RemoteError>
	where
		R: AsyncBufRead + Unpin,
		W: AsyncWrite + Unpin,
		F: FnMut() -> Fut,
		Fut: Future<Output = StoreResult<T>>,
	{
		let attempts = self.max_retries.max(1);
		let mut retry = 0;
		loop {
			match op().await {
				Ok(value) => return Ok(value),
				Err(e) if e.is_timeout() && retry + 1 < attempts => {
					let backoff = self.delay(retry);
					chan.debug(&format!("{}, retrying in {:?}", e, backoff)).await?;
					tokio::time::sleep(backoff).await;
					retry += 1;
				}
				Err(e) => return Err(e.into()),
			}
		}
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self::from_config(&RemoteConfig::default())
	}
}


// vim: ts=4
