//! Transfer progress tracking
//!
//! Tracks how much of the current transfer has moved and decides when the
//! host should hear about it.

pub mod constants;

pub use constants::*;

/// Progress of a single transfer
#[derive(Debug, Clone)]
pub struct ProgressTracker {
	total: u64,
	done: u64,
	last_reported: Option<f64>,
}

impl ProgressTracker {
	pub fn new(total: u64) -> Self {
		Self { total, done: 0, last_reported: None }
	}

	/// Completed fraction in [0, 1]
	pub fn fraction(&self) -> f64 {
		if self.total == 0 {
			return 1.0;
		}
		(self.done as f64 / self.total as f64).clamp(0.0, 1.0)
	}

	/// Record that `done` bytes in total have been moved.
	///
	/// Returns the byte count to report when progress advanced by at least
	/// [`PROGRESS_STEP`] since the last report, or when the transfer just
	/// completed. Reported values never decrease. An empty transfer is
	/// never reported.
	pub fn advance(&mut self, done: u64) -> Option<u64> {
		if self.total == 0 {
			return None;
		}
		self.done = done.min(self.total).max(self.done);
		let fraction = self.fraction();
		let last = self.last_reported.unwrap_or(0.0);
		let complete = fraction >= 1.0 && last < 1.0;
		if fraction - last >= PROGRESS_STEP || complete {
			self.last_reported = Some(fraction);
			Some(self.done)
		} else {
			None
		}
	}
}


// vim: ts=4
