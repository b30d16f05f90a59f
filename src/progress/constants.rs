//! Progress reporting constants

/// Minimum advance (as a fraction of the transfer) between two
/// `PROGRESS` messages, bounding them to about a hundred per transfer
pub const PROGRESS_STEP: f64 = 0.01;

// vim: ts=4
