//! Logging prelude module for convenient access to tracing macros.
//!
//! Standard output belongs to the protocol, so all log output goes to
//! stderr. Messages meant for the host travel as `DEBUG` lines instead.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! warn!("Upload of {} failed", key);
//! debug!("Reusing existing bucket {}", bucket);
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// By default only warnings and errors are shown, so an unattended remote
/// stays quiet. Control the log level with the `RUST_LOG` environment
/// variable:
///
/// ```bash
/// RUST_LOG=debug git annex copy --to gcs file
/// RUST_LOG=gcsannex::transfer=debug,gcsannex::retry=info git annex get file
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
		)
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();
}

// vim: ts=4
