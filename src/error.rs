//! Error types for remote operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::protocol::ProtocolError;
use crate::store::StoreError;

/// Main error type for command handlers
#[derive(Debug)]
pub enum RemoteError {
	/// Talking to the host failed (includes the input-closed condition)
	Protocol(ProtocolError),

	/// The object store failed
	Store(StoreError),

	/// A required setting has no value
	MissingSetting { name: String },

	/// No credentials are stored under this setting
	MissingCredentials { name: String },

	/// Nothing stored and nothing to import at remote creation
	NoCredentials,

	/// Credential file could not be used
	Credentials(String),

	/// Remote configuration conflicts with existing state
	Config { message: String },

	/// A command that needs settings ran before they were fetched
	NotInitialized,

	/// A command that needs the store ran before authentication
	NotAuthenticated,

	/// `TRANSFER` with a subcommand other than STORE or RETRIEVE
	UnsupportedTransfer { subcommand: String },

	/// The host sent `ERROR`
	Host { message: String },

	/// Object not present where it must be
	NotFound { object: String },

	/// Local file I/O error
	Io(io::Error),
}

impl RemoteError {
	/// The host closed the request stream; ends the run loop without error
	pub fn is_input_closed(&self) -> bool {
		matches!(self, RemoteError::Protocol(ProtocolError::InputClosed))
	}

	pub fn config(message: impl Into<String>) -> Self {
		RemoteError::Config { message: message.into() }
	}
}

impl fmt::Display for RemoteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RemoteError::Protocol(e) => write!(f, "{}", e),
			RemoteError::Store(e) => write!(f, "{}", e),
			RemoteError::MissingSetting { name } => write!(f, "Missing setting: {}", name),
			RemoteError::MissingCredentials { name } => {
				write!(f, "Missing credentials: {}", name)
			}
			RemoteError::NoCredentials => {
				write!(f, "No stored credentials and GOOGLE_APPLICATION_CREDENTIALS not set")
			}
			RemoteError::Credentials(msg) => write!(f, "Credentials: {}", msg),
			RemoteError::Config { message } => write!(f, "{}", message),
			RemoteError::NotInitialized => write!(f, "Not initialized"),
			RemoteError::NotAuthenticated => write!(f, "Not authenticated"),
			RemoteError::UnsupportedTransfer { subcommand } => {
				write!(f, "Unsupported TRANSFER subcommand: {}", subcommand)
			}
			RemoteError::Host { message } => {
				write!(f, "Received error from git-annex: {}", message)
			}
			RemoteError::NotFound { object } => write!(f, "Object not found: {}", object),
			RemoteError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for RemoteError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		// Protocol and Store display as their inner error; skip straight to its cause
		match self {
			RemoteError::Protocol(e) => e.source(),
			RemoteError::Store(e) => e.source(),
			RemoteError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<ProtocolError> for RemoteError {
	fn from(e: ProtocolError) -> Self {
		RemoteError::Protocol(e)
	}
}

impl From<StoreError> for RemoteError {
	fn from(e: StoreError) -> Self {
		RemoteError::Store(e)
	}
}

impl From<io::Error> for RemoteError {
	fn from(e: io::Error) -> Self {
		RemoteError::Io(e)
	}
}

/// Render an error and its causes, one per line
pub fn error_chain(err: &dyn Error) -> String {
	let mut text = format!("error: {}", err);
	let mut source = err.source();
	while let Some(cause) = source {
		text.push_str(&format!("\ncaused by: {}", cause));
		source = cause.source();
	}
	text
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_input_closed_detection() {
		assert!(RemoteError::from(ProtocolError::InputClosed).is_input_closed());
		assert!(!RemoteError::NotAuthenticated.is_input_closed());
	}

	#[test]
	fn test_error_chain_lists_causes() {
		let err = RemoteError::from(StoreError::Io(io::Error::new(io::ErrorKind::Other, "disk gone")));
		let text = error_chain(&err);
		let lines: Vec<_> = text.lines().collect();
		assert_eq!(lines, vec!["error: I/O error: disk gone", "caused by: disk gone"]);
	}

	#[test]
	fn test_error_chain_no_repeated_lines() {
		let err = RemoteError::from(StoreError::Timeout("upload chunk after 30s".into()));
		assert_eq!(error_chain(&err), "error: timed out: upload chunk after 30s");
		let err = RemoteError::from(ProtocolError::Violation("bad reply".into()));
		assert_eq!(error_chain(&err), "error: Protocol violation: bad reply");
	}
}

// vim: ts=4
