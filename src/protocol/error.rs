//! Protocol error types
//!
//! Errors raised while reading or writing the line protocol spoken with
//! git-annex. `InputClosed` is not a failure in the usual sense: it marks
//! the end of the conversation and terminates the run loop cleanly.

use std::fmt;
use std::io;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// I/O error on the request or response stream
	Io(io::Error),
	/// The host closed its end of the request stream
	InputClosed,
	/// The host answered a request with an unexpected keyword
	UnexpectedReply { expected: &'static str, got: String },
	/// A request carried fewer (or more) arguments than its handler declares
	Arity { command: String, expected: usize },
	/// Protocol violation (malformed value, unencodable argument, ...)
	Violation(String),
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::InputClosed => write!(f, "Input stream closed"),
			ProtocolError::UnexpectedReply { expected, got } => {
				write!(f, "Response not {}: {}", expected, got)
			}
			ProtocolError::Arity { command, expected } => {
				write!(f, "Wrong number of arguments for {} (expected {})", command, expected)
			}
			ProtocolError::Violation(msg) => write!(f, "Protocol violation: {}", msg),
		}
	}
}

impl std::error::Error for ProtocolError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			ProtocolError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		ProtocolError::Io(e)
	}
}

impl From<&str> for ProtocolError {
	fn from(e: &str) -> Self {
		ProtocolError::Violation(e.to_string())
	}
}

// vim: ts=4
