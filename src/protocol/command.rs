//! The closed set of commands the host may send
//!
//! Each command declares its arity and how its failures are reported back
//! to the host. Lookup is built once and never consults anything at
//! runtime beyond the command name.

use super::codec::split_args;
use super::error::ProtocolError;

/// Commands understood by the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	InitRemote,
	Prepare,
	Transfer,
	CheckPresent,
	Remove,
	GetCost,
	Error,
}

/// Response sent when a command fails.
///
/// `echo` selects which of the command's arguments precede the error
/// message, by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureReply {
	pub command: &'static str,
	pub echo: &'static [usize],
}

const TABLE: &[(&str, Command)] = &[
	("INITREMOTE", Command::InitRemote),
	("PREPARE", Command::Prepare),
	("TRANSFER", Command::Transfer),
	("CHECKPRESENT", Command::CheckPresent),
	("REMOVE", Command::Remove),
	("GETCOST", Command::GetCost),
	("ERROR", Command::Error),
];

impl Command {
	/// Resolve a command name. Matching is case-insensitive and leading
	/// underscores are ignored.
	pub fn lookup(name: &str) -> Option<Command> {
		let name = name.trim_start_matches('_');
		TABLE.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, cmd)| *cmd)
	}

	pub fn name(self) -> &'static str {
		TABLE.iter().find(|(_, cmd)| *cmd == self).map(|(n, _)| *n).unwrap_or("UNKNOWN")
	}

	/// Number of arguments the handler takes
	pub fn arity(self) -> usize {
		match self {
			Command::InitRemote | Command::Prepare | Command::GetCost => 0,
			Command::CheckPresent | Command::Remove | Command::Error => 1,
			Command::Transfer => 3,
		}
	}

	/// How a failure of this command is reported
	pub fn failure(self) -> FailureReply {
		match self {
			Command::InitRemote => FailureReply { command: "INITREMOTE-FAILURE", echo: &[] },
			Command::Prepare => FailureReply { command: "PREPARE-FAILURE", echo: &[] },
			Command::Transfer => FailureReply { command: "TRANSFER-FAILURE", echo: &[0, 1] },
			Command::CheckPresent => {
				FailureReply { command: "CHECKPRESENT-UNKNOWN", echo: &[0] }
			}
			Command::Remove => FailureReply { command: "REMOVE-FAILURE", echo: &[0] },
			Command::GetCost | Command::Error => FailureReply { command: "ERROR", echo: &[] },
		}
	}

	/// Whether a failure of this command ends the run loop
	pub fn is_fatal(self) -> bool {
		matches!(self, Command::Error)
	}

	/// Split the raw argument string according to the declared arity
	pub fn split(self, args: &str) -> Result<Vec<String>, ProtocolError> {
		split_args(self.name(), args, self.arity())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_lookup_case_insensitive() {
		assert_eq!(Command::lookup("TRANSFER"), Some(Command::Transfer));
		assert_eq!(Command::lookup("checkpresent"), Some(Command::CheckPresent));
		assert_eq!(Command::lookup("_Prepare"), Some(Command::Prepare));
	}

	#[test]
	fn test_lookup_unknown() {
		assert_eq!(Command::lookup("WHEREIS"), None);
		assert_eq!(Command::lookup(""), None);
		assert_eq!(Command::lookup("VERSION"), None);
	}

	#[test]
	fn test_name_roundtrips_through_lookup() {
		for (name, cmd) in TABLE {
			assert_eq!(cmd.name(), *name);
			assert_eq!(Command::lookup(name), Some(*cmd));
		}
	}

	#[test]
	fn test_split_by_arity() {
		let argv = Command::Transfer.split("STORE KEY /path with space").unwrap();
		assert_eq!(argv, vec!["STORE", "KEY", "/path with space"]);
		assert_eq!(Command::Remove.split("").unwrap(), vec![""]);
		assert!(Command::GetCost.split("extra").is_err());
	}

	#[test]
	fn test_failure_echo_positions() {
		assert_eq!(Command::Transfer.failure().echo, &[0, 1]);
		assert_eq!(Command::Remove.failure().command, "REMOVE-FAILURE");
		assert!(Command::Error.is_fatal());
		assert!(!Command::Transfer.is_fatal());
	}
}

// vim: ts=4
