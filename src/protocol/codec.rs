//! Line framing for the external special remote protocol
//!
//! A request line is `COMMAND[ rest]`. The rest of the line is kept raw
//! until a handler declares how many arguments it takes, see [`split_args`].
//! A response is the command followed by its arguments joined by single
//! spaces. No escaping exists, so only the last argument of a line may
//! contain spaces.

use super::error::ProtocolError;

/// A single decoded request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
	pub command: String,
	pub args: String,
}

impl Request {
	/// Decode a line as read from the stream (trailing `\r\n` allowed)
	pub fn parse(line: &str) -> Self {
		let line = line.trim_end_matches(['\r', '\n']);
		match line.split_once(' ') {
			Some((command, args)) => {
				Request { command: command.to_string(), args: args.to_string() }
			}
			None => Request { command: line.to_string(), args: String::new() },
		}
	}
}

/// Split a raw argument string into exactly `argc` arguments.
///
/// The first `argc - 1` arguments are space delimited, the last one takes
/// the remainder of the line verbatim. With `argc == 0` the argument string
/// must be empty.
pub fn split_args(command: &str, args: &str, argc: usize) -> Result<Vec<String>, ProtocolError> {
	if argc == 0 {
		if !args.is_empty() {
			return Err(ProtocolError::Arity { command: command.to_string(), expected: 0 });
		}
		return Ok(Vec::new());
	}

	let argv: Vec<String> = args.splitn(argc, ' ').map(str::to_string).collect();
	if argv.len() < argc {
		return Err(ProtocolError::Arity { command: command.to_string(), expected: argc });
	}
	Ok(argv)
}

/// Encode a response line, including the terminating newline
pub fn encode<S: AsRef<str>>(command: &str, args: &[S]) -> String {
	let mut line = String::from(command);
	for arg in args {
		line.push(' ');
		line.push_str(arg.as_ref());
	}
	line.push('\n');
	line
}


// vim: ts=4
