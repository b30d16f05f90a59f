//! Error relay
//!
//! Turns a failed command into its failure response. The full error chain
//! goes to the host's debug channel, one `DEBUG` line per line; the failure
//! response itself carries only the echoed arguments and a one-line
//! summary.

use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::error::{error_chain, RemoteError};
use crate::logging::*;
use crate::protocol::{Channel, FailureReply, ProtocolResult};

/// Failure reply for errors outside of any single command
pub const GENERIC_FAILURE: FailureReply = FailureReply { command: "ERROR", echo: &[] };

/// Single-line summary of an error for the failure response
pub fn summary(err: &RemoteError) -> String {
	err.to_string().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Report `err` to the host as `reply`, echoing the selected arguments of
/// the failed command.
pub async fn relay_failure<R, W>(
	chan: &mut Channel<R, W>,
	reply: FailureReply,
	argv: &[String],
	err: &RemoteError,
) -> ProtocolResult<()>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	warn!("{} failed: {}", reply.command, err);
	chan.debug(&error_chain(err)).await?;

	let mut args: Vec<String> = reply.echo.iter().filter_map(|&i| argv.get(i).cloned()).collect();
	args.push(summary(err));
	chan.send(reply.command, &args).await
}


// vim: ts=4
