//! Run loop
//!
//! Announces the protocol version, checks that the object store can be
//! used at all, then reads and handles one request at a time until the
//! host closes the stream. Command failures are relayed by the command's
//! own failure response and the loop carries on; anything else ends the
//! run with a generic `ERROR`.

use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::error::RemoteError;
use crate::logging::*;
use crate::protocol::{Command, Request};
use crate::relay::{relay_failure, GENERIC_FAILURE};
use crate::remote::Remote;

/// Serve the host until it closes the request stream.
///
/// Returns `Ok` on a clean shutdown. Any other outcome has already been
/// reported to the host as `ERROR <message>` when it is returned.
pub async fn serve<R, W>(remote: &mut Remote<R, W>) -> Result<(), RemoteError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	match run(remote).await {
		Err(e) if e.is_input_closed() => {
			info!("Input closed, shutting down");
			Ok(())
		}
		Err(e) => {
			error!("Fatal: {}", e);
			if let Err(relay_err) = relay_failure(&mut remote.chan, GENERIC_FAILURE, &[], &e).await {
				debug!("Could not report fatal error: {}", relay_err);
			}
			Err(e)
		}
		Ok(()) => Ok(()),
	}
}

async fn run<R, W>(remote: &mut Remote<R, W>) -> Result<(), RemoteError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	remote.chan.send_version().await?;
	remote.self_test()?;
	loop {
		let request = remote.chan.recv().await?;
		remote.handle(request).await?;
	}
}

impl<R, W> Remote<R, W>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	/// Handle one request. Errors returned from here end the run loop.
	pub async fn handle(&mut self, request: Request) -> Result<(), RemoteError> {
		let command = match Command::lookup(&request.command) {
			Some(command) => command,
			None => {
				debug!("Unsupported request {:?}", request.command);
				self.chan.send::<&str>("UNSUPPORTED-REQUEST", &[]).await?;
				return Ok(());
			}
		};
		let argv = command.split(&request.args)?;

		match self.dispatch(command, &argv).await {
			Ok(()) => Ok(()),
			Err(e) if e.is_input_closed() || command.is_fatal() => Err(e),
			Err(e) => {
				relay_failure(&mut self.chan, command.failure(), &argv, &e).await?;
				Ok(())
			}
		}
	}

	async fn dispatch(&mut self, command: Command, argv: &[String]) -> Result<(), RemoteError> {
		match (command, argv) {
			(Command::InitRemote, []) => self.init_remote().await,
			(Command::Prepare, []) => self.prepare().await,
			(Command::Transfer, [subcommand, key, file]) => self.transfer(subcommand, key, file).await,
			(Command::CheckPresent, [key]) => self.check_present(key).await,
			(Command::Remove, [key]) => self.remove(key).await,
			(Command::GetCost, []) => self.get_cost().await,
			(Command::Error, [message]) => Err(RemoteError::Host { message: message.clone() }),
			(command, _) => Err(crate::protocol::ProtocolError::Arity {
				command: command.name().to_string(),
				expected: command.arity(),
			}
			.into()),
		}
	}
}

// vim: ts=4
