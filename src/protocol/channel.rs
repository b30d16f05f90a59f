//! Half-duplex conversation with the git-annex host
//!
//! [`Channel`] owns both ends of the stdio pipe. Every response is written
//! and flushed on its own so the host, which blocks waiting for exactly one
//! line, never stalls on our buffering. Requests we make to the host
//! (`GETCONFIG`, `GETCREDS`, ...) are answered synchronously before the
//! current command continues.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::codec::{encode, Request};
use super::error::ProtocolError;
use crate::logging::*;

/// Protocol version announced in the handshake
pub const PROTOCOL_VERSION: u32 = 1;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Line channel to the host
pub struct Channel<R, W> {
	reader: R,
	writer: W,
	line: String,
}

impl<R, W> Channel<R, W>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	pub fn new(reader: R, writer: W) -> Self {
		Self { reader, writer, line: String::new() }
	}

	/// Give back the response stream (used by tests to inspect the output)
	pub fn into_writer(self) -> W {
		self.writer
	}

	/// Read one request line.
	///
	/// A read returning no data means the host closed the stream and yields
	/// [`ProtocolError::InputClosed`].
	pub async fn recv(&mut self) -> ProtocolResult<Request> {
		self.line.clear();
		let n = self.reader.read_line(&mut self.line).await?;
		if n == 0 {
			return Err(ProtocolError::InputClosed);
		}
		let req = Request::parse(&self.line);
		trace_line("<-", &self.line);
		Ok(req)
	}

	/// Write one response line and flush it
	pub async fn send<S: AsRef<str>>(&mut self, command: &str, args: &[S]) -> ProtocolResult<()> {
		let line = encode(command, args);
		trace_line("->", &line);
		self.writer.write_all(line.as_bytes()).await?;
		self.writer.flush().await?;
		Ok(())
	}

	pub async fn send_version(&mut self) -> ProtocolResult<()> {
		self.send("VERSION", &[PROTOCOL_VERSION.to_string()]).await
	}

	/// Send a `DEBUG` line per line of `text`
	pub async fn debug(&mut self, text: &str) -> ProtocolResult<()> {
		for line in text.lines() {
			debug!("{}", line);
			self.send("DEBUG", &[line]).await?;
		}
		Ok(())
	}

	pub async fn progress(&mut self, bytes: u64) -> ProtocolResult<()> {
		self.send("PROGRESS", &[bytes.to_string()]).await
	}

	pub async fn set_url_present(&mut self, key: &str, url: &str) -> ProtocolResult<()> {
		self.send("SETURLPRESENT", &[key, url]).await
	}

	pub async fn set_url_missing(&mut self, key: &str, url: &str) -> ProtocolResult<()> {
		self.send("SETURLMISSING", &[key, url]).await
	}

	/// Issue a request answered by a single `VALUE [<val>]` line.
	///
	/// An empty value means "not set"; the caller decides whether that is
	/// an error or falls back to a default.
	pub async fn get_value(&mut self, command: &str, args: &[&str]) -> ProtocolResult<Option<String>> {
		self.send(command, args).await?;
		let reply = self.recv().await?;
		expect_keyword(&reply, "VALUE")?;
		if reply.args.is_empty() {
			Ok(None)
		} else {
			Ok(Some(reply.args))
		}
	}

	pub async fn get_uuid(&mut self) -> ProtocolResult<Option<String>> {
		self.get_value("GETUUID", &[]).await
	}

	pub async fn get_config(&mut self, setting: &str) -> ProtocolResult<Option<String>> {
		self.get_value("GETCONFIG", &[setting]).await
	}

	/// `GETCREDS <setting>`, answered by `CREDS <id> <secret>`.
	///
	/// Returns `None` when either half is empty.
	pub async fn get_creds(&mut self, setting: &str) -> ProtocolResult<Option<(String, String)>> {
		self.send("GETCREDS", &[setting]).await?;
		let reply = self.recv().await?;
		expect_keyword(&reply, "CREDS")?;
		let (identity, secret) = reply.args.split_once(' ').unwrap_or((reply.args.as_str(), ""));
		if identity.is_empty() || secret.is_empty() {
			return Ok(None);
		}
		Ok(Some((identity.to_string(), secret.to_string())))
	}

	/// `SETCREDS <setting> <id> <secret>`; no reply is expected
	pub async fn set_creds(&mut self, setting: &str, identity: &str, secret: &str) -> ProtocolResult<()> {
		for arg in [setting, identity] {
			if arg.is_empty() || arg.contains([' ', '\n']) {
				return Err(ProtocolError::Violation(format!(
					"credential field {:?} cannot be sent on one line",
					arg
				)));
			}
		}
		if secret.contains('\n') {
			return Err("credential secret contains a newline".into());
		}
		self.send("SETCREDS", &[setting, identity, secret]).await
	}

	/// `GETURLS <key> <prefix>`; collects `VALUE <url>` lines up to a bare `VALUE`
	pub async fn get_urls(&mut self, key: &str, prefix: &str) -> ProtocolResult<Vec<String>> {
		self.send("GETURLS", &[key, prefix]).await?;
		let mut urls = Vec::new();
		loop {
			let reply = self.recv().await?;
			expect_keyword(&reply, "VALUE")?;
			if reply.args.is_empty() {
				return Ok(urls);
			}
			urls.push(reply.args);
		}
	}
}

fn expect_keyword(reply: &Request, expected: &'static str) -> ProtocolResult<()> {
	if reply.command.eq_ignore_ascii_case(expected) {
		Ok(())
	} else {
		Err(ProtocolError::UnexpectedReply { expected, got: reply.command.clone() })
	}
}

fn trace_line(direction: &str, line: &str) {
	tracing::trace!("{} {}", direction, line.trim_end());
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	fn channel(input: &str) -> Channel<Cursor<Vec<u8>>, Vec<u8>> {
		Channel::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
	}

	fn output(chan: Channel<Cursor<Vec<u8>>, Vec<u8>>) -> String {
		String::from_utf8(chan.into_writer()).unwrap()
	}

	#[tokio::test]
	async fn test_recv_until_closed() {
		let mut chan = channel("PREPARE\nGETCOST\n");
		assert_eq!(chan.recv().await.unwrap().command, "PREPARE");
		assert_eq!(chan.recv().await.unwrap().command, "GETCOST");
		assert!(matches!(chan.recv().await, Err(ProtocolError::InputClosed)));
	}

	#[tokio::test]
	async fn test_get_config_value_and_missing() {
		let mut chan = channel("VALUE my-project\nVALUE\n");
		assert_eq!(chan.get_config("project").await.unwrap().as_deref(), Some("my-project"));
		assert_eq!(chan.get_config("bucket").await.unwrap(), None);
		assert_eq!(output(chan), "GETCONFIG project\nGETCONFIG bucket\n");
	}

	#[tokio::test]
	async fn test_get_value_wrong_keyword() {
		let mut chan = channel("CREDS a b\n");
		let err = chan.get_uuid().await.unwrap_err();
		assert!(matches!(err, ProtocolError::UnexpectedReply { expected: "VALUE", .. }));
	}

	#[tokio::test]
	async fn test_get_creds() {
		let mut chan = channel("CREDS svc@example.com line1*line2\nCREDS  \nCREDS\n");
		let creds = chan.get_creds("u-creds-v1").await.unwrap();
		assert_eq!(creds, Some(("svc@example.com".to_string(), "line1*line2".to_string())));
		assert_eq!(chan.get_creds("u-creds-v1").await.unwrap(), None);
		assert_eq!(chan.get_creds("u-creds-v1").await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_get_urls() {
		let mut chan = channel("VALUE https://a/1\nVALUE https://a/2\nVALUE\n");
		let urls = chan.get_urls("KEY", "https://a/").await.unwrap();
		assert_eq!(urls, vec!["https://a/1", "https://a/2"]);
		assert_eq!(output(chan), "GETURLS KEY https://a/\n");
	}

	#[tokio::test]
	async fn test_debug_splits_lines() {
		let mut chan = channel("");
		chan.debug("first\nsecond").await.unwrap();
		assert_eq!(output(chan), "DEBUG first\nDEBUG second\n");
	}

	#[tokio::test]
	async fn test_set_creds_rejects_newline() {
		let mut chan = channel("");
		assert!(chan.set_creds("s", "id", "a\nb").await.is_err());
		chan.set_creds("s", "id", "a*b").await.unwrap();
		assert_eq!(output(chan), "SETCREDS s id a*b\n");
	}
}

// vim: ts=4
