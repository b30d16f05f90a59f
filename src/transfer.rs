//! Transfer engine: STORE, RETRIEVE, CHECKPRESENT and REMOVE
//!
//! Objects move in fixed-size chunks. Each chunk is one network call wrapped
//! in the retry policy, so a timeout costs one chunk rather than the whole
//! object, and progress is reported to the host between chunks. Uploads
//! resume from the byte count the store reports as persisted, which may
//! fall short of what was sent.

use std::io::{self, SeekFrom};
use std::path::Path;
use tokio::fs as afs;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use crate::config::Settings;
use crate::error::RemoteError;
use crate::logging::*;
use crate::progress::ProgressTracker;
use crate::protocol::Channel;
use crate::remote::Remote;
use crate::retry::RetryPolicy;
use crate::store::{Lookup, ObjectStore, StoreError, UploadSession};

/// Settings and store of an authenticated session
fn ready<'a>(
	settings: &'a Option<Settings>,
	store: &'a Option<Box<dyn ObjectStore>>,
) -> Result<(&'a Settings, &'a dyn ObjectStore), RemoteError> {
	let store = store.as_deref().ok_or(RemoteError::NotAuthenticated)?;
	let settings = settings.as_ref().ok_or(RemoteError::NotInitialized)?;
	Ok((settings, store))
}

/// Fill `buf` from `reader`, stopping early only at end of file
async fn read_chunk<F: AsyncRead + Unpin>(reader: &mut F, buf: &mut [u8]) -> io::Result<usize> {
	let mut filled = 0;
	while filled < buf.len() {
		let n = reader.read(&mut buf[filled..]).await?;
		if n == 0 {
			break;
		}
		filled += n;
	}
	Ok(filled)
}

/// The persisted count after sending `sent` bytes at `offset` must lie
/// within the chunk and move forward
fn check_persisted(offset: u64, sent: usize, persisted: u64) -> Result<(), RemoteError> {
	let end = offset + sent as u64;
	if persisted < offset || persisted > end || (persisted == offset && sent > 0) {
		return Err(StoreError::Other(format!(
			"store reported {} bytes persisted for chunk {}..{}",
			persisted, offset, end
		))
		.into());
	}
	Ok(())
}

/// Send `total` bytes of `file` through `session`, one retried call per chunk
async fn send_chunks<R, W>(
	chan: &mut Channel<R, W>,
	policy: &RetryPolicy,
	store: &dyn ObjectStore,
	session: &UploadSession,
	file: &mut afs::File,
	total: u64,
	chunk_size: usize,
) -> Result<(), RemoteError>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let mut progress = ProgressTracker::new(total);
	let mut buf = vec![0u8; chunk_size];
	let mut offset = 0u64;
	loop {
		let want = (chunk_size as u64).min(total - offset) as usize;
		let n = read_chunk(file, &mut buf[..want]).await?;
		if n < want {
			return Err(RemoteError::Io(io::Error::new(
				io::ErrorKind::UnexpectedEof,
				format!("source of {} shrank during upload", session.object),
			)));
		}
		let chunk = &buf[..n];
		let persisted = policy.run(chan, move || store.upload_chunk(session, offset, chunk)).await?;
		check_persisted(offset, n, persisted)?;
		if let Some(bytes) = progress.advance(persisted) {
			chan.progress(bytes).await?;
		}
		if persisted >= total {
			return Ok(());
		}
		if persisted < offset + n as u64 {
			debug!("Store kept {} of {} bytes at {}, resending the rest", persisted - offset, n, offset);
			file.seek(SeekFrom::Start(persisted)).await?;
		}
		offset = persisted;
	}
}

impl<R, W> Remote<R, W>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	/// TRANSFER STORE|RETRIEVE <key> <file>
	pub async fn transfer(&mut self, subcommand: &str, key: &str, file: &str) -> Result<(), RemoteError> {
		match subcommand.to_ascii_uppercase().as_str() {
			"STORE" => self.store_object(key, Path::new(file)).await?,
			"RETRIEVE" => self.retrieve_object(key, Path::new(file)).await?,
			_ => {
				return Err(RemoteError::UnsupportedTransfer { subcommand: subcommand.to_string() })
			}
		}
		self.chan.send("TRANSFER-SUCCESS", &[subcommand, key]).await?;
		Ok(())
	}

	/// Upload a local file under `key` with a resumable, chunked upload
	pub async fn store_object(&mut self, key: &str, path: &Path) -> Result<(), RemoteError> {
		let (settings, store) = ready(&self.settings, &self.store)?;
		let mut file = afs::File::open(path).await?;
		let total = file.metadata().await?.len();
		let object = settings.object_name(key);
		let acl = settings.object_acl();

		let (bucket, object_ref, acl_ref) = (settings.bucket.as_str(), object.as_str(), acl.as_slice());
		let session = self
			.policy
			.run(&mut self.chan, move || store.begin_upload(bucket, object_ref, total, acl_ref))
			.await?;
		debug!("Storing {} ({} bytes) as {}", key, total, object);

		let sent =
			send_chunks(&mut self.chan, &self.policy, store, &session, &mut file, total, self.config.chunk_size)
				.await;
		if let Err(e) = sent {
			if let Err(abort_err) = store.abort_upload(&session).await {
				warn!("Could not abort upload of {}: {}", object, abort_err);
			}
			return Err(e);
		}

		if settings.public {
			let url = store.public_url(&settings.bucket, &object);
			self.chan.set_url_present(key, &url).await?;
		}
		Ok(())
	}

	/// Download the object stored under `key` into a new local file
	pub async fn retrieve_object(&mut self, key: &str, path: &Path) -> Result<(), RemoteError> {
		let (settings, store) = ready(&self.settings, &self.store)?;
		let object = settings.object_name(key);
		let (bucket, object_ref) = (settings.bucket.as_str(), object.as_str());

		let lookup = self.policy.run(&mut self.chan, move || store.stat(bucket, object_ref)).await?;
		let total = match lookup {
			Lookup::Found(meta) => meta.size,
			Lookup::NotFound => return Err(RemoteError::NotFound { object }),
		};
		debug!("Retrieving {} ({} bytes) from {}", key, total, object);

		let mut file = afs::File::create(path).await?;
		let mut progress = ProgressTracker::new(total);
		let chunk_size = self.config.chunk_size as u64;
		let mut offset = 0u64;
		while offset < total {
			let len = chunk_size.min(total - offset) as usize;
			let data = self
				.policy
				.run(&mut self.chan, move || store.read_range(bucket, object_ref, offset, len))
				.await?;
			if data.is_empty() {
				return Err(RemoteError::Io(io::Error::new(
					io::ErrorKind::UnexpectedEof,
					format!("{} ended after {} of {} bytes", object, offset, total),
				)));
			}
			file.write_all(&data).await?;
			offset += data.len() as u64;
			if let Some(bytes) = progress.advance(offset) {
				self.chan.progress(bytes).await?;
			}
		}
		file.flush().await?;
		file.sync_all().await?;
		Ok(())
	}

	/// CHECKPRESENT <key>
	pub async fn check_present(&mut self, key: &str) -> Result<(), RemoteError> {
		let (settings, store) = ready(&self.settings, &self.store)?;
		let object = settings.object_name(key);
		let (bucket, object_ref) = (settings.bucket.as_str(), object.as_str());

		let lookup = self.policy.run(&mut self.chan, move || store.stat(bucket, object_ref)).await?;
		match lookup {
			Lookup::Found(_) => self.chan.send("CHECKPRESENT-SUCCESS", &[key]).await?,
			Lookup::NotFound => {
				let url = store.public_url(bucket, &object);
				self.chan.set_url_missing(key, &url).await?;
				self.chan.send("CHECKPRESENT-FAILURE", &[key]).await?;
			}
		}
		Ok(())
	}

	/// REMOVE <key>; removing an absent object succeeds
	pub async fn remove(&mut self, key: &str) -> Result<(), RemoteError> {
		let (settings, store) = ready(&self.settings, &self.store)?;
		let object = settings.object_name(key);
		let (bucket, object_ref) = (settings.bucket.as_str(), object.as_str());

		let lookup = self.policy.run(&mut self.chan, move || store.delete(bucket, object_ref)).await?;
		if lookup == Lookup::NotFound {
			debug!("{} was already absent", object);
		}
		let url = store.public_url(bucket, &object);
		self.chan.set_url_missing(key, &url).await?;
		self.chan.send("REMOVE-SUCCESS", &[key]).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::RemoteConfig;
	use crate::retry::RetryPolicy;
	use crate::store::{MemoryStore, StoreError};
	use std::io::Cursor;
	use std::time::Duration;
	use tempfile::TempDir;

	type TestRemote = Remote<Cursor<Vec<u8>>, Vec<u8>>;

	const PREPARE: &str =
		"VALUE u1\nVALUE proj\nVALUE\nVALUE\nVALUE annex\nVALUE bkt\nVALUE\nVALUE pre/\nCREDS sa key\n";

	async fn prepared(store: &MemoryStore, chunk_size: usize) -> TestRemote {
		store.add_bucket("bkt", "US", "STANDARD");
		let config = RemoteConfig { chunk_size, ..RemoteConfig::default() };
		let mut remote =
			Remote::new(Cursor::new(PREPARE.as_bytes().to_vec()), Vec::new(), config, Box::new(store.clone()))
				.with_retry_policy(RetryPolicy::new(4, Duration::from_millis(1), Duration::from_millis(2)));
		remote.init().await.unwrap();
		remote.authenticate().await.unwrap();
		remote
	}

	fn lines(remote: TestRemote) -> Vec<String> {
		String::from_utf8(remote.into_writer())
			.unwrap()
			.lines()
			.filter(|l| !l.starts_with("GET"))
			.map(str::to_string)
			.collect()
	}

	#[tokio::test]
	async fn test_store_in_chunks_with_progress() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("content");
		let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
		std::fs::write(&path, &data).unwrap();

		let store = MemoryStore::new();
		let mut remote = prepared(&store, 100).await;
		remote.store_object("KEY", &path).await.unwrap();

		assert_eq!(store.object("bkt", "pre/KEY").unwrap(), data);
		let progress: Vec<u64> = lines(remote)
			.iter()
			.filter_map(|l| l.strip_prefix("PROGRESS "))
			.map(|v| v.parse().unwrap())
			.collect();
		assert_eq!(progress, vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000]);
	}

	#[tokio::test]
	async fn test_store_retries_timed_out_chunk() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("content");
		std::fs::write(&path, b"abcdefghij").unwrap();

		let store = MemoryStore::new();
		let mut remote = prepared(&store, 4).await;
		// begin_upload times out twice before it gets through
		store.inject_faults(vec![StoreError::Timeout("begin".into()), StoreError::Timeout("again".into())]);
		remote.store_object("KEY", &path).await.unwrap();
		assert_eq!(store.object("bkt", "pre/KEY").unwrap(), b"abcdefghij");
		let debug: Vec<String> = lines(remote).into_iter().filter(|l| l.starts_with("DEBUG ")).collect();
		assert_eq!(debug.len(), 2);
		assert!(debug[0].contains("retrying in 1ms"));
		assert!(debug[1].contains("retrying in 2ms"));
	}

	fn progress_values(out: &[String]) -> Vec<u64> {
		out.iter().filter_map(|l| l.strip_prefix("PROGRESS ")).map(|v| v.parse().unwrap()).collect()
	}

	fn retry_notices(out: &[String]) -> usize {
		out.iter().filter(|l| l.starts_with("DEBUG ") && l.contains("retrying in")).count()
	}

	#[tokio::test]
	async fn test_store_resumes_from_persisted_count() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("content");
		std::fs::write(&path, b"0123456789ab").unwrap();

		let store = MemoryStore::new();
		let mut remote = prepared(&store, 4).await;
		// calls: begin_upload, then one per chunk; the second chunk is half kept
		store.short_write_at(store.calls() + 3, 2);
		remote.store_object("KEY", &path).await.unwrap();

		assert_eq!(store.object("bkt", "pre/KEY").unwrap(), b"0123456789ab");
		assert_eq!(progress_values(&lines(remote)), vec![4, 6, 10, 12]);
	}

	#[tokio::test]
	async fn test_store_retries_timeout_mid_object() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("content");
		std::fs::write(&path, b"0123456789ab").unwrap();

		let store = MemoryStore::new();
		let mut remote = prepared(&store, 4).await;
		let base = store.calls();
		store.inject_fault_at(base + 3, StoreError::Timeout("second chunk".into()));
		remote.store_object("KEY", &path).await.unwrap();

		assert_eq!(store.object("bkt", "pre/KEY").unwrap(), b"0123456789ab");
		// begin, three chunks and one resend of the second
		assert_eq!(store.calls() - base, 5);
		let out = lines(remote);
		assert_eq!(retry_notices(&out), 1);
		assert_eq!(progress_values(&out), vec![4, 8, 12]);
	}

	#[tokio::test]
	async fn test_retrieve_retries_timeout_mid_object() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("out");
		let store = MemoryStore::new();
		let mut remote = prepared(&store, 3).await;
		store.put_object("bkt", "pre/KEY", b"0123456789");
		// calls: stat, then one read per chunk
		store.inject_fault_at(store.calls() + 3, StoreError::Timeout("second read".into()));

		remote.retrieve_object("KEY", &path).await.unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
		let out = lines(remote);
		assert_eq!(retry_notices(&out), 1);
		assert_eq!(progress_values(&out), vec![3, 6, 9, 10]);
	}

	#[tokio::test]
	async fn test_failed_store_aborts_upload() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("content");
		std::fs::write(&path, b"0123456789ab").unwrap();

		let store = MemoryStore::new();
		let mut remote = prepared(&store, 4).await;
		store.inject_fault_at(store.calls() + 3, StoreError::PermissionDenied("quota".into()));
		let err = remote.store_object("KEY", &path).await.unwrap_err();
		assert!(matches!(err, RemoteError::Store(StoreError::PermissionDenied(_))));
		assert_eq!(store.pending_uploads(), 0);
		assert_eq!(store.object("bkt", "pre/KEY"), None);
	}

	#[test]
	fn test_persisted_count_bounds() {
		assert!(check_persisted(0, 4, 4).is_ok());
		assert!(check_persisted(4, 4, 6).is_ok());
		assert!(check_persisted(0, 0, 0).is_ok());
		assert!(check_persisted(4, 4, 9).is_err());
		assert!(check_persisted(4, 4, 3).is_err());
		assert!(check_persisted(4, 4, 4).is_err());
	}

	#[tokio::test]
	async fn test_store_public_sets_url() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("content");
		std::fs::write(&path, b"x").unwrap();

		let store = MemoryStore::new();
		let mut remote = prepared(&store, 4).await;
		if let Some(settings) = remote.settings.as_mut() {
			settings.public = true;
		}
		remote.store_object("KEY", &path).await.unwrap();
		let acl = store.object_acl("bkt", "pre/KEY").unwrap();
		assert!(acl.iter().any(|e| e.entity == "allUsers"));
		assert!(lines(remote).contains(
			&"SETURLPRESENT KEY https://storage-download.googleapis.com/bkt/pre/KEY".to_string()
		));
	}

	#[tokio::test]
	async fn test_store_empty_file() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("empty");
		std::fs::write(&path, b"").unwrap();

		let store = MemoryStore::new();
		let mut remote = prepared(&store, 4).await;
		remote.store_object("KEY", &path).await.unwrap();
		assert_eq!(store.object("bkt", "pre/KEY").unwrap(), b"");
		assert!(lines(remote).iter().all(|l| !l.starts_with("PROGRESS")));
	}

	#[tokio::test]
	async fn test_retrieve_in_chunks() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("out");
		let store = MemoryStore::new();
		let mut remote = prepared(&store, 3).await;
		store.put_object("bkt", "pre/KEY", b"0123456789");
		store.inject_faults(vec![StoreError::Tls { message: "read timed out".into(), timeout: true }]);

		remote.retrieve_object("KEY", &path).await.unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
		let out = lines(remote);
		let progress: Vec<&str> = out.iter().filter_map(|l| l.strip_prefix("PROGRESS ")).collect();
		assert_eq!(progress, vec!["3", "6", "9", "10"]);
	}

	#[tokio::test]
	async fn test_retrieve_missing_object() {
		let dir = TempDir::new().unwrap();
		let store = MemoryStore::new();
		let mut remote = prepared(&store, 3).await;
		let err = remote.retrieve_object("NOPE", &dir.path().join("out")).await.unwrap_err();
		assert!(matches!(err, RemoteError::NotFound { ref object } if object == "pre/NOPE"));
	}

	#[tokio::test]
	async fn test_unsupported_subcommand() {
		let store = MemoryStore::new();
		let mut remote = prepared(&store, 3).await;
		let err = remote.transfer("COPY", "KEY", "/tmp/x").await.unwrap_err();
		assert!(matches!(err, RemoteError::UnsupportedTransfer { .. }));
	}

	#[tokio::test]
	async fn test_check_present_and_remove() {
		let store = MemoryStore::new();
		let mut remote = prepared(&store, 3).await;
		store.put_object("bkt", "pre/KEY", b"data");

		remote.check_present("KEY").await.unwrap();
		remote.remove("KEY").await.unwrap();
		remote.remove("KEY").await.unwrap();
		remote.check_present("KEY").await.unwrap();

		let url = "https://storage-download.googleapis.com/bkt/pre/KEY";
		assert_eq!(
			lines(remote),
			vec![
				"CHECKPRESENT-SUCCESS KEY".to_string(),
				format!("SETURLMISSING KEY {}", url),
				"REMOVE-SUCCESS KEY".to_string(),
				format!("SETURLMISSING KEY {}", url),
				"REMOVE-SUCCESS KEY".to_string(),
				format!("SETURLMISSING KEY {}", url),
				"CHECKPRESENT-FAILURE KEY".to_string(),
			]
		);
	}

	#[tokio::test]
	async fn test_remove_permission_denied_is_error() {
		let store = MemoryStore::new();
		let mut remote = prepared(&store, 3).await;
		store.inject_faults(vec![StoreError::PermissionDenied("delete".into())]);
		let err = remote.remove("KEY").await.unwrap_err();
		assert!(matches!(err, RemoteError::Store(StoreError::PermissionDenied(_))));
	}

	#[tokio::test]
	async fn test_requires_authentication() {
		let store = MemoryStore::new();
		let mut remote = Remote::new(
			Cursor::new(Vec::new()),
			Vec::new(),
			RemoteConfig::default(),
			Box::new(store.clone()),
		);
		assert!(matches!(remote.check_present("KEY").await, Err(RemoteError::NotAuthenticated)));
	}
}

// vim: ts=4
