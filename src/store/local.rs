//! Directory-backed object store
//!
//! Emulates buckets and objects on a local (or network mounted) directory:
//!
//! ```text
//! <root>/<bucket>/bucket.json          bucket record
//! <root>/<bucket>/objects/<name>       object data
//! <root>/<bucket>/acl/<name>.json      object ACL
//! <root>/<bucket>/uploads/<id>         resumable upload data
//! <root>/<bucket>/uploads/<id>.json    resumable upload record
//! ```
//!
//! Object names are percent-encoded into a single path component. Every
//! call is bounded by the per-call timeout and fails with
//! [`StoreError::Timeout`] when it takes longer. Starting an upload
//! discards earlier unfinished uploads of the same object, so an
//! interrupted transfer leaves nothing behind once it is retried.
//! Public objects are reported with `file://` URLs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs as afs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

use super::*;
use crate::credentials::Credentials;
use crate::logging::*;

const BUCKET_RECORD: &str = "bucket.json";
const OBJECTS_DIR: &str = "objects";
const ACL_DIR: &str = "acl";
const UPLOADS_DIR: &str = "uploads";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketRecord {
	project: String,
	#[serde(flatten)]
	info: BucketInfo,
}

#[derive(Debug, Serialize, Deserialize)]
struct UploadRecord {
	object: String,
	size: u64,
	acl: Vec<AclEntry>,
}

/// Object store rooted at a directory
#[derive(Debug, Clone)]
pub struct LocalStore {
	root: PathBuf,
	timeout: Duration,
}

impl LocalStore {
	pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
		Self { root: root.into(), timeout }
	}

	fn bucket_dir(&self, bucket: &str) -> StoreResult<PathBuf> {
		if bucket.is_empty() || bucket == "." || bucket == ".." || bucket.contains(['/', '\\']) {
			return Err(StoreError::Http { status: 400, message: format!("invalid bucket name {:?}", bucket) });
		}
		Ok(self.root.join(bucket))
	}

	fn object_path(&self, bucket: &str, object: &str) -> StoreResult<PathBuf> {
		Ok(self.bucket_dir(bucket)?.join(OBJECTS_DIR).join(encode_name(object)))
	}

	fn acl_path(&self, bucket: &str, object: &str) -> StoreResult<PathBuf> {
		Ok(self.bucket_dir(bucket)?.join(ACL_DIR).join(format!("{}.json", encode_name(object))))
	}

	fn upload_paths(&self, session: &UploadSession) -> StoreResult<(PathBuf, PathBuf)> {
		if Uuid::parse_str(&session.id).is_err() {
			return Err(StoreError::Other(format!("invalid upload session {}", session.id)));
		}
		let dir = self.bucket_dir(&session.bucket)?.join(UPLOADS_DIR);
		Ok((dir.join(&session.id), dir.join(format!("{}.json", session.id))))
	}

	/// Remove unfinished uploads of `object` left by earlier sessions
	async fn discard_stale_uploads(&self, bucket: &str, object: &str) -> StoreResult<()> {
		let mut entries = afs::read_dir(self.bucket_dir(bucket)?.join(UPLOADS_DIR)).await?;
		while let Some(entry) = entries.next_entry().await? {
			let record_path = entry.path();
			if record_path.extension().map_or(true, |ext| ext != "json") {
				continue;
			}
			let raw = match afs::read(&record_path).await {
				Ok(raw) => raw,
				Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
				Err(e) => return Err(e.into()),
			};
			let stale: UploadRecord = match serde_json::from_slice(&raw) {
				Ok(record) => record,
				Err(e) => {
					warn!("Skipping unreadable upload record {}: {}", record_path.display(), e);
					continue;
				}
			};
			if stale.object == object {
				remove_if_present(&record_path.with_extension("")).await?;
				remove_if_present(&record_path).await?;
				debug!("Discarded stale upload {}", record_path.display());
			}
		}
		Ok(())
	}

	/// Run one store call under the per-call timeout
	async fn bounded<T, F>(&self, what: &str, fut: F) -> StoreResult<T>
	where
		F: Future<Output = StoreResult<T>>,
	{
		match tokio::time::timeout(self.timeout, fut).await {
			Ok(result) => result,
			Err(_) => Err(StoreError::Timeout(format!("{} after {:?}", what, self.timeout))),
		}
	}
}

#[async_trait]
impl ObjectStore for LocalStore {
	async fn create_bucket(&self, spec: &BucketSpec) -> StoreResult<BucketCreation> {
		let dir = self.bucket_dir(&spec.name)?;
		self.bounded("create bucket", async {
			match afs::create_dir(&dir).await {
				Ok(()) => {}
				Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
					return Ok(BucketCreation::AlreadyExists);
				}
				Err(e) if e.kind() == io::ErrorKind::NotFound => {
					return Err(StoreError::Unavailable(format!(
						"store root {} does not exist",
						self.root.display()
					)));
				}
				Err(e) => return Err(e.into()),
			}
			for sub in [OBJECTS_DIR, ACL_DIR, UPLOADS_DIR] {
				afs::create_dir(dir.join(sub)).await?;
			}
			let record = BucketRecord {
				project: spec.project.clone(),
				info: BucketInfo {
					name: spec.name.clone(),
					location: spec.location.clone(),
					storage_class: spec.storage_class.clone(),
				},
			};
			afs::write(dir.join(BUCKET_RECORD), serde_json::to_vec_pretty(&record)?).await?;
			info!("Created bucket {} in {}", spec.name, spec.location);
			Ok(BucketCreation::Created)
		})
		.await
	}

	async fn bucket_info(&self, bucket: &str) -> StoreResult<BucketInfo> {
		let path = self.bucket_dir(bucket)?.join(BUCKET_RECORD);
		self.bounded("bucket info", async {
			let data = match afs::read(&path).await {
				Ok(data) => data,
				Err(e) if e.kind() == io::ErrorKind::NotFound => {
					return Err(StoreError::Http { status: 404, message: format!("no bucket {}", bucket) });
				}
				Err(e) => return Err(e.into()),
			};
			let record: BucketRecord = serde_json::from_slice(&data)?;
			Ok(record.info)
		})
		.await
	}

	async fn begin_upload(
		&self,
		bucket: &str,
		object: &str,
		size: u64,
		acl: &[AclEntry],
	) -> StoreResult<UploadSession> {
		let session =
			UploadSession { id: Uuid::new_v4().to_string(), bucket: bucket.to_string(), object: object.to_string() };
		let (data_path, record_path) = self.upload_paths(&session)?;
		self.bounded("begin upload", async {
			if !afs::try_exists(self.bucket_dir(bucket)?.join(BUCKET_RECORD)).await? {
				return Err(StoreError::Http { status: 404, message: format!("no bucket {}", bucket) });
			}
			self.discard_stale_uploads(bucket, object).await?;
			let record = UploadRecord { object: object.to_string(), size, acl: acl.to_vec() };
			afs::write(&record_path, serde_json::to_vec(&record)?).await?;
			afs::File::create(&data_path).await?;
			Ok(())
		})
		.await?;
		debug!("Upload {} started for {}/{} ({} bytes)", session.id, bucket, object, size);
		Ok(session)
	}

	async fn upload_chunk(&self, session: &UploadSession, offset: u64, data: &[u8]) -> StoreResult<u64> {
		let (data_path, record_path) = self.upload_paths(session)?;
		let object_path = self.object_path(&session.bucket, &session.object)?;
		let acl_path = self.acl_path(&session.bucket, &session.object)?;
		self.bounded("upload chunk", async {
			let record: UploadRecord = match afs::read(&record_path).await {
				Ok(raw) => serde_json::from_slice(&raw)?,
				Err(e) if e.kind() == io::ErrorKind::NotFound => {
					return Err(StoreError::Http {
						status: 404,
						message: format!("upload session {} not found", session.id),
					});
				}
				Err(e) => return Err(e.into()),
			};

			let mut file = afs::OpenOptions::new().write(true).open(&data_path).await?;
			let received = file.metadata().await?.len();
			if offset > received {
				return Err(StoreError::Other(format!(
					"chunk at {} leaves a gap after {} bytes",
					offset, received
				)));
			}
			let end = offset + data.len() as u64;
			if end > record.size {
				return Err(StoreError::Other("upload exceeds declared size".to_string()));
			}
			file.set_len(offset).await?;
			file.seek(SeekFrom::Start(offset)).await?;
			file.write_all(data).await?;
			file.sync_data().await?;
			drop(file);

			if end == record.size {
				afs::write(&acl_path, serde_json::to_vec(&record.acl)?).await?;
				afs::rename(&data_path, &object_path).await?;
				afs::remove_file(&record_path).await?;
				debug!("Upload {} finalized as {}", session.id, record.object);
			}
			Ok(end)
		})
		.await
	}

	async fn abort_upload(&self, session: &UploadSession) -> StoreResult<()> {
		let (data_path, record_path) = self.upload_paths(session)?;
		self.bounded("abort upload", async {
			remove_if_present(&data_path).await?;
			remove_if_present(&record_path).await?;
			debug!("Upload {} aborted", session.id);
			Ok(())
		})
		.await
	}

	async fn stat(&self, bucket: &str, object: &str) -> StoreResult<Lookup<ObjectMeta>> {
		let path = self.object_path(bucket, object)?;
		self.bounded("stat", async {
			match afs::metadata(&path).await {
				Ok(meta) => Ok(Lookup::Found(ObjectMeta { name: object.to_string(), size: meta.len() })),
				Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Lookup::NotFound),
				Err(e) => Err(e.into()),
			}
		})
		.await
	}

	async fn read_range(&self, bucket: &str, object: &str, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
		let path = self.object_path(bucket, object)?;
		self.bounded("read", async {
			let mut file = match afs::File::open(&path).await {
				Ok(f) => f,
				Err(e) if e.kind() == io::ErrorKind::NotFound => {
					return Err(StoreError::Http { status: 404, message: format!("no object {}", object) });
				}
				Err(e) => return Err(e.into()),
			};
			file.seek(SeekFrom::Start(offset)).await?;
			let mut buf = Vec::with_capacity(len);
			file.take(len as u64).read_to_end(&mut buf).await?;
			Ok(buf)
		})
		.await
	}

	async fn delete(&self, bucket: &str, object: &str) -> StoreResult<Lookup<()>> {
		let path = self.object_path(bucket, object)?;
		let acl_path = self.acl_path(bucket, object)?;
		self.bounded("delete", async {
			match afs::remove_file(&acl_path).await {
				Ok(()) => {}
				Err(e) if e.kind() == io::ErrorKind::NotFound => {}
				Err(e) => return Err(e.into()),
			}
			match afs::remove_file(&path).await {
				Ok(()) => Ok(Lookup::Found(())),
				Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Lookup::NotFound),
				Err(e) => Err(e.into()),
			}
		})
		.await
	}

	fn public_url(&self, bucket: &str, object: &str) -> String {
		file_url(&self.root.join(bucket).join(OBJECTS_DIR).join(encode_name(object)))
	}
}

/// Connects to a [`LocalStore`] under a configured root directory
#[derive(Debug, Clone)]
pub struct LocalConnector {
	root: Option<PathBuf>,
}

impl LocalConnector {
	pub fn new(root: Option<PathBuf>) -> Self {
		Self { root }
	}

	fn root(&self) -> StoreResult<&Path> {
		self.root.as_deref().ok_or_else(|| {
			StoreError::Unavailable(format!("{} not set", crate::config::STORE_ROOT_ENV))
		})
	}
}

impl Connector for LocalConnector {
	fn self_test(&self) -> StoreResult<()> {
		let root = self.root()?;
		if !root.is_dir() {
			return Err(StoreError::Unavailable(format!("{} is not a directory", root.display())));
		}
		Ok(())
	}

	fn connect(&self, credentials: &Credentials, timeout: Duration) -> StoreResult<Box<dyn ObjectStore>> {
		if credentials.identity.is_empty() || credentials.secret().is_empty() {
			return Err(StoreError::InvalidCredentials("empty credentials".to_string()));
		}
		let root = self.root()?;
		debug!("Connecting to {} as {}", root.display(), credentials.identity);
		Ok(Box::new(LocalStore::new(root, timeout)))
	}
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
	match afs::remove_file(path).await {
		Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
		_ => Ok(()),
	}
}

/// `file://` URL of a local path
fn file_url(path: &Path) -> String {
	let mut url = String::from("file://");
	for b in path.to_string_lossy().bytes() {
		if b.is_ascii_alphanumeric() || b"/._-~".contains(&b) {
			url.push(b as char);
		} else {
			url.push_str(&format!("%{:02X}", b));
		}
	}
	url
}

/// Percent-encode everything outside `[A-Za-z0-9._-]`, and a leading dot
fn encode_name(name: &str) -> String {
	let mut out = String::with_capacity(name.len());
	for (i, b) in name.bytes().enumerate() {
		let plain = b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || (b == b'.' && i > 0);
		if plain {
			out.push(b as char);
		} else {
			out.push_str(&format!("%{:02X}", b));
		}
	}
	if out.is_empty() {
		out.push('%');
	}
	out
}


// vim: ts=4
