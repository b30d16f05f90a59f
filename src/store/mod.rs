//! Object store collaborator
//!
//! The transfer engine only needs a handful of bucket and object calls. They
//! are expressed by [`ObjectStore`]; how a store is reached with a set of
//! credentials is the job of a [`Connector`].
//!
//! "Not found" is an ordinary outcome for lookups and deletes and is
//! returned as [`Lookup::NotFound`], never as an error.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::io;
use std::time::Duration;

use crate::credentials::Credentials;

pub use local::{LocalConnector, LocalStore};
pub use memory::MemoryStore;

/// Result of a lookup that may legitimately find nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
	Found(T),
	NotFound,
}

impl<T> Lookup<T> {
	pub fn is_found(&self) -> bool {
		matches!(self, Lookup::Found(_))
	}
}

/// Outcome of a bucket creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketCreation {
	Created,
	AlreadyExists,
}

/// Role granted by an ACL entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
	Owner,
	Reader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
	pub entity: String,
	pub role: Role,
}

/// Parameters for a new bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
	pub project: String,
	pub name: String,
	pub location: String,
	pub storage_class: String,
}

/// Immutable attributes of an existing bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
	pub name: String,
	pub location: String,
	pub storage_class: String,
}

/// Object metadata returned by `stat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
	pub name: String,
	pub size: u64,
}

/// Handle of a resumable upload in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
	pub id: String,
	pub bucket: String,
	pub object: String,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Where publicly readable Cloud Storage objects are served from
pub const PUBLIC_URL_BASE: &str = "https://storage-download.googleapis.com";

/// Calls the transfer engine makes against the remote object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
	async fn create_bucket(&self, spec: &BucketSpec) -> StoreResult<BucketCreation>;

	async fn bucket_info(&self, bucket: &str) -> StoreResult<BucketInfo>;

	/// Open a resumable upload of `size` bytes
	async fn begin_upload(
		&self,
		bucket: &str,
		object: &str,
		size: u64,
		acl: &[AclEntry],
	) -> StoreResult<UploadSession>;

	/// Send the chunk starting at `offset`.
	///
	/// Re-sending a chunk at an offset already received replaces it, so a
	/// chunk can be retried without restarting the object. The object becomes
	/// visible once the chunk ending at the declared size has been accepted.
	/// Returns the number of bytes persisted so far.
	///
	/// A store may persist only part of the chunk; the caller resumes from
	/// the returned count.
	async fn upload_chunk(&self, session: &UploadSession, offset: u64, data: &[u8]) -> StoreResult<u64>;

	/// Give up on an unfinished upload and drop what was received
	async fn abort_upload(&self, session: &UploadSession) -> StoreResult<()>;

	async fn stat(&self, bucket: &str, object: &str) -> StoreResult<Lookup<ObjectMeta>>;

	/// Read at most `len` bytes starting at `offset`
	async fn read_range(&self, bucket: &str, object: &str, offset: u64, len: usize) -> StoreResult<Vec<u8>>;

	async fn delete(&self, bucket: &str, object: &str) -> StoreResult<Lookup<()>>;

	/// URL an object is readable at once it is public
	fn public_url(&self, bucket: &str, object: &str) -> String {
		format!("{}/{}/{}", PUBLIC_URL_BASE, bucket, object)
	}
}

/// Turns credentials into a live store handle
pub trait Connector: Send + Sync {
	/// Start-up check that the store can be reached at all
	fn self_test(&self) -> StoreResult<()> {
		Ok(())
	}

	/// `timeout` bounds every individual call made through the returned store
	fn connect(&self, credentials: &Credentials, timeout: Duration) -> StoreResult<Box<dyn ObjectStore>>;
}

/// Object store failures
#[derive(Debug)]
pub enum StoreError {
	/// A call did not complete within the per-call timeout
	Timeout(String),
	/// TLS layer failure; only some of them are timeouts
	Tls { message: String, timeout: bool },
	/// Provider reported an HTTP status
	Http { status: u16, message: String },
	PermissionDenied(String),
	InvalidCredentials(String),
	/// The store cannot be used at all (missing backend, bad setup)
	Unavailable(String),
	Io(io::Error),
	Other(String),
}

impl StoreError {
	/// Whether the failure is a transient timeout worth retrying
	pub fn is_timeout(&self) -> bool {
		match self {
			StoreError::Timeout(_) => true,
			StoreError::Tls { timeout, .. } => *timeout,
			StoreError::Io(e) => e.kind() == io::ErrorKind::TimedOut,
			_ => false,
		}
	}
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::Timeout(msg) => write!(f, "timed out: {}", msg),
			StoreError::Tls { message, .. } => write!(f, "TLS error: {}", message),
			StoreError::Http { status, message } => write!(f, "HTTP {}: {}", status, message),
			StoreError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
			StoreError::InvalidCredentials(msg) => write!(f, "Invalid credentials: {}", msg),
			StoreError::Unavailable(msg) => write!(f, "Object store unavailable: {}", msg),
			StoreError::Io(e) => write!(f, "I/O error: {}", e),
			StoreError::Other(msg) => write!(f, "{}", msg),
		}
	}
}

impl Error for StoreError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			StoreError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for StoreError {
	fn from(e: io::Error) -> Self {
		StoreError::Io(e)
	}
}

impl From<serde_json::Error> for StoreError {
	fn from(e: serde_json::Error) -> Self {
		StoreError::Other(format!("malformed store record: {}", e))
	}
}


// vim: ts=4
