//! In-process object store
//!
//! Keeps buckets and objects in memory behind a shared handle, so a test
//! can keep a clone to inspect what the remote did. Faults can be queued
//! with [`MemoryStore::inject_faults`]; each store call consumes the next
//! queued fault (if any) instead of doing its work. Store calls are
//! numbered from 1, and [`MemoryStore::inject_fault_at`] and
//! [`MemoryStore::short_write_at`] target a single numbered call.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::*;
use crate::credentials::Credentials;

#[derive(Debug, Default)]
struct State {
	buckets: BTreeMap<String, BucketInfo>,
	objects: BTreeMap<(String, String), StoredObject>,
	uploads: HashMap<String, PendingUpload>,
	faults: VecDeque<StoreError>,
	faults_at: HashMap<usize, StoreError>,
	short_writes: HashMap<usize, usize>,
	accepted_identity: Option<String>,
	calls: usize,
}

#[derive(Debug, Clone)]
struct StoredObject {
	data: Vec<u8>,
	acl: Vec<AclEntry>,
}

#[derive(Debug)]
struct PendingUpload {
	bucket: String,
	object: String,
	size: u64,
	data: Vec<u8>,
	acl: Vec<AclEntry>,
}

/// Shared in-memory store; clones see the same contents
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	state: Arc<Mutex<State>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Lock the state for one store call, failing with the next queued fault
	fn call(&self) -> StoreResult<MutexGuard<'_, State>> {
		let mut state = self.lock();
		state.calls += 1;
		let call = state.calls;
		if let Some(fault) = state.faults_at.remove(&call) {
			return Err(fault);
		}
		match state.faults.pop_front() {
			Some(fault) => Err(fault),
			None => Ok(state),
		}
	}

	/// Only this identity will be able to connect
	pub fn accept_identity(&self, identity: &str) {
		self.lock().accepted_identity = Some(identity.to_string());
	}

	/// Pre-create a bucket
	pub fn add_bucket(&self, name: &str, location: &str, storage_class: &str) {
		self.lock().buckets.insert(
			name.to_string(),
			BucketInfo {
				name: name.to_string(),
				location: location.to_string(),
				storage_class: storage_class.to_string(),
			},
		);
	}

	pub fn put_object(&self, bucket: &str, object: &str, data: &[u8]) {
		self.lock().objects.insert(
			(bucket.to_string(), object.to_string()),
			StoredObject { data: data.to_vec(), acl: Vec::new() },
		);
	}

	/// Queue faults returned by the next store calls, in order
	pub fn inject_faults(&self, faults: impl IntoIterator<Item = StoreError>) {
		self.lock().faults.extend(faults);
	}

	/// Fail store call number `call` with `fault`
	pub fn inject_fault_at(&self, call: usize, fault: StoreError) {
		self.lock().faults_at.insert(call, fault);
	}

	/// Make store call number `call`, an `upload_chunk`, keep only the first
	/// `keep` bytes of its chunk
	pub fn short_write_at(&self, call: usize, keep: usize) {
		self.lock().short_writes.insert(call, keep);
	}

	pub fn object(&self, bucket: &str, object: &str) -> Option<Vec<u8>> {
		self.lock().objects.get(&(bucket.to_string(), object.to_string())).map(|o| o.data.clone())
	}

	pub fn object_acl(&self, bucket: &str, object: &str) -> Option<Vec<AclEntry>> {
		self.lock().objects.get(&(bucket.to_string(), object.to_string())).map(|o| o.acl.clone())
	}

	pub fn bucket(&self, name: &str) -> Option<BucketInfo> {
		self.lock().buckets.get(name).cloned()
	}

	/// Number of store calls made so far, faulted ones included
	pub fn calls(&self) -> usize {
		self.lock().calls
	}

	/// Uploads begun but neither finished nor aborted
	pub fn pending_uploads(&self) -> usize {
		self.lock().uploads.len()
	}
}

#[async_trait]
impl ObjectStore for MemoryStore {
	async fn create_bucket(&self, spec: &BucketSpec) -> StoreResult<BucketCreation> {
		let mut state = self.call()?;
		if state.buckets.contains_key(&spec.name) {
			return Ok(BucketCreation::AlreadyExists);
		}
		state.buckets.insert(
			spec.name.clone(),
			BucketInfo {
				name: spec.name.clone(),
				location: spec.location.clone(),
				storage_class: spec.storage_class.clone(),
			},
		);
		Ok(BucketCreation::Created)
	}

	async fn bucket_info(&self, bucket: &str) -> StoreResult<BucketInfo> {
		let state = self.call()?;
		state
			.buckets
			.get(bucket)
			.cloned()
			.ok_or_else(|| StoreError::Http { status: 404, message: format!("no bucket {}", bucket) })
	}

	async fn begin_upload(
		&self,
		bucket: &str,
		object: &str,
		size: u64,
		acl: &[AclEntry],
	) -> StoreResult<UploadSession> {
		let mut state = self.call()?;
		if !state.buckets.contains_key(bucket) {
			return Err(StoreError::Http { status: 404, message: format!("no bucket {}", bucket) });
		}
		let id = Uuid::new_v4().to_string();
		state.uploads.insert(
			id.clone(),
			PendingUpload {
				bucket: bucket.to_string(),
				object: object.to_string(),
				size,
				data: Vec::new(),
				acl: acl.to_vec(),
			},
		);
		Ok(UploadSession { id, bucket: bucket.to_string(), object: object.to_string() })
	}

	async fn upload_chunk(&self, session: &UploadSession, offset: u64, data: &[u8]) -> StoreResult<u64> {
		let mut state = self.call()?;
		let call = state.calls;
		let data = match state.short_writes.remove(&call) {
			Some(keep) => &data[..keep.min(data.len())],
			None => data,
		};
		let upload = state
			.uploads
			.get_mut(&session.id)
			.ok_or_else(|| StoreError::Other(format!("unknown upload session {}", session.id)))?;
		if offset > upload.data.len() as u64 {
			return Err(StoreError::Other(format!(
				"chunk at {} leaves a gap after {} bytes",
				offset,
				upload.data.len()
			)));
		}
		upload.data.truncate(offset as usize);
		upload.data.extend_from_slice(data);
		let received = upload.data.len() as u64;
		if received > upload.size {
			return Err(StoreError::Other("upload exceeds declared size".to_string()));
		}
		if received == upload.size {
			if let Some(done) = state.uploads.remove(&session.id) {
				state
					.objects
					.insert((done.bucket, done.object), StoredObject { data: done.data, acl: done.acl });
			}
		}
		Ok(received)
	}

	async fn abort_upload(&self, session: &UploadSession) -> StoreResult<()> {
		let mut state = self.call()?;
		state.uploads.remove(&session.id);
		Ok(())
	}

	async fn stat(&self, bucket: &str, object: &str) -> StoreResult<Lookup<ObjectMeta>> {
		let state = self.call()?;
		Ok(match state.objects.get(&(bucket.to_string(), object.to_string())) {
			Some(o) => Lookup::Found(ObjectMeta { name: object.to_string(), size: o.data.len() as u64 }),
			None => Lookup::NotFound,
		})
	}

	async fn read_range(&self, bucket: &str, object: &str, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
		let state = self.call()?;
		let stored = state
			.objects
			.get(&(bucket.to_string(), object.to_string()))
			.ok_or_else(|| StoreError::Http { status: 404, message: format!("no object {}", object) })?;
		let start = (offset as usize).min(stored.data.len());
		let end = start.saturating_add(len).min(stored.data.len());
		Ok(stored.data[start..end].to_vec())
	}

	async fn delete(&self, bucket: &str, object: &str) -> StoreResult<Lookup<()>> {
		let mut state = self.call()?;
		Ok(match state.objects.remove(&(bucket.to_string(), object.to_string())) {
			Some(_) => Lookup::Found(()),
			None => Lookup::NotFound,
		})
	}
}

impl Connector for MemoryStore {
	fn connect(&self, credentials: &Credentials, _timeout: Duration) -> StoreResult<Box<dyn ObjectStore>> {
		if credentials.identity.is_empty() || credentials.secret().is_empty() {
			return Err(StoreError::InvalidCredentials("empty credentials".to_string()));
		}
		if let Some(accepted) = &self.lock().accepted_identity {
			if accepted != &credentials.identity {
				return Err(StoreError::InvalidCredentials(format!(
					"unknown identity {}",
					credentials.identity
				)));
			}
		}
		Ok(Box::new(self.clone()))
	}
}


// vim: ts=4
