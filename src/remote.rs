//! Remote controller: session setup shared by all commands
//!
//! Owns the channel to the host, the settings fetched from it and the
//! authenticated object store handle. The session only moves forward:
//! uninitialized, initialized (settings known), authenticated (store
//! connected). A new process starts over.

use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::config::{RemoteConfig, Settings};
use crate::credentials::{CredentialBundle, Credentials};
use crate::error::RemoteError;
use crate::logging::*;
use crate::protocol::Channel;
use crate::retry::RetryPolicy;
use crate::store::{BucketCreation, BucketSpec, Connector, ObjectStore};

/// Where the session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Uninitialized,
	Initialized,
	Authenticated,
}

/// The special remote: one per process
pub struct Remote<R, W> {
	pub(crate) chan: Channel<R, W>,
	pub(crate) config: RemoteConfig,
	pub(crate) policy: RetryPolicy,
	connector: Box<dyn Connector>,
	pub(crate) settings: Option<Settings>,
	pub(crate) store: Option<Box<dyn ObjectStore>>,
}

impl<R, W> Remote<R, W>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	pub fn new(reader: R, writer: W, config: RemoteConfig, connector: Box<dyn Connector>) -> Self {
		let policy = RetryPolicy::from_config(&config);
		Self { chan: Channel::new(reader, writer), config, policy, connector, settings: None, store: None }
	}

	/// Replace the retry policy derived from the configuration
	pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;
		self
	}

	pub fn into_writer(self) -> W {
		self.chan.into_writer()
	}

	pub fn state(&self) -> SessionState {
		match (&self.settings, &self.store) {
			(_, Some(_)) => SessionState::Authenticated,
			(Some(_), None) => SessionState::Initialized,
			(None, None) => SessionState::Uninitialized,
		}
	}

	pub fn settings(&self) -> Result<&Settings, RemoteError> {
		self.settings.as_ref().ok_or(RemoteError::NotInitialized)
	}

	/// Start-up capability check
	pub(crate) fn self_test(&self) -> Result<(), RemoteError> {
		self.connector.self_test()?;
		Ok(())
	}

	async fn setting(&mut self, name: &str, default: Option<&str>) -> Result<String, RemoteError> {
		match (self.chan.get_config(name).await?, default) {
			(Some(value), _) => Ok(value),
			(None, Some(default)) => Ok(default.to_string()),
			(None, None) => Err(RemoteError::MissingSetting { name: name.to_string() }),
		}
	}

	/// Fetch the remote's identity and settings. Does nothing once done.
	pub async fn init(&mut self) -> Result<(), RemoteError> {
		if self.settings.is_some() {
			return Ok(());
		}
		let uuid = self
			.chan
			.get_uuid()
			.await?
			.ok_or_else(|| RemoteError::MissingSetting { name: "uuid".to_string() })?;
		let project = self.setting("project", None).await?;
		let location = self.setting("location", Some(Settings::DEFAULT_LOCATION)).await?;
		let storage_class = self.setting("storageclass", Some(Settings::DEFAULT_STORAGE_CLASS)).await?;
		let name = self.setting("name", None).await?;
		let bucket = self.setting("bucket", Some(&Settings::default_bucket(&name, &uuid))).await?;
		let public = Settings::parse_public(&self.setting("public", Some("")).await?);
		let file_prefix = self.setting("fileprefix", Some("")).await?;

		debug!("Remote {} uses bucket {} (public: {})", uuid, bucket, public);
		self.settings =
			Some(Settings { uuid, project, location, storage_class, bucket, public, file_prefix });
		Ok(())
	}

	/// Exchange the stored credentials for a store handle. Does nothing
	/// once authenticated.
	pub async fn authenticate(&mut self) -> Result<(), RemoteError> {
		if self.store.is_some() {
			return Ok(());
		}
		let setting = self.settings()?.creds_setting();
		let (identity, secret) = self
			.chan
			.get_creds(&setting)
			.await?
			.ok_or(RemoteError::MissingCredentials { name: setting })?;
		let credentials = Credentials::from_stored(identity, &secret);
		let store = self.connector.connect(&credentials, self.config.timeout())?;
		info!("Authenticated as {}", credentials.identity);
		self.store = Some(store);
		Ok(())
	}

	/// INITREMOTE: import credentials if available, authenticate and make
	/// sure the bucket exists with the configured attributes.
	pub async fn init_remote(&mut self) -> Result<(), RemoteError> {
		self.init().await?;

		if let Some(path) = self.config.credentials_file.clone() {
			let bundle = CredentialBundle::load(&path)?;
			let secret = bundle.escaped_secret()?;
			let setting = self.settings()?.creds_setting();
			self.chan.set_creds(&setting, &bundle.client_email, &secret).await?;
		}

		match self.authenticate().await {
			Err(RemoteError::MissingCredentials { .. }) => return Err(RemoteError::NoCredentials),
			other => other?,
		}

		let settings = self.settings.as_ref().ok_or(RemoteError::NotInitialized)?;
		let store = self.store.as_deref().ok_or(RemoteError::NotAuthenticated)?;
		let spec = BucketSpec {
			project: settings.project.clone(),
			name: settings.bucket.clone(),
			location: settings.location.clone(),
			storage_class: settings.storage_class.clone(),
		};
		let spec = &spec;
		let created = self.policy.run(&mut self.chan, move || store.create_bucket(spec)).await?;

		if created == BucketCreation::AlreadyExists {
			// Location and storage class are fixed at creation time
			let bucket = settings.bucket.as_str();
			let info = self.policy.run(&mut self.chan, move || store.bucket_info(bucket)).await?;
			if info.location != settings.location {
				return Err(RemoteError::config(format!(
					"Bucket location \"{}\" cannot be changed",
					info.location
				)));
			}
			if info.storage_class != settings.storage_class {
				return Err(RemoteError::config(format!(
					"Bucket storage class \"{}\" cannot be changed",
					info.storage_class
				)));
			}
			debug!("Reusing existing bucket {}", settings.bucket);
		}

		self.chan.send::<&str>("INITREMOTE-SUCCESS", &[]).await?;
		Ok(())
	}

	/// PREPARE: initialize and authenticate
	pub async fn prepare(&mut self) -> Result<(), RemoteError> {
		self.init().await?;
		self.authenticate().await?;
		self.chan.send::<&str>("PREPARE-SUCCESS", &[]).await?;
		Ok(())
	}

	/// GETCOST
	pub async fn get_cost(&mut self) -> Result<(), RemoteError> {
		let cost = self.config.cost.to_string();
		self.chan.send("COST", &[cost]).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::MemoryStore;
	use std::io::Cursor;

	type TestRemote = Remote<Cursor<Vec<u8>>, Vec<u8>>;

	fn remote(input: &str, store: &MemoryStore) -> TestRemote {
		Remote::new(
			Cursor::new(input.as_bytes().to_vec()),
			Vec::new(),
			RemoteConfig::default(),
			Box::new(store.clone()),
		)
	}

	const SETTINGS: &str = "VALUE u1\nVALUE proj\nVALUE\nVALUE\nVALUE annex\nVALUE\nVALUE yes\nVALUE\n";

	#[tokio::test]
	async fn test_init_fetches_settings_in_order() {
		let store = MemoryStore::new();
		let mut remote = remote(SETTINGS, &store);
		remote.init().await.unwrap();
		assert_eq!(remote.state(), SessionState::Initialized);
		let settings = remote.settings().unwrap().clone();
		assert_eq!(settings.bucket, "annex-u1");
		assert_eq!(settings.location, "US");
		assert_eq!(settings.storage_class, "STANDARD");
		assert!(settings.public);

		// second call is a no-op and reads nothing
		remote.init().await.unwrap();
		let out = String::from_utf8(remote.into_writer()).unwrap();
		assert_eq!(
			out,
			"GETUUID\nGETCONFIG project\nGETCONFIG location\nGETCONFIG storageclass\n\
			 GETCONFIG name\nGETCONFIG bucket\nGETCONFIG public\nGETCONFIG fileprefix\n"
		);
	}

	#[tokio::test]
	async fn test_init_missing_project() {
		let store = MemoryStore::new();
		let mut remote = remote("VALUE u1\nVALUE\n", &store);
		let err = remote.init().await.unwrap_err();
		assert!(matches!(err, RemoteError::MissingSetting { ref name } if name == "project"));
		assert_eq!(remote.state(), SessionState::Uninitialized);
	}

	#[tokio::test]
	async fn test_authenticate_without_credentials() {
		let store = MemoryStore::new();
		let mut remote = remote(&format!("{}CREDS  \n", SETTINGS), &store);
		remote.init().await.unwrap();
		let err = remote.authenticate().await.unwrap_err();
		assert!(matches!(err, RemoteError::MissingCredentials { ref name } if name == "u1-creds-v1"));
	}

	#[tokio::test]
	async fn test_authenticate_once() {
		let store = MemoryStore::new();
		let mut remote = remote(&format!("{}CREDS sa@proj key*material\n", SETTINGS), &store);
		remote.init().await.unwrap();
		remote.authenticate().await.unwrap();
		remote.authenticate().await.unwrap();
		assert_eq!(remote.state(), SessionState::Authenticated);
		let out = String::from_utf8(remote.into_writer()).unwrap();
		assert_eq!(out.matches("GETCREDS").count(), 1);
	}

	#[tokio::test]
	async fn test_authenticate_requires_init() {
		let store = MemoryStore::new();
		let mut remote = remote("", &store);
		assert!(matches!(remote.authenticate().await, Err(RemoteError::NotInitialized)));
	}

	#[tokio::test]
	async fn test_get_cost() {
		let store = MemoryStore::new();
		let mut remote = remote("", &store);
		remote.get_cost().await.unwrap();
		assert_eq!(String::from_utf8(remote.into_writer()).unwrap(), "COST 200\n");
	}
}

// vim: ts=4
