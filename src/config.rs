//! Configuration for the remote
//!
//! Two kinds of configuration exist:
//!
//! - [`RemoteConfig`]: process tunables (chunk size, timeouts, retries).
//!   Priority chain: built-in defaults, then the TOML file named by
//!   `GCSANNEX_CONFIG`, then environment variables.
//! - [`Settings`]: per-remote values git-annex stores for us and hands out
//!   through `GETCONFIG`. They are fetched once and never change afterwards.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RemoteError;
use crate::store::{AclEntry, Role};

/// Environment variable naming a service account key file
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Environment variable naming the root directory of the local object store
pub const STORE_ROOT_ENV: &str = "GCSANNEX_STORE_ROOT";

/// Environment variable naming an optional TOML file with tunables
pub const CONFIG_FILE_ENV: &str = "GCSANNEX_CONFIG";

/// `expensiveRemoteCost` in git-annex terms
pub const DEFAULT_COST: u32 = 200;

pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Process tunables
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
	/// Transfer chunk size in bytes
	pub chunk_size: usize,

	/// Per-call network timeout
	pub timeout_secs: u64,

	/// Number of timeouts tolerated per network call
	pub max_retries: u32,

	/// Relative cost reported by GETCOST
	pub cost: u32,

	/// Key file imported at INITREMOTE time
	#[serde(skip)]
	pub credentials_file: Option<PathBuf>,

	/// Root of the directory-backed object store
	pub store_root: Option<PathBuf>,
}

impl Default for RemoteConfig {
	fn default() -> Self {
		RemoteConfig {
			chunk_size: DEFAULT_CHUNK_SIZE,
			timeout_secs: DEFAULT_TIMEOUT_SECS,
			max_retries: DEFAULT_MAX_RETRIES,
			cost: DEFAULT_COST,
			credentials_file: None,
			store_root: None,
		}
	}
}

impl RemoteConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}

	/// Parse tunables from TOML; missing keys keep their defaults
	pub fn from_toml(text: &str) -> Result<Self, RemoteError> {
		let config: RemoteConfig = toml::from_str(text)
			.map_err(|e| RemoteError::config(format!("invalid configuration: {}", e)))?;
		config.validate()?;
		Ok(config)
	}

	pub fn load(path: &Path) -> Result<Self, RemoteError> {
		let text = std::fs::read_to_string(path).map_err(|e| {
			RemoteError::config(format!("cannot read {}: {}", path.display(), e))
		})?;
		Self::from_toml(&text)
	}

	/// Build the process configuration from the environment
	pub fn from_env() -> Result<Self, RemoteError> {
		let mut config = match std::env::var_os(CONFIG_FILE_ENV) {
			Some(path) => Self::load(Path::new(&path))?,
			None => Self::default(),
		};
		config.apply_env(|name| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from));
		Ok(config)
	}

	fn apply_env(&mut self, var: impl Fn(&str) -> Option<PathBuf>) {
		if let Some(path) = var(CREDENTIALS_ENV) {
			self.credentials_file = Some(path);
		}
		if let Some(path) = var(STORE_ROOT_ENV) {
			self.store_root = Some(path);
		}
	}

	pub fn validate(&self) -> Result<(), RemoteError> {
		if self.chunk_size == 0 {
			return Err(RemoteError::config("chunkSize must be > 0"));
		}
		if self.timeout_secs == 0 {
			return Err(RemoteError::config("timeoutSecs must be > 0"));
		}
		Ok(())
	}
}

/// Per-remote settings fetched from git-annex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
	pub uuid: String,
	pub project: String,
	pub location: String,
	pub storage_class: String,
	pub bucket: String,
	pub public: bool,
	pub file_prefix: String,
}

impl Settings {
	pub const DEFAULT_LOCATION: &'static str = "US";
	pub const DEFAULT_STORAGE_CLASS: &'static str = "STANDARD";

	/// Bucket name used when none is configured
	pub fn default_bucket(name: &str, uuid: &str) -> String {
		format!("{}-{}", name, uuid)
	}

	/// `public` is enabled only by the exact word "yes", in any case
	pub fn parse_public(value: &str) -> bool {
		value.eq_ignore_ascii_case("yes")
	}

	/// Name of the credential slot in git-annex's storage
	pub fn creds_setting(&self) -> String {
		format!("{}-creds-v1", self.uuid)
	}

	/// Object name a key is stored under
	pub fn object_name(&self, key: &str) -> String {
		format!("{}{}", self.file_prefix, key)
	}

	/// Project-private ACL, plus public read when enabled
	pub fn object_acl(&self) -> Vec<AclEntry> {
		let mut acl = vec![
			AclEntry { entity: format!("project-owners-{}", self.project), role: Role::Owner },
			AclEntry { entity: format!("project-editors-{}", self.project), role: Role::Owner },
			AclEntry { entity: format!("project-viewers-{}", self.project), role: Role::Reader },
		];
		if self.public {
			acl.push(AclEntry { entity: "allUsers".to_string(), role: Role::Reader });
		}
		acl
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn settings(public: bool) -> Settings {
		Settings {
			uuid: "1234".into(),
			project: "proj".into(),
			location: "US".into(),
			storage_class: "STANDARD".into(),
			bucket: "annex-1234".into(),
			public,
			file_prefix: "objects/".into(),
		}
	}

	#[test]
	fn test_config_default() {
		let config = RemoteConfig::default();
		assert_eq!(config.chunk_size, 1 << 20);
		assert_eq!(config.timeout(), Duration::from_secs(30));
		assert_eq!(config.max_retries, 10);
		assert_eq!(config.cost, 200);
	}

	#[test]
	fn test_config_from_toml_keeps_defaults() {
		let config = RemoteConfig::from_toml("chunkSize = 4096\nmaxRetries = 3\n").unwrap();
		assert_eq!(config.chunk_size, 4096);
		assert_eq!(config.max_retries, 3);
		assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
	}

	#[test]
	fn test_config_rejects_zero_chunk() {
		assert!(RemoteConfig::from_toml("chunkSize = 0").is_err());
	}

	#[test]
	fn test_env_overrides() {
		let mut config = RemoteConfig::default();
		config.apply_env(|name| match name {
			CREDENTIALS_ENV => Some(PathBuf::from("/keys/sa.json")),
			_ => None,
		});
		assert_eq!(config.credentials_file, Some(PathBuf::from("/keys/sa.json")));
		assert_eq!(config.store_root, None);
	}

	#[test]
	fn test_public_flag() {
		assert!(Settings::parse_public("yes"));
		assert!(Settings::parse_public("YES"));
		assert!(!Settings::parse_public("true"));
		assert!(!Settings::parse_public(""));
	}

	#[test]
	fn test_names() {
		let s = settings(false);
		assert_eq!(s.creds_setting(), "1234-creds-v1");
		assert_eq!(s.object_name("SHA256E-s1--ab"), "objects/SHA256E-s1--ab");
		assert_eq!(Settings::default_bucket("annex", "1234"), "annex-1234");
	}

	#[test]
	fn test_object_acl() {
		assert_eq!(settings(false).object_acl().len(), 3);
		let acl = settings(true).object_acl();
		assert_eq!(acl.len(), 4);
		assert_eq!(acl[3], AclEntry { entity: "allUsers".into(), role: Role::Reader });
		assert_eq!(acl[0].entity, "project-owners-proj");
	}
}

// vim: ts=4
