//! Service account credentials
//!
//! Credentials live in git-annex's credential storage, not in this process.
//! At `INITREMOTE` time they may be imported from the JSON key file named by
//! `GOOGLE_APPLICATION_CREDENTIALS`. The private key is PEM, so its line
//! breaks are replaced with `*` to fit on a single protocol line.

use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::error::RemoteError;

/// Character standing in for newlines in a stored secret
pub const NEWLINE_SENTINEL: char = '*';

/// Identity plus key material
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	pub identity: String,
	secret: String,
}

impl Credentials {
	pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
		Self { identity: identity.into(), secret: secret.into() }
	}

	/// Build from the single-line form stored by git-annex
	pub fn from_stored(identity: String, escaped_secret: &str) -> Self {
		Self { identity, secret: unescape_secret(escaped_secret) }
	}

	pub fn secret(&self) -> &str {
		&self.secret
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("identity", &self.identity)
			.field("secret", &"<redacted>")
			.finish()
	}
}

/// Service account key file as downloaded from the cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialBundle {
	pub client_email: String,
	pub private_key: String,
}

impl CredentialBundle {
	pub fn parse(json: &str) -> Result<Self, RemoteError> {
		serde_json::from_str(json)
			.map_err(|e| RemoteError::Credentials(format!("invalid credential file: {}", e)))
	}

	pub fn load(path: &Path) -> Result<Self, RemoteError> {
		let json = std::fs::read_to_string(path).map_err(|e| {
			RemoteError::Credentials(format!("cannot read {}: {}", path.display(), e))
		})?;
		Self::parse(&json)
	}

	/// Private key in its single-line storage form
	pub fn escaped_secret(&self) -> Result<String, RemoteError> {
		escape_secret(&self.private_key)
	}
}

pub fn escape_secret(secret: &str) -> Result<String, RemoteError> {
	if secret.contains(NEWLINE_SENTINEL) {
		return Err(RemoteError::Credentials(format!(
			"private key contains '{}' and cannot be stored",
			NEWLINE_SENTINEL
		)));
	}
	Ok(secret.lines().collect::<Vec<_>>().join(&NEWLINE_SENTINEL.to_string()))
}

pub fn unescape_secret(escaped: &str) -> String {
	escaped.replace(NEWLINE_SENTINEL, "\n")
}


// vim: ts=4
