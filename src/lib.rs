//! # gcsannex - git-annex special remote for Google Cloud Storage
//!
//! git-annex runs the remote as a child process and talks to it over a
//! line protocol on stdin/stdout. The remote stores each annexed key as
//! one object in a bucket, optionally readable by anyone.
//!
//! ## Driving a remote
//!
//! ```rust,ignore
//! use gcsannex::{serve, LocalConnector, Remote, RemoteConfig};
//! use tokio::io::BufReader;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteConfig::from_env()?;
//!     let connector = LocalConnector::new(config.store_root.clone());
//!     let mut remote =
//!         Remote::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), config, Box::new(connector));
//!     serve(&mut remote).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod progress;
pub mod protocol;
pub mod relay;
pub mod remote;
pub mod retry;
pub mod serve;
pub mod store;
pub mod transfer;

// Re-export commonly used types and functions
pub use config::{RemoteConfig, Settings};
pub use credentials::{CredentialBundle, Credentials};
pub use error::RemoteError;
pub use protocol::{Channel, Command, ProtocolError};
pub use remote::{Remote, SessionState};
pub use retry::RetryPolicy;
pub use serve::serve;
pub use store::{Connector, LocalConnector, LocalStore, MemoryStore, ObjectStore, StoreError};

// vim: ts=4
