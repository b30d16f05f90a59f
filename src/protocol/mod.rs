//! Line protocol spoken with git-annex
//!
//! - [`codec`]: request/response framing, argument splitting
//! - [`channel`]: the half-duplex stdio conversation, including the
//!   requests we send to the host
//! - [`command`]: the closed command table with arities and failure replies

pub mod channel;
pub mod codec;
pub mod command;
pub mod error;

pub use channel::{Channel, ProtocolResult, PROTOCOL_VERSION};
pub use codec::{encode, split_args, Request};
pub use command::{Command, FailureReply};
pub use error::ProtocolError;

// vim: ts=4
