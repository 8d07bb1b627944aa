//! # om-director
//!
//! The Director gateway: one trait, [`DirectorGateway`], covering every
//! remote operation the `om` commands need, and [`HttpDirector`], its
//! implementation over the Ops Manager v0 REST API.
//!
//! ## Installation logs
//!
//! [`DirectorGateway::stream_installation_logs`] returns a [`LogStream`]:
//! a line channel and an error channel fed by one producer task. The
//! consumer drains lines until the channel closes, then reads at most one
//! error. An error therefore only becomes visible after every line has
//! been delivered.
//!
//! ## Authentication
//!
//! Tokens come from `<target>/uaa/oauth/token` on first use and are shared
//! by clones of the client. When a decryption passphrase is configured the
//! Director is unlocked once before the first token request.

#![deny(unsafe_code)]

pub mod auth;
pub mod client;
pub mod error;
pub mod gateway;
pub mod logs;
pub mod types;

pub use auth::Credentials;
pub use client::{parse_target, DirectorOptions, HttpDirector};
pub use error::{DirectorError, Result};
pub use gateway::DirectorGateway;
pub use logs::{log_channel, poll_installation, LogCursor, LogSender, LogStream, DEFAULT_POLL_INTERVAL};
pub use types::*;
