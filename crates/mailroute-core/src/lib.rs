//! # mailroute-core
//!
//! Keeps one working outbound mail transport among several configured
//! providers and routes messages through it.
//!
//! This crate provides:
//! - Provider and account models with `SQLite` storage
//! - **Credential mapping** - password vs. `OAuth2` connection parameters
//! - **Validation** - connectivity checks that demote failing providers
//! - **Default selection** - first working account, active providers first
//! - **Send routing** - cached default transport or one-off per-account transports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod config;
mod error;
pub mod message;
pub mod provider;
pub mod service;
pub mod store;
pub mod transport;

pub use account::{Account, AccountId, AccountRepository};
pub use config::Config;
pub use error::{Error, ErrorKind, Failure, Result};
pub use message::{Attachment, MessageReceipt, OutgoingMessage};
pub use provider::{
    ConnectionMode, Provider, ProviderId, ProviderRepository, ProviderStatus, Security,
    SmtpDescriptor,
};
pub use service::{
    DefaultBinding, DefaultCell, DefaultInfo, DefaultSelector, SendRouter, Validation, Validator,
};
pub use store::{AccountStore, Database, ProviderStore};
pub use transport::{
    AuthType, ConnectionParams, SmtpTransportFactory, Transport, TransportError, TransportFactory,
};
