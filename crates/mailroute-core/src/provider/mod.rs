//! Provider management module.
//!
//! Provides mail-service configuration shared by accounts, and its storage.

mod model;
mod repository;

pub use model::{ConnectionMode, Provider, ProviderId, ProviderStatus, Security, SmtpDescriptor};
pub use repository::ProviderRepository;
pub(crate) use repository::row_to_provider;
