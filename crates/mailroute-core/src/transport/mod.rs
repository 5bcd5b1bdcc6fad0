//! Transport abstraction: building handles from connection parameters,
//! verifying them and submitting messages.

mod params;
mod smtp;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use params::{AuthBlock, AuthType, ConnectionParams, map_credentials};
pub use smtp::{SmtpTransport, SmtpTransportFactory};

use crate::message::{MessageReceipt, OutgoingMessage};

/// Errors raised by a transport handle.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The handle could not be constructed from its parameters.
    #[error("Invalid transport parameters: {0}")]
    InvalidParams(String),

    /// SMTP connection, authentication or delivery failure.
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The server accepted the connection but failed the health check.
    #[error("Server did not accept the connection check")]
    Rejected,

    /// Message could not be assembled.
    #[error("Message error: {0}")]
    Message(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// Invalid attachment content type.
    #[error("Invalid content type: {0}")]
    ContentType(String),

    /// No recipients specified.
    #[error("No recipients specified")]
    NoRecipients,

    /// The operation exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// A live handle able to verify connectivity and send messages.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Performs a connect + authenticate round trip without sending mail.
    async fn verify(&self) -> Result<(), TransportError>;

    /// Submits `message` with `from` as the sender.
    async fn send(
        &self,
        from: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageReceipt, TransportError>;
}

/// Builds transport handles. Building performs no network I/O.
pub trait TransportFactory: Send + Sync {
    /// Creates a handle bound to `params`.
    fn build(&self, params: ConnectionParams) -> Arc<dyn Transport>;
}

/// Runs `verify` under a time budget; running out counts as a failure.
pub(crate) async fn verify_within(
    transport: &dyn Transport,
    limit: Duration,
) -> Result<(), TransportError> {
    tokio::time::timeout(limit, transport.verify())
        .await
        .map_err(|_| TransportError::Timeout(limit))?
}

/// Runs `send` under a time budget.
pub(crate) async fn send_within(
    transport: &dyn Transport,
    from: &str,
    message: &OutgoingMessage,
    limit: Duration,
) -> Result<MessageReceipt, TransportError> {
    tokio::time::timeout(limit, transport.send(from, message))
        .await
        .map_err(|_| TransportError::Timeout(limit))?
}
